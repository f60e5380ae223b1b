/// VLIW Engine - four micro-op slots per step against V0, V1 and M0
use log::{debug, warn};

use super::bundle::{MicroOp, VliwBundle};
use super::{Engine, EngineEffects, EngineInput, EngineState, Instruction, UnitStats};
use crate::config::EngineKind;
use crate::math::kernels::{matvec, vec_add, vec_relu, vec_square, vec_sub, vec_tanh, VectorResult};
use crate::math::{ComputeStatus, FixedFormat, TernaryMatrix, Vector};
use crate::memdomain::Scratchpad;

/// Slots run in order and see each other's register writes. A bundle never
/// stalls: it completes in the step it is issued.
pub struct VliwEngine {
  unit: usize,
  format: FixedFormat,
  v0: Vector,
  v1: Vector,
  m0: TernaryMatrix,
  /// Cleared by `zero_m0`; `matvec` on an unloaded M0 is invalid.
  m0_loaded: bool,
  status: ComputeStatus,
  stats: UnitStats,
}

impl VliwEngine {
  pub fn new(unit: usize, format: FixedFormat) -> Self {
    Self {
      unit,
      format,
      v0: Vector::zero(),
      v1: Vector::zero(),
      m0: TernaryMatrix::zero(),
      m0_loaded: false,
      status: ComputeStatus::default(),
      stats: UnitStats::default(),
    }
  }

  pub fn v1(&self) -> Vector {
    self.v1
  }

  fn kernel(&mut self, r: VectorResult, status: &mut ComputeStatus) {
    self.v0 = r.value;
    status.merge(&r.status);
  }

  fn slot(
    &mut self,
    op: MicroOp,
    peer: Option<usize>,
    input: &EngineInput,
    scratchpad: &Scratchpad,
    status: &mut ComputeStatus,
    fx: &mut EngineEffects,
  ) {
    let fmt = self.format;
    match op {
      MicroOp::Nop => {},
      MicroOp::LoadV0 | MicroOp::LoadV1 => match input.data_in {
        Some(v) if op == MicroOp::LoadV0 => self.v0 = v,
        Some(v) => self.v1 = v,
        None => status.invalid = true,
      },
      MicroOp::LoadM0 => match input.matrix_in {
        Some(m) => {
          self.m0 = m;
          self.m0_loaded = true;
        },
        None => status.invalid = true,
      },
      MicroOp::StoreV0 => fx.result = Some(self.v0),
      MicroOp::StoreV1 => fx.result = Some(self.v1),
      MicroOp::StoreM0 => fx.matrix_out = Some(self.m0),
      MicroOp::ZeroV0 => self.v0 = Vector::zero(),
      MicroOp::ZeroV1 => self.v1 = Vector::zero(),
      MicroOp::ZeroM0 => {
        self.m0 = TernaryMatrix::zero();
        self.m0_loaded = false;
      },
      MicroOp::PushV0 => fx.push = Some(self.v0),
      MicroOp::PullV0 | MicroOp::PullV1 => {
        let peer = peer.unwrap_or(self.unit);
        if peer >= scratchpad.len() {
          status.invalid = true;
        } else if let Some(v) = scratchpad.read(peer) {
          if op == MicroOp::PullV0 {
            self.v0 = v;
          } else {
            self.v1 = v;
          }
        }
      },
      MicroOp::Matvec if !self.m0_loaded => {
        warn!("[Unit{}] matvec with no matrix loaded", self.unit);
        status.invalid = true;
      },
      MicroOp::Matvec => self.kernel(matvec(&fmt, &self.m0, &self.v0), status),
      MicroOp::Add => self.kernel(vec_add(&fmt, &self.v0, &self.v1), status),
      MicroOp::Sub => self.kernel(vec_sub(&fmt, &self.v0, &self.v1), status),
      MicroOp::Relu => self.kernel(vec_relu(&self.v0), status),
      MicroOp::Tanh => self.kernel(vec_tanh(&fmt, &self.v0), status),
      MicroOp::Square => self.kernel(vec_square(&fmt, &self.v0), status),
      MicroOp::Unknown(code) => {
        warn!("[Unit{}] unknown slot code {}", self.unit, code);
        status.invalid = true;
      },
    }
  }

  fn run_bundle(
    &mut self,
    bundle: &VliwBundle,
    input: &EngineInput,
    scratchpad: &Scratchpad,
    fx: &mut EngineEffects,
  ) {
    let mut status = ComputeStatus::default();
    for op in bundle.slots {
      self.slot(op, bundle.peer, input, scratchpad, &mut status, fx);
    }
    if status.invalid {
      self.stats.invalid_ops += 1;
    }
    self.status = status;
    self.stats.retired += 1;
    fx.done = true;
    debug!(
      "[Unit{}] bundle [{}] status={:?}",
      self.unit,
      bundle.slots.map(|op| op.name()).join(", "),
      status
    );
  }
}

impl Engine for VliwEngine {
  fn unit(&self) -> usize {
    self.unit
  }

  fn kind(&self) -> EngineKind {
    EngineKind::Vliw
  }

  fn state(&self) -> EngineState {
    EngineState::Idle
  }

  fn step(&mut self, input: &EngineInput, scratchpad: &Scratchpad) -> EngineEffects {
    let mut fx = EngineEffects {
      ready: true,
      ..EngineEffects::default()
    };

    match &input.instruction {
      Some(Instruction::Bundle(bundle)) => self.run_bundle(bundle, input, scratchpad, &mut fx),
      Some(Instruction::Control(_)) => {
        warn!("[Unit{}] VLIW engine ignores packed instructions", self.unit);
        self.stats.invalid_ops += 1;
        self.status = ComputeStatus {
          invalid: true,
          ..ComputeStatus::default()
        };
      },
      None => {},
    }

    fx.status = self.status;
    fx
  }

  fn vector(&self) -> Vector {
    self.v0
  }

  fn matrix(&self) -> &TernaryMatrix {
    &self.m0
  }

  fn write_vector(&mut self, value: Vector) {
    self.v0 = value;
  }

  fn write_matrix(&mut self, value: TernaryMatrix) {
    self.m0 = value;
    self.m0_loaded = true;
  }

  fn status(&self) -> ComputeStatus {
    self.status
  }

  fn stats(&self) -> &UnitStats {
    &self.stats
  }

  fn reset(&mut self) {
    *self = Self::new(self.unit, self.format);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const Q: FixedFormat = FixedFormat::Q1_31;

  /// Bundle with no peer override.
  fn own(ops: &[MicroOp]) -> EngineInput {
    let mut b = VliwBundle::builder();
    for &op in ops {
      b = b.op(op).unwrap();
    }
    EngineInput {
      instruction: Some(Instruction::Bundle(b.build())),
      ..EngineInput::default()
    }
  }

  fn bundle(ops: &[MicroOp], peer: usize) -> EngineInput {
    let mut b = VliwBundle::builder().peer(peer);
    for &op in ops {
      b = b.op(op).unwrap();
    }
    EngineInput {
      instruction: Some(Instruction::Bundle(b.build())),
      ..EngineInput::default()
    }
  }

  #[test]
  fn test_slots_see_earlier_writes() {
    let sp = Scratchpad::new(2);
    let mut e = VliwEngine::new(0, Q);
    let quarter = Q.from_f32(0.25);
    let mut input = bundle(&[MicroOp::LoadV0, MicroOp::LoadV1, MicroOp::Add, MicroOp::StoreV0], 0);
    input.data_in = Some(Vector::splat(quarter));
    let fx = e.step(&input, &sp);
    assert!(fx.done);
    assert_eq!(fx.result, Some(Vector::splat(2 * quarter)));
    assert!(!fx.status.overflow);
    assert!(!fx.status.zero);
  }

  #[test]
  fn test_add_saturates() {
    let sp = Scratchpad::new(1);
    let mut e = VliwEngine::new(0, Q);
    e.write_vector(Vector::splat(Q.max()));
    let mut input = bundle(&[MicroOp::LoadV1, MicroOp::Add], 0);
    input.data_in = Some(Vector::splat(Q.max()));
    let fx = e.step(&input, &sp);
    assert!(fx.status.overflow);
    assert_eq!(e.vector(), Vector::splat(Q.max()));
  }

  #[test]
  fn test_matvec_identity() {
    let sp = Scratchpad::new(1);
    let mut e = VliwEngine::new(0, Q);
    e.write_matrix(TernaryMatrix::identity());
    let v = Vector::from_fn(|i| (i as i64 - 8) << 20);
    e.write_vector(v);
    e.step(&bundle(&[MicroOp::Matvec], 0), &sp);
    assert_eq!(e.vector(), v);
  }

  #[test]
  fn test_relu_alternating() {
    let sp = Scratchpad::new(1);
    let mut e = VliwEngine::new(0, Q);
    let half = Q.from_f32(0.5);
    let v = Vector::from_fn(|i| if i % 2 == 0 { half } else { -half });
    e.write_vector(v);
    e.step(&bundle(&[MicroOp::Relu], 0), &sp);
    let out = e.vector();
    for i in 0..16 {
      assert_eq!(out.0[i], if i % 2 == 0 { half } else { 0 });
    }
  }

  #[test]
  fn test_unknown_slot_sets_invalid_and_continues() {
    let sp = Scratchpad::new(1);
    let mut e = VliwEngine::new(0, Q);
    e.write_vector(Vector::splat(-3));
    let input = EngineInput {
      instruction: Some(Instruction::Bundle(VliwBundle::decode(20 | (MicroOp::Relu.code() << 5)))),
      ..EngineInput::default()
    };
    let fx = e.step(&input, &sp);
    assert!(fx.status.invalid);
    assert!(e.vector().is_zero());
    assert!(fx.status.zero);

    // Flags start fresh on the next bundle.
    let fx = e.step(&bundle(&[MicroOp::Nop], 0), &sp);
    assert!(!fx.status.invalid);
  }

  #[test]
  fn test_matvec_needs_loaded_matrix() {
    let sp = Scratchpad::new(1);
    let mut e = VliwEngine::new(0, Q);
    let v = Vector::splat(Q.from_f32(0.5));
    e.write_vector(v);
    let fx = e.step(&bundle(&[MicroOp::Matvec], 0), &sp);
    assert!(fx.status.invalid);
    assert_eq!(e.vector(), v);

    let mut input = bundle(&[MicroOp::LoadM0, MicroOp::Matvec], 0);
    input.matrix_in = Some(TernaryMatrix::identity());
    let fx = e.step(&input, &sp);
    assert!(!fx.status.invalid);
    assert_eq!(e.vector(), v);

    let fx = e.step(&bundle(&[MicroOp::ZeroM0, MicroOp::Matvec], 0), &sp);
    assert!(fx.status.invalid);
  }

  #[test]
  fn test_own_slot_pull_without_peer() {
    let mut sp = Scratchpad::new(4);
    let mut e = VliwEngine::new(2, Q);
    let v = Vector::splat(Q.from_f32(0.125));
    e.write_vector(v);
    let fx = e.step(&own(&[MicroOp::PushV0, MicroOp::ZeroV0]), &sp);
    sp.push(2, fx.push.unwrap());
    sp.commit();
    assert!(e.vector().is_zero());

    for _ in 0..3 {
      e.step(&own(&[MicroOp::ZeroV0, MicroOp::PullV0]), &sp);
      assert_eq!(e.vector(), v);
    }
  }

  #[test]
  fn test_load_without_data_is_invalid() {
    let sp = Scratchpad::new(1);
    let mut e = VliwEngine::new(0, Q);
    let fx = e.step(&bundle(&[MicroOp::LoadV0], 0), &sp);
    assert!(fx.status.invalid);
  }

  #[test]
  fn test_push_then_pull() {
    let mut sp = Scratchpad::new(2);
    let mut a = VliwEngine::new(0, Q);
    let mut b = VliwEngine::new(1, Q);
    a.write_vector(Vector::splat(11));

    let fx = a.step(&bundle(&[MicroOp::PushV0], 0), &sp);
    // Pull in the same tick sees the old (empty) slot.
    b.step(&bundle(&[MicroOp::PullV1], 0), &sp);
    assert_eq!(b.v1(), Vector::zero());

    sp.push(0, fx.push.unwrap());
    sp.commit();
    b.step(&bundle(&[MicroOp::PullV1], 0), &sp);
    assert_eq!(b.v1(), Vector::splat(11));

    let fx = b.step(&bundle(&[MicroOp::PullV0], 5), &sp);
    assert!(fx.status.invalid);
  }

  #[test]
  fn test_store_m0_and_zero() {
    let sp = Scratchpad::new(1);
    let mut e = VliwEngine::new(0, Q);
    e.write_matrix(TernaryMatrix::identity());
    let fx = e.step(&bundle(&[MicroOp::StoreM0, MicroOp::ZeroM0], 0), &sp);
    assert_eq!(fx.matrix_out, Some(TernaryMatrix::identity()));
    assert_eq!(e.matrix(), &TernaryMatrix::zero());
  }

  #[test]
  fn test_square_underflow() {
    let sp = Scratchpad::new(1);
    let mut e = VliwEngine::new(0, Q);
    e.write_vector(Vector::splat(1));
    let fx = e.step(&bundle(&[MicroOp::Square], 0), &sp);
    assert!(fx.status.underflow);
    assert!(fx.status.zero);
  }
}
