/// Scalar Engine - one micro-op at a time over a V/M register pair
use log::{debug, warn};

use super::{Engine, EngineEffects, EngineInput, EngineState, Instruction, UnitStats};
use crate::arbiter::AluRequest;
use crate::config::EngineKind;
use crate::decoder::{CompType, DecodeOutput, DecodedControl, OpCode};
use crate::math::kernels::vec_add;
use crate::math::{ComputeStatus, FixedFormat, TernaryMatrix, Vector, LANES};
use crate::memdomain::{MemData, MemRequest, Scratchpad, WeightRow};

pub struct ScalarEngine {
  unit: usize,
  format: FixedFormat,
  state: EngineState,

  // Registers
  v: Vector,
  m: TernaryMatrix,

  // In-flight operation
  ctrl: DecodedControl,
  operand: Vector,
  rows: Option<(usize, Vec<WeightRow>)>,
  result: Option<Vector>,
  status: ComputeStatus,

  stats: UnitStats,
}

impl ScalarEngine {
  pub fn new(unit: usize, format: FixedFormat) -> Self {
    Self {
      unit,
      format,
      state: EngineState::Idle,
      v: Vector::zero(),
      m: TernaryMatrix::zero(),
      ctrl: DecodedControl::default(),
      operand: Vector::zero(),
      rows: None,
      result: None,
      status: ComputeStatus::default(),
      stats: UnitStats::default(),
    }
  }

  /// Vector-bank slot for a local index.
  fn vector_slot(&self) -> usize {
    self.unit * LANES + self.ctrl.addr
  }

  /// Matrix rows moved by a transfer of `size > 0`.
  fn row_count(&self) -> usize {
    1 << (self.ctrl.size.saturating_sub(1))
  }

  fn commit(&mut self, value: Vector, fx: &mut EngineEffects) {
    self.v = value;
    fx.push = Some(value);
  }

  fn clear_in_flight(&mut self) {
    self.operand = Vector::zero();
    self.rows = None;
    self.result = None;
  }

  fn abort(&mut self, fx: &mut EngineEffects) {
    warn!("[Unit{}] abort in {:?}", self.unit, self.state);
    self.clear_in_flight();
    self.state = EngineState::Idle;
    self.stats.aborts += 1;
    fx.aborted = true;
  }

  /// Returns true when the instruction was taken.
  fn accept(&mut self, out: &DecodeOutput, fx: &mut EngineEffects) -> bool {
    if !out.decode_valid {
      if self.state != EngineState::Idle {
        self.abort(fx);
      } else {
        debug!("[Unit{}] dropped malformed instruction {:?}", self.unit, out.error);
      }
      return false;
    }

    if self.state != EngineState::Idle {
      warn!("[Unit{}] busy in {:?}, rejected {:?}", self.unit, self.state, out.control.opcode);
      self.stats.rejections += 1;
      fx.rejected = true;
      return false;
    }

    self.ctrl = out.control;
    self.clear_in_flight();
    if matches!(self.ctrl.opcode, OpCode::Compute | OpCode::Copy | OpCode::AddVec) {
      self.status = ComputeStatus::default();
    }

    self.state = match self.ctrl.opcode {
      OpCode::Nop => EngineState::Writeback,
      OpCode::Load | OpCode::Store | OpCode::Copy | OpCode::AddVec => EngineState::Fetch,
      OpCode::Compute if self.ctrl.comp == CompType::Add => EngineState::Fetch,
      OpCode::Compute => EngineState::Dispatch,
    };
    debug!(
      "[Unit{}] accept {:?}/{:?} -> {:?}",
      self.unit, self.ctrl.opcode, self.ctrl.comp, self.state
    );
    true
  }

  fn advance(&mut self, input: &EngineInput, fx: &mut EngineEffects) {
    match self.state {
      EngineState::Idle => {},
      EngineState::Fetch => {
        if input.mem.error {
          warn!("[Unit{}] memory error during {:?}", self.unit, self.ctrl.opcode);
          self.stats.mem_errors += 1;
          fx.mem_error = true;
          self.state = EngineState::Error;
        } else if input.mem.done {
          match &input.mem.data {
            MemData::Vector(v) => self.operand = *v,
            MemData::Rows { start, rows } => self.rows = Some((*start, rows.clone())),
            MemData::None => {},
          }
          self.state = match self.ctrl.opcode {
            OpCode::Compute => EngineState::Dispatch,
            _ => EngineState::Execute,
          };
        } else {
          self.stats.stall_cycles += 1;
        }
      },
      EngineState::Dispatch => {
        if input.alu.done {
          self.result = Some(input.alu.result);
          self.status = input.alu.status;
          self.state = EngineState::Writeback;
        } else {
          self.stats.stall_cycles += 1;
        }
      },
      EngineState::Execute => {
        self.execute();
        self.state = EngineState::Writeback;
      },
      EngineState::Writeback => {
        if let Some(r) = self.result.take() {
          self.commit(r, fx);
          fx.result = Some(r);
        }
        fx.done = true;
        self.stats.retired += 1;
        self.state = EngineState::Idle;
        debug!("[Unit{}] retire {:?}", self.unit, self.ctrl.opcode);
      },
      EngineState::Error => {
        self.clear_in_flight();
        self.state = EngineState::Idle;
      },
    }
  }

  fn execute(&mut self) {
    match self.ctrl.opcode {
      OpCode::Load if self.ctrl.size == 0 => self.result = Some(self.operand),
      OpCode::Load => {
        if let Some((start, rows)) = self.rows.take() {
          for (i, row) in rows.into_iter().enumerate() {
            self.m.set_row(start + i, row);
          }
        }
      },
      OpCode::Copy => {
        self.result = Some(self.operand);
        self.status = ComputeStatus {
          zero: self.operand.is_zero(),
          ..ComputeStatus::default()
        };
      },
      OpCode::AddVec => {
        let r = vec_add(&self.format, &self.v, &self.operand);
        self.result = Some(r.value);
        self.status = r.status;
      },
      OpCode::Store | OpCode::Compute | OpCode::Nop => {},
    }
  }

  fn mem_request(&self) -> Option<MemRequest> {
    let ctrl = &self.ctrl;
    let request = match ctrl.opcode {
      OpCode::Load if ctrl.size == 0 => MemRequest::LoadVector {
        addr: self.vector_slot(),
      },
      OpCode::Load => MemRequest::LoadRows {
        start: ctrl.addr,
        count: self.row_count(),
      },
      OpCode::Store if ctrl.size == 0 => MemRequest::StoreVector {
        addr: self.vector_slot(),
        data: self.v,
      },
      OpCode::Store => MemRequest::StoreRows {
        start: ctrl.addr,
        // Rows past the register are sent as ZERO so the bank sees the full range.
        rows: (ctrl.addr..ctrl.addr + self.row_count())
          .map(|r| self.m.0.get(r).copied().unwrap_or_default())
          .collect(),
      },
      OpCode::Compute => MemRequest::FetchOperand {
        addr: self.vector_slot(),
      },
      OpCode::Copy | OpCode::AddVec => MemRequest::FetchPeer { unit: ctrl.source },
      OpCode::Nop => return None,
    };
    Some(request)
  }

  fn drive(&self, fx: &mut EngineEffects) {
    match self.state {
      EngineState::Fetch => fx.mem_request = self.mem_request(),
      EngineState::Dispatch => {
        fx.alu_request = Some(AluRequest {
          op: self.ctrl.comp,
          vector: self.v,
          matrix: self.m,
          operand: self.operand,
        })
      },
      _ => {},
    }
    fx.busy = self.state != EngineState::Idle;
    fx.ready = !fx.busy;
    fx.status = self.status;
  }
}

impl Engine for ScalarEngine {
  fn unit(&self) -> usize {
    self.unit
  }

  fn kind(&self) -> EngineKind {
    EngineKind::Scalar
  }

  fn state(&self) -> EngineState {
    self.state
  }

  fn step(&mut self, input: &EngineInput, _scratchpad: &Scratchpad) -> EngineEffects {
    let mut fx = EngineEffects::default();

    if let Some(v) = input.data_in {
      self.commit(v, &mut fx);
    }
    if let Some(m) = input.matrix_in {
      self.m = m;
    }

    let accepted = match &input.instruction {
      Some(Instruction::Control(out)) => self.accept(out, &mut fx),
      Some(Instruction::Bundle(_)) => {
        warn!("[Unit{}] scalar engine ignores bundles", self.unit);
        self.stats.invalid_ops += 1;
        false
      },
      None => false,
    };
    if !accepted && !fx.aborted {
      self.advance(input, &mut fx);
    }

    self.drive(&mut fx);
    fx
  }

  fn vector(&self) -> Vector {
    self.v
  }

  fn matrix(&self) -> &TernaryMatrix {
    &self.m
  }

  fn write_vector(&mut self, value: Vector) {
    self.v = value;
  }

  fn write_matrix(&mut self, value: TernaryMatrix) {
    self.m = value;
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
