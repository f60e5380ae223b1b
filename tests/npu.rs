use ternpu::builtin::Module;
use ternpu::decoder::{CompType, InstructionPacket};
use ternpu::engine::{EngineState, MicroOp, VliwBundle};
use ternpu::math::{FixedFormat, TernaryMatrix, Vector};
use ternpu::memdomain::MemState;
use ternpu::{EngineKind, Npu, NpuConfig, UnitOutput};

const Q: FixedFormat = FixedFormat::Q1_31;
const TICK_LIMIT: usize = 200;

fn npu(units: usize) -> Npu {
  Npu::new(NpuConfig::with_units(units)).unwrap()
}

/// Tick until `unit` pulses done and return that tick's outputs.
fn tick_until_done(npu: &mut Npu, unit: usize) -> UnitOutput {
  for _ in 0..TICK_LIMIT {
    npu.tick();
    let out = npu.output(unit).unwrap();
    if out.done {
      return out.clone();
    }
  }
  panic!("unit {} never finished", unit);
}

fn drain(npu: &mut Npu) {
  for _ in 0..TICK_LIMIT {
    if !npu.busy() {
      return;
    }
    npu.tick();
  }
  panic!("npu still busy after {} ticks", TICK_LIMIT);
}

#[test]
fn copy_then_identity_mul() {
  let mut npu = npu(4);
  let max = Vector::splat(Q.max());
  npu.write_vector(0, max).unwrap();
  npu.write_matrix(1, TernaryMatrix::identity()).unwrap();

  npu.issue_packet(&InstructionPacket::copy(1, 0)).unwrap();
  let out = tick_until_done(&mut npu, 1);
  assert_eq!(out.result, Some(max));
  assert_eq!(npu.scratchpad(1), Some(max));

  npu.issue_packet(&InstructionPacket::compute(1, CompType::Mul)).unwrap();
  let out = tick_until_done(&mut npu, 1);
  assert_eq!(out.result, Some(max));
  assert!(!out.status.zero);
  assert!(!out.status.overflow);
  assert_eq!(out.state, EngineState::Idle);
  assert_eq!(npu.vector(1).unwrap(), max);

  drain(&mut npu);
  let stats = npu.stats();
  assert_eq!(stats.units[1].retired, 2);
  assert_eq!(stats.alu.grants, 1);
  assert_eq!(stats.mem.grants, 1);
}

#[test]
fn relu_alternating_signs() {
  let mut npu = npu(2);
  let half = Q.from_f32(0.5);
  npu.write_vector(0, Vector::from_fn(|i| if i % 2 == 0 { half } else { -half })).unwrap();

  npu.issue_packet(&InstructionPacket::compute(0, CompType::Relu)).unwrap();
  let out = tick_until_done(&mut npu, 0);
  let expected = Vector::from_fn(|i| if i % 2 == 0 { half } else { 0 });
  assert_eq!(out.result, Some(expected));
  assert!(!out.status.zero);
}

#[test]
fn add_vec_sums_peer_vector() {
  let mut npu = npu(4);
  let quarter = Q.from_f32(0.25);
  npu.write_vector(0, Vector::splat(quarter)).unwrap();
  npu.write_vector(2, Vector::splat(quarter)).unwrap();

  npu.issue_packet(&InstructionPacket::add_vec(2, 0)).unwrap();
  let out = tick_until_done(&mut npu, 2);
  assert_eq!(out.result, Some(Vector::splat(2 * quarter)));
  assert_eq!(npu.vector(0).unwrap(), Vector::splat(quarter));
}

#[test]
fn alu_is_shared_round_robin() {
  let mut npu = npu(4);
  for u in 0..4 {
    npu.write_vector(u, Vector::splat(Q.from_f32(0.5))).unwrap();
    npu.issue_packet(&InstructionPacket::compute(u, CompType::Relu)).unwrap();
  }

  let mut finished = [None; 4];
  for _ in 0..TICK_LIMIT {
    npu.tick();
    for (u, slot) in finished.iter_mut().enumerate() {
      if npu.output(u).unwrap().done {
        *slot = Some(npu.cycle());
      }
    }
    if finished.iter().all(Option::is_some) {
      break;
    }
  }

  let cycles: Vec<u64> = finished.iter().map(|c| c.unwrap()).collect();
  for pair in cycles.windows(2) {
    assert!(pair[1] >= pair[0] + 16, "{:?}", cycles);
  }
  assert_eq!(npu.stats().alu.grants_per_unit, vec![1, 1, 1, 1]);
}

#[test]
fn busy_unit_rejects_new_instruction() {
  let mut npu = npu(2);
  npu.issue_packet(&InstructionPacket::compute(0, CompType::Tanh)).unwrap();
  npu.tick();
  npu.tick();

  npu.issue_packet(&InstructionPacket::compute(0, CompType::Relu)).unwrap();
  npu.tick();
  assert!(npu.output(0).unwrap().rejected);

  let out = tick_until_done(&mut npu, 0);
  assert_eq!(out.result, Some(Vector::splat(Q.one())));
  assert_eq!(npu.stats().units[0].rejections, 1);
}

#[test]
fn decode_error_aborts_busy_unit() {
  let mut npu = npu(4);
  let before = Vector::splat(Q.from_f32(-0.5));
  npu.write_vector(1, before).unwrap();
  npu.issue_packet(&InstructionPacket::compute(1, CompType::Relu)).unwrap();
  npu.tick();
  npu.tick();
  assert_eq!(npu.unit_state(1).unwrap(), EngineState::Dispatch);

  let layout = *npu.decoder.layout();
  let word = InstructionPacket::compute(1, CompType::Relu).encode(&layout) | (1 << layout.width());
  npu.issue(word).unwrap();
  npu.tick();

  let out = npu.output(1).unwrap();
  assert!(out.aborted);
  assert!(out.decode_error.bad_field);
  assert_eq!(out.state, EngineState::Idle);

  drain(&mut npu);
  assert!(!npu.alu.busy());
  assert_eq!(npu.vector(1).unwrap(), before);
  assert_eq!(npu.stats().units[1].aborts, 1);
}

#[test]
fn decode_error_during_row_store() {
  let mut npu = npu(2);
  npu.write_matrix(0, TernaryMatrix::identity()).unwrap();
  npu.issue_packet(&InstructionPacket::store(0, 0, 5)).unwrap();

  let mut beats = 0;
  for _ in 0..TICK_LIMIT {
    npu.tick();
    if npu.mem.state() == MemState::Access && npu.mem.owner() == Some(0) {
      beats += 1;
      if beats == 4 {
        break;
      }
    }
  }
  assert_eq!(beats, 4);
  assert_eq!(npu.unit_state(0).unwrap(), EngineState::Fetch);

  let layout = *npu.decoder.layout();
  npu.issue(InstructionPacket::nop(0).encode(&layout) | (1 << layout.width())).unwrap();
  npu.tick();

  let out = npu.output(0).unwrap();
  assert!(out.aborted);
  assert!(!out.done);
  assert_eq!(out.state, EngineState::Idle);
  assert_eq!(npu.mem.state(), MemState::Idle);
  assert_eq!(npu.mem.owner(), None);

  for _ in 0..32 {
    npu.tick();
    assert!(!npu.output(0).unwrap().done);
  }
  assert!(!npu.busy());
  assert_eq!(npu.bank_matrix(), &TernaryMatrix::zero());
  assert_eq!(npu.stats().units[0].aborts, 1);
  assert_eq!(npu.stats().units[0].retired, 0);
}

#[test]
fn memory_is_shared_round_robin() {
  let mut npu = npu(4);
  for u in 0..4 {
    let v = Vector::splat(Q.from_f32(0.125 * (u as f32 + 1.0)));
    npu.write_bank_vector(u * 16, v).unwrap();
    npu.issue_packet(&InstructionPacket::load(u, 0, 0)).unwrap();
  }

  let mut order = Vec::new();
  let mut reissued = false;
  for _ in 0..TICK_LIMIT {
    npu.tick();
    for u in 0..4 {
      let out = npu.output(u).unwrap();
      if out.done {
        assert_eq!(out.result, Some(npu.read_bank_vector(u * 16).unwrap()));
        order.push(u);
      }
    }
    // Unit 0 asks again as soon as it retires; the others still go first.
    if !reissued && order == [0] {
      npu.issue_packet(&InstructionPacket::load(0, 0, 0)).unwrap();
      reissued = true;
    }
    if order.len() == 5 {
      break;
    }
  }

  assert_eq!(order, vec![0, 1, 2, 3, 0]);
  assert_eq!(npu.stats().mem.grants_per_unit, vec![2, 1, 1, 1]);
  assert_eq!(npu.stats().mem.errors, 0);
}

#[test]
fn host_lanes_saturate_before_the_alu() {
  let mut npu = npu(2);
  npu.write_vector(0, Vector::splat(i64::MAX)).unwrap();
  npu.write_vector(1, Vector::splat(i64::MAX)).unwrap();
  assert_eq!(npu.vector(0).unwrap(), Vector::splat(Q.max()));

  npu.issue_packet(&InstructionPacket::add_vec(1, 0)).unwrap();
  let out = tick_until_done(&mut npu, 1);
  assert_eq!(out.result, Some(Vector::splat(Q.max())));
  assert!(out.status.overflow);

  npu.set_data_in(0, Vector::splat(i64::MIN)).unwrap();
  npu.tick();
  assert_eq!(npu.vector(0).unwrap(), Vector::splat(Q.min()));
  assert_eq!(npu.scratchpad(0), Some(Vector::splat(Q.min())));
}

#[test]
fn matrix_rows_out_of_range() {
  let mut npu = npu(2);
  npu.issue_packet(&InstructionPacket::load(0, 14, 3)).unwrap();

  let mut saw_error = false;
  for _ in 0..TICK_LIMIT {
    npu.tick();
    if npu.output(0).unwrap().mem_error {
      saw_error = true;
      break;
    }
  }
  assert!(saw_error);
  assert_eq!(npu.unit_state(0).unwrap(), EngineState::Error);

  npu.tick();
  assert_eq!(npu.unit_state(0).unwrap(), EngineState::Idle);
  drain(&mut npu);
  assert_eq!(npu.matrix(0).unwrap(), TernaryMatrix::zero());
  assert_eq!(npu.stats().mem.errors, 1);
  assert_eq!(npu.stats().units[0].mem_errors, 1);
}

#[test]
fn vector_slot_past_bank_depth() {
  let mut npu = Npu::new(NpuConfig::with_units(4).vector_bank_depth(32)).unwrap();
  npu.issue_packet(&InstructionPacket::load(2, 0, 0)).unwrap();
  drain(&mut npu);
  assert_eq!(npu.stats().units[2].mem_errors, 1);
  assert_eq!(npu.stats().units[2].retired, 0);
}

#[test]
fn matrix_travels_through_the_bank() {
  let mut npu = npu(2);
  npu.write_matrix(0, TernaryMatrix::identity()).unwrap();

  npu.issue_packet(&InstructionPacket::store(0, 0, 5)).unwrap();
  tick_until_done(&mut npu, 0);
  assert_eq!(npu.bank_matrix(), &TernaryMatrix::identity());

  npu.issue_packet(&InstructionPacket::load(1, 0, 5)).unwrap();
  tick_until_done(&mut npu, 1);
  assert_eq!(npu.matrix(1).unwrap(), TernaryMatrix::identity());
}

#[test]
fn vector_store_and_load() {
  let mut npu = npu(2);
  let v = Vector::from_fn(|i| (i as i64) << 24);
  npu.write_vector(1, v).unwrap();

  npu.issue_packet(&InstructionPacket::store(1, 3, 0)).unwrap();
  tick_until_done(&mut npu, 1);
  assert_eq!(npu.read_bank_vector(16 + 3).unwrap(), v);

  npu.write_vector(1, Vector::zero()).unwrap();
  npu.issue_packet(&InstructionPacket::load(1, 3, 0)).unwrap();
  let out = tick_until_done(&mut npu, 1);
  assert_eq!(out.result, Some(v));
  assert_eq!(npu.scratchpad(1), Some(v));
}

#[test]
fn vliw_push_and_pull() {
  let mut npu = Npu::new(NpuConfig::with_units(2).engine(EngineKind::Vliw)).unwrap();
  let v = Vector::splat(Q.from_f32(0.125));

  npu.set_data_in(0, v).unwrap();
  let push = VliwBundle::builder()
    .op(MicroOp::LoadV0)
    .unwrap()
    .op(MicroOp::PushV0)
    .unwrap()
    .build();
  npu.issue_bundle(0, push).unwrap();
  npu.tick();
  assert!(npu.output(0).unwrap().done);
  assert_eq!(npu.scratchpad(0), Some(v));

  let pull = VliwBundle::builder().peer(0).op(MicroOp::PullV0).unwrap().build();
  npu.issue_bundle(1, pull).unwrap();
  npu.tick();
  assert!(npu.output(1).unwrap().done);
  assert_eq!(npu.vector(1).unwrap(), v);
  assert!(!npu.busy());
}

#[test]
fn vliw_own_slot_pull() {
  let mut npu = Npu::new(NpuConfig::with_units(4).engine(EngineKind::Vliw)).unwrap();
  let v = Vector::splat(Q.from_f32(-0.375));
  let bundle = |ops: &[MicroOp]| {
    ops
      .iter()
      .try_fold(VliwBundle::builder(), |b, &op| b.op(op))
      .unwrap()
      .build()
  };

  npu.set_data_in(2, v).unwrap();
  npu.issue_bundle(2, bundle(&[MicroOp::LoadV0, MicroOp::PushV0])).unwrap();
  npu.tick();
  assert_eq!(npu.scratchpad(2), Some(v));
  assert_eq!(npu.scratchpad(0), None);

  for _ in 0..3 {
    npu.issue_bundle(2, bundle(&[MicroOp::ZeroV0])).unwrap();
    npu.tick();
    assert_eq!(npu.vector(2).unwrap(), Vector::zero());

    npu.issue_bundle(2, bundle(&[MicroOp::PullV0])).unwrap();
    npu.tick();
    let out = npu.output(2).unwrap();
    assert!(out.done);
    assert!(!out.status.invalid);
    assert_eq!(npu.vector(2).unwrap(), v);
  }
  assert_eq!(npu.scratchpad(2), Some(v));
}

#[test]
fn reset_through_module_trait() {
  let mut npu = npu(2);
  npu.write_vector(0, Vector::splat(7)).unwrap();
  npu.issue_packet(&InstructionPacket::copy(1, 0)).unwrap();
  npu.tick();
  Module::reset(&mut npu);
  assert_eq!(npu.name(), "npu");
  assert!(!npu.busy());
  assert_eq!(npu.scratchpad(0), None);
}
