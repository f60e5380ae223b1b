//! Per-unit execution engines
//!
//! Both flavors sit behind [`Engine`]: the top level hands each unit an
//! [`EngineInput`] once per tick and routes the returned [`EngineEffects`]
//! to the arbiters, the scratchpad and the unit's output port.

pub mod bundle;
pub mod scalar;
pub mod vliw;

use serde::Serialize;

pub use bundle::{BundleBuilder, MicroOp, VliwBundle};
pub use scalar::ScalarEngine;
pub use vliw::VliwEngine;

use crate::arbiter::AluRequest;
use crate::config::EngineKind;
use crate::decoder::DecodeOutput;
use crate::math::{ComputeStatus, FixedFormat, TernaryMatrix, Vector};
use crate::memdomain::{MemData, MemRequest, Scratchpad};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum EngineState {
  #[default]
  Idle,
  Fetch,
  Dispatch,
  Execute,
  Writeback,
  Error,
}

/// What a unit is told to do this tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
  Control(DecodeOutput),
  Bundle(VliwBundle),
}

/// Memory arbiter signals addressed to one unit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MemPort {
  pub grant: bool,
  pub done: bool,
  pub error: bool,
  pub data: MemData,
}

/// Compute arbiter signals addressed to one unit.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AluPort {
  pub done: bool,
  pub result: Vector,
  pub status: ComputeStatus,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngineInput {
  pub instruction: Option<Instruction>,
  pub data_in: Option<Vector>,
  pub matrix_in: Option<TernaryMatrix>,
  pub mem: MemPort,
  pub alu: AluPort,
}

/// Everything an engine drives during one tick.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngineEffects {
  pub mem_request: Option<MemRequest>,
  pub alu_request: Option<AluRequest>,
  /// Vector to publish in this unit's scratchpad slot.
  pub push: Option<Vector>,
  pub result: Option<Vector>,
  pub matrix_out: Option<TernaryMatrix>,
  pub status: ComputeStatus,
  pub done: bool,
  pub ready: bool,
  pub busy: bool,
  /// The in-flight operation was dropped; the arbiters must release the unit.
  pub aborted: bool,
  /// A valid instruction arrived while the unit was busy.
  pub rejected: bool,
  pub mem_error: bool,
}

/// Per-unit counters for the simulator report.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct UnitStats {
  pub retired: u64,
  pub aborts: u64,
  pub rejections: u64,
  pub stall_cycles: u64,
  pub mem_errors: u64,
  pub invalid_ops: u64,
}

pub trait Engine {
  fn unit(&self) -> usize;

  fn kind(&self) -> EngineKind;

  fn state(&self) -> EngineState;

  /// Advance one tick. `scratchpad` holds the pre-tick contents.
  fn step(&mut self, input: &EngineInput, scratchpad: &Scratchpad) -> EngineEffects;

  /// Primary vector register (`V` or `V0`).
  fn vector(&self) -> Vector;

  fn matrix(&self) -> &TernaryMatrix;

  /// Host-side preload of the primary vector register.
  fn write_vector(&mut self, value: Vector);

  fn write_matrix(&mut self, value: TernaryMatrix);

  fn status(&self) -> ComputeStatus;

  fn stats(&self) -> &UnitStats;

  fn reset(&mut self);
}

/// Build the engine flavor selected by the configuration.
pub fn build(kind: EngineKind, unit: usize, format: FixedFormat) -> Box<dyn Engine> {
  match kind {
    EngineKind::Scalar => Box::new(ScalarEngine::new(unit, format)),
    EngineKind::Vliw => Box::new(VliwEngine::new(unit, format)),
  }
}
