/// Shared Compute Arbiter - one ALU pipeline time-shared by every unit
use log::{debug, warn};

use super::round_robin::RoundRobin;
use super::ArbiterStats;
use crate::builtin::{Module, Wire};
use crate::decoder::CompType;
use crate::math::kernels::{matvec_row, relu, sat_add, tanh_clamp};
use crate::math::{ComputeStatus, FixedFormat, Saturated, TernaryMatrix, Vector, LANES};

/// Operands latched by the ALU when a request is granted.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct AluRequest {
  pub op: CompType,
  pub vector: Vector,
  pub matrix: TernaryMatrix,
  /// Second operand for ADD.
  pub operand: Vector,
}

impl AluRequest {
  fn lane(&self, fmt: &FixedFormat, lane: usize) -> Saturated {
    match self.op {
      CompType::Add => sat_add(fmt, self.vector.0[lane], self.operand.0[lane]),
      CompType::Mul => matvec_row(fmt, &self.matrix, &self.vector, lane),
      CompType::Tanh => Saturated::exact(tanh_clamp(fmt, self.vector.0[lane])),
      CompType::Relu => Saturated::exact(relu(self.vector.0[lane])),
    }
  }
}

/// ComputeArbiter - grants the ALU to one unit, then walks the 16 lanes
pub struct ComputeArbiter {
  name: String,
  format: FixedFormat,
  rr: RoundRobin,

  // Input: per-unit requests, re-asserted every cycle until done
  pub requests: Vec<Wire<AluRequest>>,

  // Output: unit whose operation finished this cycle
  pub done: Wire<usize>,

  // Internal state
  owner: Option<usize>,
  job: AluRequest,
  lane: usize,
  bus: Vector,
  bus_owner: Option<usize>,
  status: ComputeStatus,

  stats: ArbiterStats,
}

impl ComputeArbiter {
  pub fn new(name: impl Into<String>, unit_count: usize, format: FixedFormat) -> Self {
    Self {
      name: name.into(),
      format,
      rr: RoundRobin::new(unit_count),
      requests: vec![Wire::default(); unit_count],
      done: Wire::default(),
      owner: None,
      job: AluRequest::default(),
      lane: 0,
      bus: Vector::zero(),
      bus_owner: None,
      status: ComputeStatus::default(),
      stats: ArbiterStats::new(unit_count),
    }
  }

  pub fn owner(&self) -> Option<usize> {
    self.owner
  }

  pub fn busy(&self) -> bool {
    self.owner.is_some()
  }

  /// Lane the pipeline will evaluate next.
  pub fn counter(&self) -> usize {
    self.lane
  }

  pub fn priority(&self) -> usize {
    self.rr.priority()
  }

  pub fn done_for(&self, unit: usize) -> bool {
    self.done.get() == Some(&unit)
  }

  /// The result bus as seen by `unit`: the owner sees the lanes computed so
  /// far, every other unit sees zero.
  pub fn result_for(&self, unit: usize) -> Vector {
    if self.bus_owner == Some(unit) {
      self.bus
    } else {
      Vector::zero()
    }
  }

  pub fn status_for(&self, unit: usize) -> ComputeStatus {
    if self.done_for(unit) {
      self.status
    } else {
      ComputeStatus::default()
    }
  }

  /// Drop a unit's request and, if it owns the ALU, its in-flight job.
  pub fn cancel(&mut self, unit: usize) {
    self.requests[unit].clear();
    if self.owner == Some(unit) {
      warn!("[{}] unit {} aborted at lane {}", self.name, unit, self.lane);
      self.owner = None;
      self.bus_owner = None;
      self.lane = 0;
    }
  }

  pub fn stats(&self) -> &ArbiterStats {
    &self.stats
  }

  fn grant(&mut self) {
    let requests = &self.requests;
    let Some(unit) = self.rr.pick(|u| requests[u].valid) else {
      return;
    };
    self.rr.grant(unit);
    self.owner = Some(unit);
    self.job = self.requests[unit].value.clone();
    self.lane = 0;
    self.bus = Vector::zero();
    self.bus_owner = Some(unit);
    self.status = ComputeStatus::default();
    self.stats.record_grant(unit);
    debug!("[{}] grant unit={} op={:?}", self.name, unit, self.job.op);
  }
}

impl Module for ComputeArbiter {
  fn run(&mut self) {
    self.done.clear();

    if self.owner.is_none() {
      self.grant();
    }

    let Some(unit) = self.owner else {
      self.bus_owner = None;
      return;
    };

    self.stats.busy_cycles += 1;
    let lane = self.job.lane(&self.format, self.lane);
    self.bus.0[self.lane] = lane.value;
    self.status.absorb(&lane);

    if self.lane == LANES - 1 {
      self.status.zero = self.bus.is_zero();
      self.done.set(unit);
      self.owner = None;
      self.lane = 0;
      debug!("[{}] done unit={} status={:?}", self.name, unit, self.status);
    } else {
      self.lane += 1;
    }
  }

  fn reset(&mut self) {
    for req in self.requests.iter_mut() {
      *req = Wire::default();
    }
    self.done = Wire::default();
    self.rr.reset();
    self.owner = None;
    self.job = AluRequest::default();
    self.lane = 0;
    self.bus = Vector::zero();
    self.bus_owner = None;
    self.status = ComputeStatus::default();
    self.stats = ArbiterStats::new(self.requests.len());
  }

  fn name(&self) -> &str {
    &self.name
  }
}
