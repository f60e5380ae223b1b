/// Shared Memory Arbiter - serializes unit access to the banks and scratchpad
use log::{debug, warn};

use super::bank::{MatrixBank, VectorBank, WeightRow};
use super::scratchpad::Scratchpad;
use crate::arbiter::{ArbiterStats, RoundRobin};
use crate::builtin::{Module, Wire};
use crate::error::BankError;
use crate::math::Vector;

/// What a unit asks the memory fabric for. Vector addresses are absolute
/// vector-bank slots.
#[derive(Debug, Clone, PartialEq)]
pub enum MemRequest {
  LoadVector { addr: usize },
  StoreVector { addr: usize, data: Vector },
  LoadRows { start: usize, count: usize },
  StoreRows { start: usize, rows: Vec<WeightRow> },
  /// Compute-support read of a second operand from the vector bank.
  FetchOperand { addr: usize },
  /// Compute-support read of another unit's scratchpad slot.
  FetchPeer { unit: usize },
}

impl Default for MemRequest {
  fn default() -> Self {
    MemRequest::LoadVector { addr: 0 }
  }
}

impl MemRequest {
  /// Cycles spent in ACCESS: one per vector or matrix row moved.
  pub fn beats(&self) -> usize {
    match self {
      MemRequest::LoadRows { count, .. } => (*count).max(1),
      MemRequest::StoreRows { rows, .. } => rows.len().max(1),
      _ => 1,
    }
  }
}

/// Data returned to the requester when its access completes.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum MemData {
  #[default]
  None,
  Vector(Vector),
  Rows { start: usize, rows: Vec<WeightRow> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemState {
  Idle,
  Arbitrate,
  Access,
  Complete,
  Error,
}

/// MemoryArbiter - owns both banks and the scratchpad
pub struct MemoryArbiter {
  name: String,
  rr: RoundRobin,
  state: MemState,

  vectors: VectorBank,
  matrix: MatrixBank,
  scratchpad: Scratchpad,

  // Input: per-unit requests, held until done or error
  pub requests: Vec<Wire<MemRequest>>,

  // Output
  pub grant: Vec<bool>,
  pub done: Wire<usize>,
  pub error: Wire<usize>,
  data: MemData,

  // Internal state
  owner: Option<usize>,
  job: MemRequest,
  beat: usize,
  staged: MemData,
  fault: Option<BankError>,

  stats: ArbiterStats,
}

impl MemoryArbiter {
  pub fn new(name: impl Into<String>, unit_count: usize, vector_depth: usize) -> Self {
    Self {
      name: name.into(),
      rr: RoundRobin::new(unit_count),
      state: MemState::Idle,
      vectors: VectorBank::new(vector_depth),
      matrix: MatrixBank::new(),
      scratchpad: Scratchpad::new(unit_count),
      requests: vec![Wire::default(); unit_count],
      grant: vec![false; unit_count],
      done: Wire::default(),
      error: Wire::default(),
      data: MemData::None,
      owner: None,
      job: MemRequest::default(),
      beat: 0,
      staged: MemData::None,
      fault: None,
      stats: ArbiterStats::new(unit_count),
    }
  }

  pub fn state(&self) -> MemState {
    self.state
  }

  pub fn owner(&self) -> Option<usize> {
    self.owner
  }

  pub fn busy(&self) -> bool {
    self.state != MemState::Idle
  }

  pub fn priority(&self) -> usize {
    self.rr.priority()
  }

  pub fn done_for(&self, unit: usize) -> bool {
    self.done.get() == Some(&unit)
  }

  pub fn error_for(&self, unit: usize) -> bool {
    self.error.get() == Some(&unit)
  }

  /// Data delivered to `unit` this cycle; empty for everyone else.
  pub fn data_for(&self, unit: usize) -> MemData {
    if self.done_for(unit) {
      self.data.clone()
    } else {
      MemData::None
    }
  }

  /// The last address error, if the latest access failed.
  pub fn fault(&self) -> Option<&BankError> {
    self.fault.as_ref()
  }

  pub fn vectors(&self) -> &VectorBank {
    &self.vectors
  }

  pub fn vectors_mut(&mut self) -> &mut VectorBank {
    &mut self.vectors
  }

  pub fn matrix(&self) -> &MatrixBank {
    &self.matrix
  }

  pub fn matrix_mut(&mut self) -> &mut MatrixBank {
    &mut self.matrix
  }

  pub fn scratchpad(&self) -> &Scratchpad {
    &self.scratchpad
  }

  pub fn scratchpad_mut(&mut self) -> &mut Scratchpad {
    &mut self.scratchpad
  }

  pub fn stats(&self) -> &ArbiterStats {
    &self.stats
  }

  /// Drop a unit's request and abandon its access if it owns the banks.
  /// Staged stores are discarded, so nothing is committed.
  pub fn cancel(&mut self, unit: usize) {
    self.requests[unit].clear();
    if self.owner == Some(unit) {
      warn!("[{}] unit {} aborted in {:?}", self.name, unit, self.state);
      self.grant[unit] = false;
      self.release();
    }
  }

  fn release(&mut self) {
    self.owner = None;
    self.beat = 0;
    self.staged = MemData::None;
    self.state = MemState::Idle;
  }

  fn arbitrate(&mut self) {
    let requests = &self.requests;
    let Some(unit) = self.rr.pick(|u| requests[u].valid) else {
      self.state = MemState::Idle;
      return;
    };
    self.rr.grant(unit);
    self.owner = Some(unit);
    self.job = self.requests[unit].value.clone();
    self.beat = 0;
    self.staged = MemData::None;
    self.fault = None;
    self.grant[unit] = true;
    self.stats.record_grant(unit);
    self.state = MemState::Access;
    debug!("[{}] grant unit={} {:?}", self.name, unit, self.job);
  }

  /// Move one vector or one row. Loads and stores both land in `staged`;
  /// stores reach the bank only at COMPLETE.
  fn access(&mut self) -> Result<(), BankError> {
    match &self.job {
      MemRequest::LoadVector { addr } | MemRequest::FetchOperand { addr } => {
        self.staged = MemData::Vector(self.vectors.read(*addr)?);
      },
      MemRequest::StoreVector { addr, data } => {
        self.vectors.check(*addr)?;
        self.staged = MemData::Vector(*data);
      },
      MemRequest::FetchPeer { unit } => {
        self.staged = MemData::Vector(self.scratchpad.read(*unit).unwrap_or_default());
      },
      MemRequest::LoadRows { start, count } => {
        self.matrix.check_rows(*start, *count)?;
        let row = self.matrix.read_row(start + self.beat)?;
        match &mut self.staged {
          MemData::Rows { rows, .. } => rows.push(row),
          staged => {
            *staged = MemData::Rows {
              start: *start,
              rows: vec![row],
            }
          },
        }
      },
      MemRequest::StoreRows { start, rows } => {
        self.matrix.check_rows(*start, rows.len())?;
        if self.beat == 0 {
          self.staged = MemData::Rows {
            start: *start,
            rows: rows.clone(),
          };
        }
      },
    }
    Ok(())
  }

  fn complete(&mut self, unit: usize) -> Result<(), BankError> {
    match (&self.job, &self.staged) {
      (MemRequest::StoreVector { addr, .. }, MemData::Vector(v)) => self.vectors.write(*addr, *v)?,
      (MemRequest::StoreRows { .. }, MemData::Rows { start, rows }) => {
        for (i, row) in rows.iter().enumerate() {
          self.matrix.write_row(start + i, *row)?;
        }
      },
      _ => {},
    }
    self.data = match self.job {
      MemRequest::StoreVector { .. } | MemRequest::StoreRows { .. } => MemData::None,
      _ => std::mem::take(&mut self.staged),
    };
    self.done.set(unit);
    Ok(())
  }
}

impl Module for MemoryArbiter {
  fn run(&mut self) {
    self.done.clear();
    self.error.clear();
    self.data = MemData::None;

    if self.state != MemState::Idle {
      self.stats.busy_cycles += 1;
    }

    match self.state {
      MemState::Idle => {
        if self.requests.iter().any(|r| r.valid) {
          self.state = MemState::Arbitrate;
        }
      },
      MemState::Arbitrate => self.arbitrate(),
      MemState::Access => {
        if let Err(e) = self.access() {
          self.fault = Some(e);
          self.state = MemState::Error;
        } else {
          self.beat += 1;
          if self.beat >= self.job.beats() {
            self.state = MemState::Complete;
          }
        }
      },
      MemState::Complete => {
        if let Some(unit) = self.owner {
          self.grant[unit] = false;
          if let Err(e) = self.complete(unit) {
            self.fault = Some(e);
            self.state = MemState::Error;
            return;
          }
          self.requests[unit].clear();
          debug!("[{}] done unit={}", self.name, unit);
        }
        self.release();
      },
      MemState::Error => {
        self.grant.fill(false);
        if let Some(unit) = self.owner {
          self.error.set(unit);
          self.requests[unit].clear();
          warn!("[{}] unit {} access failed: {:?}", self.name, unit, self.fault);
        }
        self.stats.errors += 1;
        self.release();
      },
    }
  }

  fn reset(&mut self) {
    let units = self.requests.len();
    self.rr.reset();
    self.state = MemState::Idle;
    self.vectors.clear();
    self.matrix.clear();
    self.scratchpad.reset();
    self.requests = vec![Wire::default(); units];
    self.grant.fill(false);
    self.done = Wire::default();
    self.error = Wire::default();
    self.data = MemData::None;
    self.job = MemRequest::default();
    self.fault = None;
    self.release();
    self.stats = ArbiterStats::new(units);
  }

  fn name(&self) -> &str {
    &self.name
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::math::{Ternary, LANES};

  /// Run until the arbiter pulses done or error for `unit`.
  fn run_until(mem: &mut MemoryArbiter, unit: usize) -> (usize, bool) {
    for cycle in 1..=64 {
      mem.run();
      if mem.done_for(unit) {
        return (cycle, true);
      }
      if mem.error_for(unit) {
        return (cycle, false);
      }
    }
    panic!("unit {} never completed", unit);
  }

  #[test]
  fn test_vector_load_walks_states() {
    let mut mem = MemoryArbiter::new("mem", 2, 64);
    mem.vectors_mut().write(17, Vector::splat(5)).unwrap();
    mem.requests[1].set(MemRequest::LoadVector { addr: 17 });

    mem.run();
    assert_eq!(mem.state(), MemState::Arbitrate);
    mem.run();
    assert_eq!(mem.state(), MemState::Access);
    assert!(mem.grant[1]);
    mem.run();
    assert_eq!(mem.state(), MemState::Complete);
    mem.run();
    assert!(mem.done_for(1));
    assert!(!mem.grant[1]);
    assert_eq!(mem.data_for(1), MemData::Vector(Vector::splat(5)));
    assert_eq!(mem.data_for(0), MemData::None);
    assert_eq!(mem.state(), MemState::Idle);
  }

  #[test]
  fn test_store_commits_at_complete() {
    let mut mem = MemoryArbiter::new("mem", 1, 64);
    mem.requests[0].set(MemRequest::StoreVector {
      addr: 3,
      data: Vector::splat(8),
    });
    mem.run();
    mem.run();
    mem.run();
    assert_eq!(mem.vectors().read(3), Ok(Vector::zero()));
    mem.run();
    assert!(mem.done_for(0));
    assert_eq!(mem.vectors().read(3), Ok(Vector::splat(8)));
  }

  #[test]
  fn test_row_transfer_one_beat_per_row() {
    let mut mem = MemoryArbiter::new("mem", 1, 64);
    let rows = vec![[Ternary::Plus; LANES]; 4];
    mem.requests[0].set(MemRequest::StoreRows { start: 2, rows });
    let (cycles, ok) = run_until(&mut mem, 0);
    assert!(ok);
    // idle, arbitrate, four beats, complete
    assert_eq!(cycles, 7);
    assert_eq!(mem.matrix().matrix().get(5, 0), Ternary::Plus);
    assert_eq!(mem.matrix().matrix().get(6, 0), Ternary::Zero);

    mem.requests[0].set(MemRequest::LoadRows { start: 4, count: 2 });
    let (_, ok) = run_until(&mut mem, 0);
    assert!(ok);
    assert!(matches!(mem.data, MemData::Rows { start: 4, ref rows } if rows.len() == 2));
  }

  #[test]
  fn test_range_error_resets_controller() {
    let mut mem = MemoryArbiter::new("mem", 2, 64);
    mem.requests[0].set(MemRequest::StoreRows {
      start: 14,
      rows: vec![[Ternary::Minus; LANES]; 4],
    });
    let (_, ok) = run_until(&mut mem, 0);
    assert!(!ok);
    assert!(mem.grant.iter().all(|g| !g));
    assert_eq!(mem.state(), MemState::Idle);
    assert_eq!(mem.fault(), Some(&BankError::MatrixRows { start: 14, end: 18 }));
    assert_eq!(mem.matrix().matrix(), &crate::math::TernaryMatrix::zero());
    assert_eq!(mem.stats().errors, 1);

    mem.requests[1].set(MemRequest::LoadVector { addr: 64 });
    let (_, ok) = run_until(&mut mem, 1);
    assert!(!ok);
  }

  #[test]
  fn test_round_robin_between_units() {
    let mut mem = MemoryArbiter::new("mem", 3, 64);
    let mut order = Vec::new();
    for _ in 0..40 {
      for u in 0..3 {
        if !mem.requests[u].valid {
          mem.requests[u].set(MemRequest::LoadVector { addr: u });
        }
      }
      mem.run();
      if let Some(&u) = mem.done.get() {
        order.push(u);
      }
      assert!(mem.grant.iter().filter(|&&g| g).count() <= 1);
    }
    assert_eq!(&order[..6], &[0, 1, 2, 0, 1, 2]);
  }

  #[test]
  fn test_fetch_peer_empty_slot_is_zero() {
    let mut mem = MemoryArbiter::new("mem", 2, 64);
    mem.requests[0].set(MemRequest::FetchPeer { unit: 1 });
    run_until(&mut mem, 0);
    assert_eq!(mem.data_for(0), MemData::Vector(Vector::zero()));

    mem.scratchpad_mut().push(1, Vector::splat(2));
    mem.scratchpad_mut().commit();
    mem.requests[0].set(MemRequest::FetchPeer { unit: 1 });
    run_until(&mut mem, 0);
    assert_eq!(mem.data_for(0), MemData::Vector(Vector::splat(2)));
  }

  #[test]
  fn test_cancel_discards_access() {
    let mut mem = MemoryArbiter::new("mem", 1, 64);
    mem.requests[0].set(MemRequest::StoreVector {
      addr: 0,
      data: Vector::splat(1),
    });
    mem.run();
    mem.run();
    mem.run();
    mem.cancel(0);
    assert_eq!(mem.state(), MemState::Idle);
    mem.run();
    assert_eq!(mem.vectors().read(0), Ok(Vector::zero()));
  }
}
