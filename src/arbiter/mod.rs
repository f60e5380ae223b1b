//! Arbitration of the two shared resources: the ALU and the memory banks

pub mod compute;
pub mod round_robin;

use serde::Serialize;

pub use compute::{AluRequest, ComputeArbiter};
pub use round_robin::RoundRobin;

/// Counters kept by each arbiter for the simulator report.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ArbiterStats {
  pub grants: u64,
  pub busy_cycles: u64,
  pub errors: u64,
  pub grants_per_unit: Vec<u64>,
}

impl ArbiterStats {
  pub fn new(unit_count: usize) -> Self {
    Self {
      grants_per_unit: vec![0; unit_count],
      ..Self::default()
    }
  }

  pub fn record_grant(&mut self, unit: usize) {
    self.grants += 1;
    if let Some(n) = self.grants_per_unit.get_mut(unit) {
      *n += 1;
    }
  }
}
