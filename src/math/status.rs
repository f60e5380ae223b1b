/// Per-step compute flags
use serde::{Deserialize, Serialize};

use super::fixed::Saturated;

/// Four independent flags describing the last compute step. They are
/// rebuilt from scratch at the start of every step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ComputeStatus {
  pub overflow: bool,
  pub underflow: bool,
  pub zero: bool,
  pub invalid: bool,
}

impl ComputeStatus {
  pub fn absorb(&mut self, lane: &Saturated) {
    self.overflow |= lane.overflow;
    self.underflow |= lane.underflow;
  }

  /// Fold another step's flags into this one. `zero` follows the later step.
  pub fn merge(&mut self, later: &ComputeStatus) {
    self.overflow |= later.overflow;
    self.underflow |= later.underflow;
    self.invalid |= later.invalid;
    self.zero = later.zero;
  }

  pub fn any_error(&self) -> bool {
    self.overflow || self.underflow || self.invalid
  }
}
