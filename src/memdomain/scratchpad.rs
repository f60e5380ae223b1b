// Shared scratchpad: one published vector per unit id

use log::debug;

use crate::math::Vector;

/// Cross-unit hand-off store. Slot `k` is written only by unit `k`.
///
/// Pushes made during a tick are staged and land at `commit`, so every read
/// in the same tick sees the pre-tick contents.
#[derive(Debug, Clone)]
pub struct Scratchpad {
  slots: Vec<Option<Vector>>,
  staged: Vec<(usize, Vector)>,
  pushes: u64,
}

impl Scratchpad {
  pub fn new(unit_count: usize) -> Self {
    Self {
      slots: vec![None; unit_count],
      staged: Vec::new(),
      pushes: 0,
    }
  }

  pub fn len(&self) -> usize {
    self.slots.len()
  }

  pub fn is_empty(&self) -> bool {
    self.slots.is_empty()
  }

  /// `None` when the slot was never written or the id is out of range.
  pub fn read(&self, unit: usize) -> Option<Vector> {
    self.slots.get(unit).copied().flatten()
  }

  pub fn push(&mut self, unit: usize, value: Vector) {
    if unit < self.slots.len() {
      self.staged.retain(|(u, _)| *u != unit);
      self.staged.push((unit, value));
    }
  }

  pub fn commit(&mut self) {
    for (unit, value) in self.staged.drain(..) {
      debug!("[Scratchpad] slot {} <- push", unit);
      self.slots[unit] = Some(value);
      self.pushes += 1;
    }
  }

  pub fn pushes(&self) -> u64 {
    self.pushes
  }

  pub fn reset(&mut self) {
    self.slots.fill(None);
    self.staged.clear();
    self.pushes = 0;
  }
}
