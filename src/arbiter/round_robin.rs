/// Round-robin priority pointer shared by both arbiters

/// Tracks the last granted requester. The requester right after it has the
/// highest priority, so an always-requesting unit waits at most `size - 1`
/// grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundRobin {
  size: usize,
  last: Option<usize>,
}

impl RoundRobin {
  pub fn new(size: usize) -> Self {
    Self { size, last: None }
  }

  /// The single highest-priority position.
  pub fn priority(&self) -> usize {
    match self.last {
      Some(last) => (last + 1) % self.size,
      None => 0,
    }
  }

  /// Pick the first requester at or after the priority position. Does not
  /// move the pointer; call `grant` once the grant is issued.
  pub fn pick(&self, requests: impl Fn(usize) -> bool) -> Option<usize> {
    let start = self.priority();
    (0..self.size).map(|k| (start + k) % self.size).find(|&u| requests(u))
  }

  pub fn grant(&mut self, unit: usize) {
    self.last = Some(unit);
  }

  pub fn last(&self) -> Option<usize> {
    self.last
  }

  pub fn reset(&mut self) {
    self.last = None;
  }
}
