/// VLIW bundle word: four 5-bit micro-op slots and an optional peer unit id
use serde::{Deserialize, Serialize};

use crate::error::{NpuError, Result};

pub const SLOTS: usize = 4;
const SLOT_BITS: u32 = 5;
const SLOT_MASK: u32 = (1 << SLOT_BITS) - 1;
const PEER_SHIFT: u32 = 20;
const PEER_MASK: u32 = 0xff;
const PEER_VALID: u32 = 1 << 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MicroOp {
  #[default]
  Nop,
  LoadV0,
  LoadV1,
  LoadM0,
  StoreV0,
  StoreV1,
  StoreM0,
  ZeroV0,
  ZeroV1,
  ZeroM0,
  PushV0,
  PullV0,
  PullV1,
  Matvec,
  Add,
  Sub,
  Relu,
  Tanh,
  Square,
  /// A slot code with no defined operation.
  Unknown(u8),
}

const NAMED: [(MicroOp, &str); 19] = [
  (MicroOp::Nop, "nop"),
  (MicroOp::LoadV0, "load_v0"),
  (MicroOp::LoadV1, "load_v1"),
  (MicroOp::LoadM0, "load_m0"),
  (MicroOp::StoreV0, "store_v0"),
  (MicroOp::StoreV1, "store_v1"),
  (MicroOp::StoreM0, "store_m0"),
  (MicroOp::ZeroV0, "zero_v0"),
  (MicroOp::ZeroV1, "zero_v1"),
  (MicroOp::ZeroM0, "zero_m0"),
  (MicroOp::PushV0, "push_v0"),
  (MicroOp::PullV0, "pull_v0"),
  (MicroOp::PullV1, "pull_v1"),
  (MicroOp::Matvec, "matvec"),
  (MicroOp::Add, "add"),
  (MicroOp::Sub, "sub"),
  (MicroOp::Relu, "relu"),
  (MicroOp::Tanh, "tanh"),
  (MicroOp::Square, "square"),
];

impl MicroOp {
  /// Total over 5-bit codes; 19..=31 decode to `Unknown`.
  pub fn from_code(code: u32) -> Self {
    let code = code & SLOT_MASK;
    NAMED
      .get(code as usize)
      .map(|(op, _)| *op)
      .unwrap_or(MicroOp::Unknown(code as u8))
  }

  pub fn code(self) -> u32 {
    match self {
      MicroOp::Unknown(code) => code as u32 & SLOT_MASK,
      op => NAMED.iter().position(|(named, _)| *named == op).unwrap_or(0) as u32,
    }
  }

  pub fn from_name(name: &str) -> Result<Self> {
    let lower = name.trim().to_ascii_lowercase();
    NAMED
      .iter()
      .find(|(_, n)| *n == lower)
      .map(|(op, _)| *op)
      .ok_or_else(|| NpuError::UnknownMicroOp(name.to_string()))
  }

  pub fn name(self) -> &'static str {
    NAMED
      .iter()
      .find(|(op, _)| *op == self)
      .map(|(_, n)| *n)
      .unwrap_or("unknown")
  }

  /// Ops that run a math kernel and therefore update the status flags.
  pub fn is_compute(self) -> bool {
    matches!(
      self,
      MicroOp::Matvec | MicroOp::Add | MicroOp::Sub | MicroOp::Relu | MicroOp::Tanh | MicroOp::Square
    )
  }
}

/// One issue step for a VLIW unit. Slots run left to right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VliwBundle {
  pub slots: [MicroOp; SLOTS],
  /// Unit whose scratchpad slot `pull_*` reads. `None` means the issuing
  /// unit's own slot.
  pub peer: Option<usize>,
}

impl VliwBundle {
  pub fn builder() -> BundleBuilder {
    BundleBuilder::default()
  }

  pub fn encode(&self) -> u32 {
    let slots = self
      .slots
      .iter()
      .enumerate()
      .fold(0u32, |word, (i, op)| word | (op.code() << (i as u32 * SLOT_BITS)));
    match self.peer {
      Some(peer) => slots | PEER_VALID | ((peer as u32 & PEER_MASK) << PEER_SHIFT),
      None => slots,
    }
  }

  pub fn decode(word: u32) -> Self {
    Self {
      slots: std::array::from_fn(|i| MicroOp::from_code(word >> (i as u32 * SLOT_BITS))),
      peer: (word & PEER_VALID != 0).then(|| ((word >> PEER_SHIFT) & PEER_MASK) as usize),
    }
  }
}

/// Fills bundle slots left to right.
#[derive(Debug, Clone, Default)]
pub struct BundleBuilder {
  ops: Vec<MicroOp>,
  peer: Option<usize>,
}

impl BundleBuilder {
  pub fn op(mut self, op: MicroOp) -> Result<Self> {
    if self.ops.len() == SLOTS {
      return Err(NpuError::BundleFull(op.name().to_string()));
    }
    self.ops.push(op);
    Ok(self)
  }

  pub fn named(self, name: &str) -> Result<Self> {
    self.op(MicroOp::from_name(name)?)
  }

  /// Pull from `unit`'s slot instead of the issuing unit's own.
  pub fn peer(mut self, unit: usize) -> Self {
    self.peer = Some(unit);
    self
  }

  pub fn build(self) -> VliwBundle {
    let mut slots = [MicroOp::Nop; SLOTS];
    for (slot, op) in slots.iter_mut().zip(self.ops) {
      *slot = op;
    }
    VliwBundle { slots, peer: self.peer }
  }
}
