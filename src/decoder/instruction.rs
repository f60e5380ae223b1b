/// Instruction packet fields and their bit layout
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpCode {
  #[default]
  Nop,
  Load,
  Store,
  Compute,
  Copy,
  AddVec,
}

impl OpCode {
  pub fn from_bits(bits: u32) -> Option<Self> {
    match bits {
      0 => Some(OpCode::Nop),
      1 => Some(OpCode::Load),
      2 => Some(OpCode::Store),
      3 => Some(OpCode::Compute),
      4 => Some(OpCode::Copy),
      5 => Some(OpCode::AddVec),
      _ => None,
    }
  }

  pub fn bits(self) -> u32 {
    match self {
      OpCode::Nop => 0,
      OpCode::Load => 1,
      OpCode::Store => 2,
      OpCode::Compute => 3,
      OpCode::Copy => 4,
      OpCode::AddVec => 5,
    }
  }

  /// Opcodes that read another unit's published vector.
  pub fn is_cross_unit(self) -> bool {
    matches!(self, OpCode::Copy | OpCode::AddVec)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompType {
  #[default]
  Add,
  Mul,
  Tanh,
  Relu,
}

impl CompType {
  pub fn from_bits(bits: u32) -> Option<Self> {
    match bits {
      0 => Some(CompType::Add),
      1 => Some(CompType::Mul),
      2 => Some(CompType::Tanh),
      3 => Some(CompType::Relu),
      _ => None,
    }
  }

  pub fn bits(self) -> u32 {
    match self {
      CompType::Add => 0,
      CompType::Mul => 1,
      CompType::Tanh => 2,
      CompType::Relu => 3,
    }
  }
}

const SIZE_SHIFT: u32 = 0;
const SIZE_BITS: u32 = 3;
const VALID_SHIFT: u32 = 3;
const ADDR_SHIFT: u32 = 4;
const ADDR_BITS: u32 = 4;
const COMP_SHIFT: u32 = 8;
const COMP_BITS: u32 = 2;
const OP_SHIFT: u32 = 10;
const OP_BITS: u32 = 3;
const UNIT_SHIFT: u32 = 13;

fn mask(bits: u32) -> u32 {
  (1u32 << bits) - 1
}

/// Bit positions of the packet fields for a given unit count. Unit id
/// fields are as narrow as the unit count allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketLayout {
  pub unit_bits: u32,
}

impl PacketLayout {
  pub fn for_units(unit_count: usize) -> Self {
    let unit_bits = usize::BITS - unit_count.saturating_sub(1).leading_zeros();
    Self {
      unit_bits: unit_bits.max(1),
    }
  }

  fn source_shift(&self) -> u32 {
    UNIT_SHIFT
  }

  fn target_shift(&self) -> u32 {
    UNIT_SHIFT + self.unit_bits
  }

  /// Number of meaningful bits; everything above is reserved.
  pub fn width(&self) -> u32 {
    UNIT_SHIFT + 2 * self.unit_bits
  }

  pub fn reserved_mask(&self) -> u32 {
    !mask(self.width())
  }
}

/// Raw packet fields, before any validation. Every `u32` splits into one of
/// these; `encode` truncates each field to its width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InstructionPacket {
  pub unit: u32,
  #[serde(default)]
  pub source: u32,
  pub opcode: u32,
  #[serde(default)]
  pub comp: u32,
  #[serde(default)]
  pub addr: u32,
  #[serde(default)]
  pub valid: bool,
  #[serde(default)]
  pub size: u32,
}

impl InstructionPacket {
  pub fn new(unit: usize, opcode: OpCode) -> Self {
    Self {
      unit: unit as u32,
      opcode: opcode.bits(),
      ..Self::default()
    }
  }

  pub fn nop(unit: usize) -> Self {
    Self::new(unit, OpCode::Nop)
  }

  pub fn load(unit: usize, addr: u32, size: u32) -> Self {
    Self {
      addr,
      size,
      valid: true,
      ..Self::new(unit, OpCode::Load)
    }
  }

  pub fn store(unit: usize, addr: u32, size: u32) -> Self {
    Self {
      addr,
      size,
      valid: true,
      ..Self::new(unit, OpCode::Store)
    }
  }

  pub fn compute(unit: usize, comp: CompType) -> Self {
    Self {
      comp: comp.bits(),
      valid: true,
      ..Self::new(unit, OpCode::Compute)
    }
  }

  pub fn copy(unit: usize, source: usize) -> Self {
    Self {
      source: source as u32,
      valid: true,
      ..Self::new(unit, OpCode::Copy)
    }
  }

  pub fn add_vec(unit: usize, source: usize) -> Self {
    Self {
      source: source as u32,
      valid: true,
      ..Self::new(unit, OpCode::AddVec)
    }
  }

  pub fn with_addr(mut self, addr: u32) -> Self {
    self.addr = addr;
    self
  }

  pub fn encode(&self, layout: &PacketLayout) -> u32 {
    let unit_mask = mask(layout.unit_bits);
    ((self.size & mask(SIZE_BITS)) << SIZE_SHIFT)
      | ((self.valid as u32) << VALID_SHIFT)
      | ((self.addr & mask(ADDR_BITS)) << ADDR_SHIFT)
      | ((self.comp & mask(COMP_BITS)) << COMP_SHIFT)
      | ((self.opcode & mask(OP_BITS)) << OP_SHIFT)
      | ((self.source & unit_mask) << layout.source_shift())
      | ((self.unit & unit_mask) << layout.target_shift())
  }

  /// Split a word into fields. Reserved bits are ignored here; the decoder
  /// checks them separately.
  pub fn unpack(word: u32, layout: &PacketLayout) -> Self {
    let unit_mask = mask(layout.unit_bits);
    Self {
      size: (word >> SIZE_SHIFT) & mask(SIZE_BITS),
      valid: (word >> VALID_SHIFT) & 1 == 1,
      addr: (word >> ADDR_SHIFT) & mask(ADDR_BITS),
      comp: (word >> COMP_SHIFT) & mask(COMP_BITS),
      opcode: (word >> OP_SHIFT) & mask(OP_BITS),
      source: (word >> layout.source_shift()) & unit_mask,
      unit: (word >> layout.target_shift()) & unit_mask,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_layout_widths() {
    assert_eq!(PacketLayout::for_units(1).unit_bits, 1);
    assert_eq!(PacketLayout::for_units(2).unit_bits, 1);
    assert_eq!(PacketLayout::for_units(4).unit_bits, 2);
    assert_eq!(PacketLayout::for_units(5).unit_bits, 3);
    assert_eq!(PacketLayout::for_units(32).unit_bits, 5);
    assert_eq!(PacketLayout::for_units(256).unit_bits, 8);
    assert_eq!(PacketLayout::for_units(256).width(), 29);
  }

  #[test]
  fn test_fields_are_disjoint() {
    let layout = PacketLayout::for_units(32);
    let p = InstructionPacket {
      unit: 0x1f,
      source: 0,
      opcode: 0,
      comp: 0,
      addr: 0,
      valid: false,
      size: 0,
    };
    let q = InstructionPacket {
      unit: 0,
      source: 0x1f,
      opcode: 7,
      comp: 3,
      addr: 0xf,
      valid: true,
      size: 7,
    };
    assert_eq!(p.encode(&layout) & q.encode(&layout), 0);
    assert_eq!(p.encode(&layout) | q.encode(&layout), !layout.reserved_mask());
  }

  #[test]
  fn test_encode_truncates() {
    let layout = PacketLayout::for_units(4);
    let p = InstructionPacket {
      unit: 5,
      addr: 0x13,
      ..InstructionPacket::default()
    };
    let back = InstructionPacket::unpack(p.encode(&layout), &layout);
    assert_eq!(back.unit, 1);
    assert_eq!(back.addr, 3);
  }
}
