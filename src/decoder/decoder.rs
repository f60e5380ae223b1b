/// Instruction Decoder - turns packed words into typed control signals
use log::debug;
use serde::{Deserialize, Serialize};

use super::instruction::{CompType, InstructionPacket, OpCode, PacketLayout};
use crate::builtin::Module;

/// Typed control signal handed to an execution engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DecodedControl {
  pub unit: usize,
  pub source: usize,
  pub opcode: OpCode,
  pub comp: CompType,
  pub addr: usize,
  pub valid: bool,
  pub size: u32,
}

/// The decoder's two independent error bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DecodeErrorStatus {
  /// Undefined opcode, reserved bits set, or a malformed sub-field.
  pub bad_field: bool,
  /// Source or target unit id outside the configured unit count.
  pub bad_unit_ref: bool,
}

impl DecodeErrorStatus {
  pub fn is_empty(&self) -> bool {
    !self.bad_field && !self.bad_unit_ref
  }

  /// Packed form: bit 0 is `bad_field`, bit 1 is `bad_unit_ref`.
  pub fn bits(&self) -> u8 {
    (self.bad_field as u8) | ((self.bad_unit_ref as u8) << 1)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DecodeOutput {
  pub control: DecodedControl,
  pub decode_valid: bool,
  pub error: DecodeErrorStatus,
  /// The target field as it appeared in the word, even when out of range.
  pub raw_unit: usize,
}

/// Decode one word. Pure; safe to call every cycle.
pub fn decode(word: u32, layout: &PacketLayout, unit_count: usize) -> DecodeOutput {
  let packet = InstructionPacket::unpack(word, layout);
  let mut error = DecodeErrorStatus::default();

  if word & layout.reserved_mask() != 0 {
    error.bad_field = true;
  }

  let opcode = OpCode::from_bits(packet.opcode);
  let comp = CompType::from_bits(packet.comp);
  if opcode.is_none() || comp.is_none() {
    error.bad_field = true;
  }
  let opcode = opcode.unwrap_or_default();

  match opcode {
    OpCode::Nop => {
      if packet.addr != 0 || packet.valid || packet.size != 0 {
        error.bad_field = true;
      }
    },
    OpCode::Compute => {
      if !packet.valid {
        error.bad_field = true;
      }
    },
    OpCode::Copy | OpCode::AddVec => {
      if packet.source as usize >= unit_count {
        error.bad_unit_ref = true;
      }
    },
    OpCode::Load | OpCode::Store => {},
  }

  if packet.unit as usize >= unit_count {
    error.bad_unit_ref = true;
  }

  let decode_valid = error.is_empty();
  let control = DecodedControl {
    unit: packet.unit as usize,
    source: packet.source as usize,
    opcode,
    comp: comp.unwrap_or_default(),
    addr: packet.addr as usize,
    valid: decode_valid,
    size: packet.size,
  };

  DecodeOutput {
    control,
    decode_valid,
    error,
    raw_unit: packet.unit as usize,
  }
}

/// Decoder stage: decodes every word presented this cycle.
pub struct Decoder {
  name: String,
  layout: PacketLayout,
  unit_count: usize,

  // Input: words issued this cycle
  pub input: Vec<u32>,

  // Output: one decode result per input word, same order
  pub output: Vec<DecodeOutput>,
}

impl Decoder {
  pub fn new(name: impl Into<String>, unit_count: usize) -> Self {
    Self {
      name: name.into(),
      layout: PacketLayout::for_units(unit_count),
      unit_count,
      input: Vec::new(),
      output: Vec::new(),
    }
  }

  pub fn layout(&self) -> &PacketLayout {
    &self.layout
  }

  pub fn decode(&self, word: u32) -> DecodeOutput {
    decode(word, &self.layout, self.unit_count)
  }
}

impl Module for Decoder {
  fn run(&mut self) {
    self.output = self
      .input
      .drain(..)
      .map(|word| decode(word, &self.layout, self.unit_count))
      .collect();

    for out in &self.output {
      if out.decode_valid {
        debug!(
          "[Decoder] unit={} {:?}/{:?} addr={} size={}",
          out.control.unit, out.control.opcode, out.control.comp, out.control.addr, out.control.size
        );
      } else {
        debug!("[Decoder] unit={} rejected: {:?}", out.raw_unit, out.error);
      }
    }
  }

  fn reset(&mut self) {
    self.input.clear();
    self.output.clear();
  }

  fn name(&self) -> &str {
    &self.name
  }
}
