//! Instruction decoding: packet layout and the decoder stage

pub mod decoder;
pub mod instruction;

pub use decoder::{decode, DecodeErrorStatus, DecodeOutput, DecodedControl, Decoder};
pub use instruction::{CompType, InstructionPacket, OpCode, PacketLayout};
