/// TOML program: initial register and bank contents plus an instruction stream
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::decoder::{CompType, InstructionPacket, OpCode};
use crate::engine::VliwBundle;
use crate::error::{Result as NpuResult, SimError};
use crate::math::{FixedFormat, TernaryMatrix, Vector};
use crate::top::Npu;

/// A vector literal: explicit lanes, or one value in every lane.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct VectorInit {
  pub unit: usize,
  pub addr: usize,
  pub values: Vec<f32>,
  pub fill: Option<f32>,
}

impl VectorInit {
  pub fn to_vector(&self, fmt: &FixedFormat) -> Vector {
    match self.fill {
      Some(x) => Vector::splat(fmt.from_f32(x)),
      None => Vector::from_f32(fmt, &self.values),
    }
  }
}

/// A matrix literal: rows of `+`, `-`, `0`, or the identity.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MatrixInit {
  pub unit: usize,
  pub identity: bool,
  pub rows: Vec<String>,
}

impl MatrixInit {
  pub fn to_matrix(&self) -> NpuResult<TernaryMatrix> {
    if self.identity {
      Ok(TernaryMatrix::identity())
    } else {
      TernaryMatrix::from_rows(&self.rows)
    }
  }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct BankInit {
  /// `addr` is the absolute vector-bank slot; `unit` is ignored.
  pub vectors: Vec<VectorInit>,
  pub matrix: Option<MatrixInit>,
}

/// One entry of the instruction stream.
///
/// Steps issue in order. A step waits until cycle `at` (if given) and until
/// its unit is idle. It carries at most one of `word`, `op` or `bundle`, and
/// may drive the unit's data-in ports in the same tick.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Step {
  pub at: Option<u64>,
  pub unit: usize,

  /// Raw instruction word, issued untouched.
  pub word: Option<u32>,

  pub op: Option<OpCode>,
  pub comp: CompType,
  pub source: usize,
  pub addr: u32,
  pub size: u32,
  /// Defaults to set for everything but NOP.
  pub valid: Option<bool>,

  pub bundle: Vec<String>,
  /// Scratchpad slot for pulls; the unit's own slot when absent.
  pub peer: Option<usize>,

  pub data_in: Option<Vec<f32>>,
  pub matrix_in: Option<Vec<String>>,
}

/// What a step hands to the NPU.
#[derive(Debug, Clone, PartialEq)]
pub enum Issue {
  Word(u32),
  Packet(InstructionPacket),
  Bundle(VliwBundle),
  DataOnly,
}

impl Step {
  pub fn issue(&self) -> NpuResult<Issue> {
    if let Some(word) = self.word {
      return Ok(Issue::Word(word));
    }
    if let Some(op) = self.op {
      return Ok(Issue::Packet(InstructionPacket {
        unit: self.unit as u32,
        source: self.source as u32,
        opcode: op.bits(),
        comp: self.comp.bits(),
        addr: self.addr,
        valid: self.valid.unwrap_or(op != OpCode::Nop),
        size: self.size,
      }));
    }
    if !self.bundle.is_empty() {
      let mut builder = VliwBundle::builder();
      if let Some(peer) = self.peer {
        builder = builder.peer(peer);
      }
      for name in &self.bundle {
        builder = builder.named(name)?;
      }
      return Ok(Issue::Bundle(builder.build()));
    }
    Ok(Issue::DataOnly)
  }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Program {
  pub vectors: Vec<VectorInit>,
  pub matrices: Vec<MatrixInit>,
  pub bank: BankInit,
  pub steps: Vec<Step>,
}

impl Program {
  pub fn parse(text: &str) -> Result<Self, SimError> {
    let program: Program = toml::from_str(text)?;
    program.check()?;
    Ok(program)
  }

  pub fn from_file(path: &Path) -> Result<Self, SimError> {
    let text = fs::read_to_string(path)?;
    Self::parse(&text)
  }

  /// Reject steps that could never issue.
  fn check(&self) -> Result<(), SimError> {
    for (i, step) in self.steps.iter().enumerate() {
      let kinds = [step.word.is_some(), step.op.is_some(), !step.bundle.is_empty()];
      if kinds.iter().filter(|&&k| k).count() > 1 {
        return Err(SimError::Program(format!(
          "step {} mixes word, op and bundle",
          i
        )));
      }
      step.issue()?;
    }
    Ok(())
  }

  /// Apply the initial state to a freshly reset NPU.
  pub fn load(&self, npu: &mut Npu) -> Result<(), SimError> {
    let fmt = npu.config().format;
    for v in &self.vectors {
      npu.write_vector(v.unit, v.to_vector(&fmt))?;
    }
    for m in &self.matrices {
      npu.write_matrix(m.unit, m.to_matrix()?)?;
    }
    for v in &self.bank.vectors {
      npu.write_bank_vector(v.addr, v.to_vector(&fmt))?;
    }
    if let Some(m) = &self.bank.matrix {
      npu.write_bank_matrix(m.to_matrix()?);
    }
    Ok(())
  }
}
