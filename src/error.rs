//! Error types for NPU construction and host-side access
//!
//! Faults raised by the modeled hardware itself (decode errors, overflow,
//! bank range errors seen by an arbiter) are status bits, not `Err` values.
//! The types here cover what the host can get wrong.

use thiserror::Error;

use crate::config::EngineKind;

/// Result type alias for NPU operations
pub type Result<T> = std::result::Result<T, NpuError>;

/// Construction-time configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
  #[error("fraction bits {0} out of range [16, 29]")]
  FractionBits(u32),

  #[error("integer bits {0} out of range [2, 12]")]
  IntegerBits(u32),

  #[error("unit count {0} out of range [1, 256]")]
  UnitCount(usize),

  #[error("vector bank depth must be non-zero")]
  EmptyVectorBank,
}

/// Address range error reported by a backing memory bank
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BankError {
  #[error("vector bank address {addr} out of range (depth {depth})")]
  VectorAddress { addr: usize, depth: usize },

  #[error("matrix bank rows {start}..{end} out of range (16 rows)")]
  MatrixRows { start: usize, end: usize },
}

/// Errors surfaced to the host driving an `Npu`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NpuError {
  #[error("invalid configuration: {0}")]
  Config(#[from] ConfigError),

  #[error("unit {unit} out of range (have {count} units)")]
  UnitOutOfRange { unit: usize, count: usize },

  #[error("bank access failed: {0}")]
  Bank(#[from] BankError),

  #[error("unit {unit} runs the {engine:?} engine")]
  WrongEngine { unit: usize, engine: EngineKind },

  #[error("bundle has no free slot for {0}")]
  BundleFull(String),

  #[error("unknown micro-op '{0}'")]
  UnknownMicroOp(String),

  #[error("invalid ternary weight '{0}'")]
  InvalidWeight(char),
}

/// Errors raised by the simulator binary and its input files
#[derive(Debug, Error)]
pub enum SimError {
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("configuration error: {0}")]
  Config(#[from] ::config::ConfigError),

  #[error("program parse error: {0}")]
  Toml(#[from] toml::de::Error),

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("shell error: {0}")]
  Shell(#[from] rustyline::error::ReadlineError),

  #[error(transparent)]
  Npu(#[from] NpuError),

  #[error("program error: {0}")]
  Program(String),
}

impl NpuError {
  pub fn unit_out_of_range(unit: usize, count: usize) -> Self {
    Self::UnitOutOfRange { unit, count }
  }
}
