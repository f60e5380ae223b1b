/// NPU configuration, fixed at construction
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::math::FixedFormat;

/// Which execution engine every unit is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
  /// One micro-op at a time through the shared arbiters.
  #[default]
  Scalar,
  /// Four-slot bundles against local registers.
  Vliw,
}

/// NPU configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NpuConfig {
  /// Number of execution units (1..=256)
  pub unit_count: usize,
  /// Engine flavor shared by every unit
  pub engine: EngineKind,
  /// Fixed-point split used by every vector lane
  pub format: FixedFormat,
  /// Vector bank slots; unit `u` owns slots `u * 16 .. u * 16 + 16`
  pub vector_bank_depth: usize,
}

impl NpuConfig {
  pub const MAX_UNITS: usize = 256;

  /// Default configuration: four scalar units, Q1.31, 64 vector slots.
  pub fn new() -> Self {
    Self {
      unit_count: 4,
      engine: EngineKind::Scalar,
      format: FixedFormat::Q1_31,
      vector_bank_depth: 64,
    }
  }

  pub fn with_units(unit_count: usize) -> Self {
    Self {
      unit_count,
      ..Self::new()
    }
  }

  pub fn engine(mut self, engine: EngineKind) -> Self {
    self.engine = engine;
    self
  }

  pub fn format(mut self, format: FixedFormat) -> Self {
    self.format = format;
    self
  }

  pub fn vector_bank_depth(mut self, depth: usize) -> Self {
    self.vector_bank_depth = depth;
    self
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.unit_count == 0 || self.unit_count > Self::MAX_UNITS {
      return Err(ConfigError::UnitCount(self.unit_count));
    }
    if self.vector_bank_depth == 0 {
      return Err(ConfigError::EmptyVectorBank);
    }
    self.format.validate()
  }
}

impl Default for NpuConfig {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_is_valid() {
    assert!(NpuConfig::default().validate().is_ok());
  }

  #[test]
  fn test_rejects_bad_unit_count() {
    assert_eq!(NpuConfig::with_units(0).validate(), Err(ConfigError::UnitCount(0)));
    assert_eq!(NpuConfig::with_units(257).validate(), Err(ConfigError::UnitCount(257)));
    assert!(NpuConfig::with_units(256).validate().is_ok());
  }

  #[test]
  fn test_rejects_bad_format() {
    let cfg = NpuConfig::new().format(FixedFormat {
      int_bits: 3,
      frac_bits: 31,
    });
    assert_eq!(cfg.validate(), Err(ConfigError::FractionBits(31)));
  }

  #[test]
  fn test_deserialize_partial() {
    let cfg: NpuConfig = toml::from_str("unit_count = 8\nengine = \"vliw\"").unwrap();
    assert_eq!(cfg.unit_count, 8);
    assert_eq!(cfg.engine, EngineKind::Vliw);
    assert_eq!(cfg.format, FixedFormat::Q1_31);
  }

  #[test]
  fn test_engine_names_on_command_line() {
    assert_eq!(EngineKind::from_str("vliw", true), Ok(EngineKind::Vliw));
    assert_eq!(EngineKind::from_str("SCALAR", true), Ok(EngineKind::Scalar));
    assert!(EngineKind::from_str("systolic", true).is_err());
  }
}
