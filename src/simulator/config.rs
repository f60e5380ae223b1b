use std::path::Path;

use ::config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::config::{EngineKind, NpuConfig};
use crate::error::SimError;

/// Prefix for environment overrides, e.g. `TERNPU_NPU__UNIT_COUNT=8`.
pub const ENV_PREFIX: &str = "TERNPU";

/// Simulation run section
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationSection {
  pub quiet: bool,
  pub step_mode: bool,
  /// JSON-lines trace of per-cycle unit outputs; empty disables it.
  pub trace_file: String,
  /// Where the final JSON report goes; empty prints it to stdout.
  pub report_file: String,
  /// Hard stop for continuous mode.
  pub max_cycles: u64,
}

impl Default for SimulationSection {
  fn default() -> Self {
    Self {
      quiet: false,
      step_mode: false,
      trace_file: String::new(),
      report_file: String::new(),
      max_cycles: 100_000,
    }
  }
}

/// Full simulator configuration
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SimConfig {
  pub npu: NpuConfig,
  pub simulation: SimulationSection,
}

impl SimConfig {
  /// Layer built-in defaults, an optional TOML file and `TERNPU_*`
  /// environment variables, later sources winning.
  pub fn load(path: Option<&Path>) -> Result<Self, SimError> {
    let mut builder = Config::builder().add_source(Config::try_from(&SimConfig::default())?);
    if let Some(path) = path {
      builder = builder.add_source(File::from(path).required(true));
    }
    let cfg = builder
      .add_source(
        Environment::with_prefix(ENV_PREFIX)
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()?;
    Ok(cfg.try_deserialize()?)
  }
}

/// Command-line overrides, applied after every other source.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
  pub quiet: bool,
  pub step: bool,
  pub trace_file: Option<String>,
  pub report_file: Option<String>,
  pub units: Option<usize>,
  pub engine: Option<EngineKind>,
  pub max_cycles: Option<u64>,
}

impl CliOverrides {
  pub fn apply(&self, config: &mut SimConfig) {
    if self.quiet {
      config.simulation.quiet = true;
    }
    if self.step {
      config.simulation.step_mode = true;
    }
    if let Some(file) = &self.trace_file {
      config.simulation.trace_file = file.clone();
    }
    if let Some(file) = &self.report_file {
      config.simulation.report_file = file.clone();
    }
    if let Some(units) = self.units {
      config.npu.unit_count = units;
    }
    if let Some(engine) = self.engine {
      config.npu.engine = engine;
    }
    if let Some(limit) = self.max_cycles {
      config.simulation.max_cycles = limit;
    }
  }
}
