/// End-of-run summary
use serde::Serialize;

use crate::engine::UnitStats;
use crate::error::SimError;
use crate::top::{Npu, NpuStats};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitReport {
  pub unit: usize,
  pub vector: Vec<f32>,
  pub scratchpad: Option<Vec<f32>>,
  pub stats: UnitStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
  /// Every step issued and the NPU drained before the cycle limit.
  pub finished: bool,
  pub cycles: u64,
  pub units: Vec<UnitReport>,
  pub stats: NpuStats,
}

impl Report {
  pub fn collect(npu: &Npu, finished: bool) -> Self {
    let fmt = npu.config().format;
    let stats = npu.stats();
    let units = (0..npu.unit_count())
      .map(|u| UnitReport {
        unit: u,
        vector: npu.vector(u).map(|v| v.to_f32(&fmt)).unwrap_or_default(),
        scratchpad: npu.scratchpad(u).map(|v| v.to_f32(&fmt)),
        stats: stats.units[u].clone(),
      })
      .collect();
    Self {
      finished,
      cycles: npu.cycle(),
      units,
      stats,
    }
  }

  pub fn to_json(&self) -> Result<String, SimError> {
    Ok(serde_json::to_string_pretty(self)?)
  }
}
