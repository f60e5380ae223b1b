//! Cycle-stepped model of a multi-unit ternary neural-network accelerator
//!
//! Units execute either packed scalar instructions or four-slot VLIW
//! bundles. They share one ALU pipeline and one banked memory through
//! round-robin arbiters, and hand vectors to each other through a
//! scratchpad keyed by unit id.

pub mod arbiter;
pub mod builtin;
pub mod config;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod math;
pub mod memdomain;
pub mod simulator;
pub mod top;

pub use crate::config::{EngineKind, NpuConfig};
pub use crate::error::{NpuError, Result, SimError};
pub use crate::top::{Npu, NpuStats, UnitOutput};
