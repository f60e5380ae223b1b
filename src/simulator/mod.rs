//! Program-driven simulator around an [`Npu`](crate::top::Npu)

pub mod config;
pub mod log;
pub mod program;
pub mod report;
pub mod shell;
pub mod simulator;

pub use self::config::{CliOverrides, SimConfig, SimulationSection};
pub use self::log::init_log;
pub use program::{Program, Step};
pub use report::Report;
pub use simulator::Simulator;
