use std::path::PathBuf;

use clap::Parser;
use ternpu::simulator::{init_log, CliOverrides, Program, SimConfig, Simulator};
use ternpu::{EngineKind, SimError};

/// ternpu - a cycle-stepped ternary NPU simulator
#[derive(Parser, Debug)]
#[command(name = "ternpu")]
#[command(version = "0.1.0")]
#[command(about = "Runs a TOML program on a multi-unit ternary NPU model", long_about = None)]
struct Args {
  /// Program file (TOML)
  #[arg(value_name = "PROGRAM")]
  program: PathBuf,

  /// Simulator configuration file (TOML)
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Enable step mode (interactive stepping)
  #[arg(short, long)]
  step: bool,

  /// Quiet mode (warnings and errors only)
  #[arg(short, long)]
  quiet: bool,

  /// Output trace file path (JSON lines)
  #[arg(long, value_name = "FILE")]
  trace_file: Option<String>,

  /// Write the final report here instead of stdout
  #[arg(long, value_name = "FILE")]
  report: Option<String>,

  /// Number of execution units
  #[arg(short, long)]
  units: Option<usize>,

  /// Engine flavor
  #[arg(short, long, value_enum)]
  engine: Option<EngineKind>,

  /// Stop continuous mode after this many cycles
  #[arg(long)]
  max_cycles: Option<u64>,
}

fn main() -> Result<(), SimError> {
  let args = Args::parse();

  let mut config = SimConfig::load(args.config.as_deref())?;
  CliOverrides {
    quiet: args.quiet,
    step: args.step,
    trace_file: args.trace_file,
    report_file: args.report,
    units: args.units,
    engine: args.engine,
    max_cycles: args.max_cycles,
  }
  .apply(&mut config);

  init_log(config.simulation.quiet);

  let program = Program::from_file(&args.program)?;
  let report_file = config.simulation.report_file.clone();
  let mut simulator = Simulator::new(config, program)?;
  let report = simulator.run()?;

  let json = report.to_json()?;
  if report_file.is_empty() {
    println!("{}", json);
  } else {
    std::fs::write(&report_file, json)?;
  }

  if !report.finished {
    return Err(SimError::Program(format!(
      "stopped at cycle {} before the program finished",
      report.cycles
    )));
  }
  Ok(())
}
