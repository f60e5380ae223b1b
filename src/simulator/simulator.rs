use std::fs::File;
use std::io::{BufWriter, Write};

use log::{info, warn};

use super::config::SimConfig;
use super::program::{Issue, Program};
use super::report::Report;
use super::shell::{Command, Shell, HELP};
use crate::engine::EngineState;
use crate::error::SimError;
use crate::math::{TernaryMatrix, Vector};
use crate::top::Npu;

/// Drives an `Npu` through a program, one tick per step.
pub struct Simulator {
  config: SimConfig,
  npu: Npu,
  program: Program,
  next_step: usize,
  trace: Option<BufWriter<File>>,
}

impl Simulator {
  pub fn new(config: SimConfig, program: Program) -> Result<Self, SimError> {
    let mut npu = Npu::new(config.npu.clone())?;
    program.load(&mut npu)?;

    let trace = if config.simulation.trace_file.is_empty() {
      None
    } else {
      Some(BufWriter::new(File::create(&config.simulation.trace_file)?))
    };

    info!("Loaded program with {} steps", program.steps.len());
    Ok(Self {
      config,
      npu,
      program,
      next_step: 0,
      trace,
    })
  }

  pub fn npu(&self) -> &Npu {
    &self.npu
  }

  pub fn npu_mut(&mut self) -> &mut Npu {
    &mut self.npu
  }

  pub fn pending_steps(&self) -> usize {
    self.program.steps.len() - self.next_step
  }

  /// All steps issued and the NPU drained.
  pub fn finished(&self) -> bool {
    self.pending_steps() == 0 && !self.npu.busy()
  }

  /// Issue whatever steps are due, then advance one tick.
  pub fn step(&mut self) -> Result<(), SimError> {
    self.issue_due()?;
    self.npu.tick();
    self.write_trace()
  }

  pub fn run(&mut self) -> Result<Report, SimError> {
    if self.config.simulation.step_mode {
      self.run_step_mode()?;
    } else {
      self.run_continuous()?;
    }
    if let Some(writer) = self.trace.as_mut() {
      writer.flush()?;
    }
    Ok(self.report())
  }

  pub fn report(&self) -> Report {
    Report::collect(&self.npu, self.finished())
  }

  pub fn run_continuous(&mut self) -> Result<(), SimError> {
    let limit = self.config.simulation.max_cycles;
    while !self.finished() {
      if self.npu.cycle() >= limit {
        warn!("Cycle limit {} reached with {} steps pending", limit, self.pending_steps());
        break;
      }
      self.step()?;
    }
    info!("Stopped at cycle {}", self.npu.cycle());
    Ok(())
  }

  fn run_step_mode(&mut self) -> Result<(), SimError> {
    println!("Step mode - {}", HELP);
    let mut shell = Shell::new()?;
    loop {
      match shell.read_command()? {
        Command::Step(n) => {
          for _ in 0..n {
            if self.finished() {
              println!("Program finished at cycle {}", self.npu.cycle());
              break;
            }
            self.step()?;
          }
          self.print_units();
        },
        Command::Continue => return self.run_continuous(),
        Command::Print => self.print_units(),
        Command::Quit => return Ok(()),
      }
    }
  }

  fn print_units(&self) {
    println!("cycle {}", self.npu.cycle());
    for (u, out) in self.npu.outputs().iter().enumerate() {
      println!(
        "  unit {:>3} {:<9} ready={} done={} status={:?}",
        u,
        format!("{:?}", out.state),
        out.ready as u8,
        out.done as u8,
        out.status
      );
    }
  }

  /// Issue steps in order until one is not yet due.
  fn issue_due(&mut self) -> Result<(), SimError> {
    let fmt = self.npu.config().format;
    let mut claimed = vec![false; self.npu.unit_count()];

    while let Some(step) = self.program.steps.get(self.next_step) {
      if step.at.is_some_and(|at| self.npu.cycle() < at) {
        break;
      }
      let issue = step.issue()?;
      let unit = match issue {
        Issue::Word(word) => self.npu.decoder.decode(word).raw_unit,
        _ => step.unit,
      };
      // Targets outside the NPU are issued anyway; the decoder flags them.
      if unit < claimed.len() {
        if claimed[unit] || self.npu.unit_state(unit)? != EngineState::Idle {
          break;
        }
        claimed[unit] = true;
      }

      if let Some(values) = &step.data_in {
        self.npu.set_data_in(step.unit, Vector::from_f32(&fmt, values))?;
      }
      if let Some(rows) = &step.matrix_in {
        self.npu.set_matrix_in(step.unit, TernaryMatrix::from_rows(rows)?)?;
      }
      match issue {
        Issue::Word(word) => self.npu.issue(word)?,
        Issue::Packet(packet) => self.npu.issue_packet(&packet)?,
        Issue::Bundle(bundle) => self.npu.issue_bundle(step.unit, bundle)?,
        Issue::DataOnly => {},
      }
      self.next_step += 1;
    }
    Ok(())
  }

  fn write_trace(&mut self) -> Result<(), SimError> {
    if let Some(writer) = self.trace.as_mut() {
      let entry = serde_json::json!({
        "cycle": self.npu.cycle() - 1,
        "busy": self.npu.busy(),
        "units": self.npu.outputs(),
      });
      writeln!(writer, "{}", entry)?;
    }
    Ok(())
  }
}
