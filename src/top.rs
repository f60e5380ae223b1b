/// Top Module - wires the decoder, the execution units and both arbiters
use log::{info, warn};
use serde::Serialize;

use crate::arbiter::{ArbiterStats, ComputeArbiter};
use crate::builtin::{Module, Wire};
use crate::config::{EngineKind, NpuConfig};
use crate::decoder::{DecodeErrorStatus, Decoder, InstructionPacket};
use crate::engine::{self, AluPort, Engine, EngineEffects, EngineInput, EngineState, Instruction, MemPort, UnitStats, VliwBundle};
use crate::error::{NpuError, Result};
use crate::math::{ComputeStatus, TernaryMatrix, Vector};
use crate::memdomain::MemoryArbiter;

/// Everything one unit drove during the last tick.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct UnitOutput {
  pub ready: bool,
  pub done: bool,
  pub busy: bool,
  pub state: EngineState,
  pub result: Option<Vector>,
  pub matrix_out: Option<TernaryMatrix>,
  pub decode_error: DecodeErrorStatus,
  pub status: ComputeStatus,
  pub mem_error: bool,
  pub rejected: bool,
  pub aborted: bool,
}

impl UnitOutput {
  fn new(fx: &EngineEffects, state: EngineState, decode_error: DecodeErrorStatus) -> Self {
    Self {
      ready: fx.ready,
      done: fx.done,
      busy: fx.busy,
      state,
      result: fx.result,
      matrix_out: fx.matrix_out,
      decode_error,
      status: fx.status,
      mem_error: fx.mem_error,
      rejected: fx.rejected,
      aborted: fx.aborted,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NpuStats {
  pub cycles: u64,
  pub units: Vec<UnitStats>,
  pub alu: ArbiterStats,
  pub mem: ArbiterStats,
  pub scratchpad_pushes: u64,
  /// Words whose target id named no unit.
  pub stray_decode_errors: u64,
}

/// Npu - the whole accelerator, advanced one tick at a time
pub struct Npu {
  name: String,
  config: NpuConfig,
  cycle: u64,

  pub decoder: Decoder,
  pub alu: ComputeArbiter,
  pub mem: MemoryArbiter,
  units: Vec<Box<dyn Engine>>,

  // Per-unit inputs for the next tick
  bundles: Vec<Option<VliwBundle>>,
  data_in: Vec<Wire<Vector>>,
  matrix_in: Vec<Wire<TernaryMatrix>>,

  outputs: Vec<UnitOutput>,
  stray_decode_errors: u64,
}

impl Npu {
  pub fn new(config: NpuConfig) -> Result<Self> {
    config.validate()?;
    let n = config.unit_count;
    info!(
      "[Npu] {} {:?} units, format Q{}.{}",
      n, config.engine, config.format.int_bits, config.format.frac_bits
    );
    Ok(Self {
      name: "npu".to_string(),
      cycle: 0,
      decoder: Decoder::new("decoder", n),
      alu: ComputeArbiter::new("alu", n, config.format),
      mem: MemoryArbiter::new("mem", n, config.vector_bank_depth),
      units: (0..n).map(|u| engine::build(config.engine, u, config.format)).collect(),
      bundles: vec![None; n],
      data_in: vec![Wire::default(); n],
      matrix_in: vec![Wire::default(); n],
      outputs: vec![UnitOutput::default(); n],
      stray_decode_errors: 0,
      config,
    })
  }

  pub fn config(&self) -> &NpuConfig {
    &self.config
  }

  pub fn unit_count(&self) -> usize {
    self.units.len()
  }

  /// Free-running cycle counter.
  pub fn cycle(&self) -> u64 {
    self.cycle
  }

  /// Host-supplied lanes are clamped into the configured format.
  fn saturate(&self, value: Vector) -> Vector {
    let fmt = &self.config.format;
    let clamped = Vector::from_fn(|i| fmt.saturate(value.0[i]).value);
    if clamped != value {
      warn!("host vector exceeds {}-bit range; lanes saturated", fmt.width());
    }
    clamped
  }

  fn check_unit(&self, unit: usize) -> Result<()> {
    if unit < self.units.len() {
      Ok(())
    } else {
      Err(NpuError::unit_out_of_range(unit, self.units.len()))
    }
  }

  /// Queue a packed instruction word for the next tick.
  pub fn issue(&mut self, word: u32) -> Result<()> {
    if self.config.engine != EngineKind::Scalar {
      return Err(NpuError::WrongEngine {
        unit: self.decoder.decode(word).raw_unit,
        engine: self.config.engine,
      });
    }
    self.decoder.input.push(word);
    Ok(())
  }

  /// Encode and queue a packet. Unlike a raw word, the target id must name a
  /// unit; the encoder would otherwise mask it into a different one.
  pub fn issue_packet(&mut self, packet: &InstructionPacket) -> Result<()> {
    self.check_unit(packet.unit as usize)?;
    let word = packet.encode(self.decoder.layout());
    self.issue(word)
  }

  pub fn issue_bundle(&mut self, unit: usize, bundle: VliwBundle) -> Result<()> {
    self.check_unit(unit)?;
    if self.config.engine != EngineKind::Vliw {
      return Err(NpuError::WrongEngine {
        unit,
        engine: self.config.engine,
      });
    }
    self.bundles[unit] = Some(bundle);
    Ok(())
  }

  /// Drive a unit's data-in port for the next tick.
  pub fn set_data_in(&mut self, unit: usize, value: Vector) -> Result<()> {
    self.check_unit(unit)?;
    let value = self.saturate(value);
    self.data_in[unit].set(value);
    Ok(())
  }

  pub fn set_matrix_in(&mut self, unit: usize, value: TernaryMatrix) -> Result<()> {
    self.check_unit(unit)?;
    self.matrix_in[unit].set(value);
    Ok(())
  }

  /// Preload a unit's vector register outside the tick loop. A scalar unit
  /// publishes the value to its scratchpad slot at once.
  pub fn write_vector(&mut self, unit: usize, value: Vector) -> Result<()> {
    self.check_unit(unit)?;
    let value = self.saturate(value);
    self.units[unit].write_vector(value);
    if self.units[unit].kind() == EngineKind::Scalar {
      let sp = self.mem.scratchpad_mut();
      sp.push(unit, value);
      sp.commit();
    }
    Ok(())
  }

  pub fn write_matrix(&mut self, unit: usize, value: TernaryMatrix) -> Result<()> {
    self.check_unit(unit)?;
    self.units[unit].write_matrix(value);
    Ok(())
  }

  pub fn vector(&self, unit: usize) -> Result<Vector> {
    self.check_unit(unit)?;
    Ok(self.units[unit].vector())
  }

  pub fn matrix(&self, unit: usize) -> Result<TernaryMatrix> {
    self.check_unit(unit)?;
    Ok(*self.units[unit].matrix())
  }

  pub fn unit_state(&self, unit: usize) -> Result<EngineState> {
    self.check_unit(unit)?;
    Ok(self.units[unit].state())
  }

  pub fn write_bank_vector(&mut self, addr: usize, value: Vector) -> Result<()> {
    let value = self.saturate(value);
    Ok(self.mem.vectors_mut().write(addr, value)?)
  }

  pub fn read_bank_vector(&self, addr: usize) -> Result<Vector> {
    Ok(self.mem.vectors().read(addr)?)
  }

  pub fn write_bank_matrix(&mut self, value: TernaryMatrix) {
    self.mem.matrix_mut().load(value);
  }

  pub fn bank_matrix(&self) -> &TernaryMatrix {
    self.mem.matrix().matrix()
  }

  /// The vector unit `unit` last published, if any.
  pub fn scratchpad(&self, unit: usize) -> Option<Vector> {
    self.mem.scratchpad().read(unit)
  }

  pub fn output(&self, unit: usize) -> Option<&UnitOutput> {
    self.outputs.get(unit)
  }

  pub fn outputs(&self) -> &[UnitOutput] {
    &self.outputs
  }

  /// Aggregate busy: any unit mid-operation, any arbiter active, or input
  /// still waiting for the next tick.
  pub fn busy(&self) -> bool {
    self.units.iter().any(|u| u.state() != EngineState::Idle)
      || self.alu.busy()
      || self.mem.busy()
      || !self.decoder.input.is_empty()
      || self.bundles.iter().any(Option::is_some)
  }

  pub fn stats(&self) -> NpuStats {
    NpuStats {
      cycles: self.cycle,
      units: self.units.iter().map(|u| u.stats().clone()).collect(),
      alu: self.alu.stats().clone(),
      mem: self.mem.stats().clone(),
      scratchpad_pushes: self.mem.scratchpad().pushes(),
      stray_decode_errors: self.stray_decode_errors,
    }
  }

  /// Advance every module by one tick.
  pub fn tick(&mut self) {
    let n = self.units.len();

    // 1. Decode everything issued since the last tick
    self.decoder.run();
    let mut instructions: Vec<Option<Instruction>> = vec![None; n];
    let mut decode_errors = vec![DecodeErrorStatus::default(); n];
    for out in self.decoder.output.drain(..) {
      if out.raw_unit >= n {
        warn!("[Npu] cycle {} instruction for unit {} dropped", self.cycle, out.raw_unit);
        self.stray_decode_errors += 1;
        continue;
      }
      if instructions[out.raw_unit].is_some() {
        warn!("[Npu] cycle {} unit {} issued twice, keeping the later word", self.cycle, out.raw_unit);
      }
      decode_errors[out.raw_unit] = out.error;
      instructions[out.raw_unit] = Some(Instruction::Control(out));
    }
    for (slot, bundle) in instructions.iter_mut().zip(self.bundles.iter_mut()) {
      if let Some(b) = bundle.take() {
        *slot = Some(Instruction::Bundle(b));
      }
    }

    // 2. Arbiters act on the requests latched last tick
    self.alu.run();
    self.mem.run();

    // 3. Engines see this tick's arbiter outputs
    for u in 0..n {
      let input = EngineInput {
        instruction: instructions[u].take(),
        data_in: self.data_in[u].take(),
        matrix_in: self.matrix_in[u].take(),
        mem: MemPort {
          grant: self.mem.grant[u],
          done: self.mem.done_for(u),
          error: self.mem.error_for(u),
          data: self.mem.data_for(u),
        },
        alu: AluPort {
          done: self.alu.done_for(u),
          result: self.alu.result_for(u),
          status: self.alu.status_for(u),
        },
      };
      let fx = self.units[u].step(&input, self.mem.scratchpad());

      // 4. Latch requests for the next tick
      self.alu.requests[u] = Wire::from_option(fx.alu_request.clone());
      self.mem.requests[u] = Wire::from_option(fx.mem_request.clone());
      if fx.aborted {
        self.alu.cancel(u);
        self.mem.cancel(u);
      }
      if let Some(v) = fx.push {
        self.mem.scratchpad_mut().push(u, v);
      }
      self.outputs[u] = UnitOutput::new(&fx, self.units[u].state(), decode_errors[u]);
    }

    // 5. Pushes land after every unit has read the pre-tick scratchpad
    self.mem.scratchpad_mut().commit();
    self.cycle += 1;
  }
}

impl Module for Npu {
  fn run(&mut self) {
    self.tick();
  }

  fn reset(&mut self) {
    let n = self.units.len();
    self.decoder.reset();
    self.alu.reset();
    self.mem.reset();
    for unit in self.units.iter_mut() {
      unit.reset();
    }
    self.bundles = vec![None; n];
    self.data_in = vec![Wire::default(); n];
    self.matrix_in = vec![Wire::default(); n];
    self.outputs = vec![UnitOutput::default(); n];
    self.stray_decode_errors = 0;
    self.cycle = 0;
    info!("[Npu] reset");
  }

  fn name(&self) -> &str {
    &self.name
  }
}
