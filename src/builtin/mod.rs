/// Building blocks shared by every clocked model in the crate

pub mod port;

pub use port::Wire;

/// A clocked hardware block.
///
/// `run` advances the block by exactly one cycle. Inputs are read from the
/// block's input wires as they were latched at the end of the previous cycle;
/// outputs are driven onto its output wires for the next stage to latch.
pub trait Module {
  fn run(&mut self);

  /// Return to the power-on state.
  fn reset(&mut self);

  fn name(&self) -> &str;
}
