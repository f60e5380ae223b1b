/// Register-sized operands: a 16-lane vector and a 16x16 ternary matrix
use serde::{Deserialize, Serialize};

use super::fixed::FixedFormat;
use crate::error::NpuError;

/// Lanes per vector, rows and columns per matrix.
pub const LANES: usize = 16;

/// Sixteen raw fixed-point lanes. The format lives with the configuration,
/// not with the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vector(pub [i64; LANES]);

impl Vector {
  pub fn zero() -> Self {
    Self([0; LANES])
  }

  pub fn splat(raw: i64) -> Self {
    Self([raw; LANES])
  }

  pub fn from_fn(f: impl FnMut(usize) -> i64) -> Self {
    Self(std::array::from_fn(f))
  }

  pub fn from_f32(fmt: &FixedFormat, values: &[f32]) -> Self {
    Self::from_fn(|i| values.get(i).map_or(0, |&x| fmt.from_f32(x)))
  }

  pub fn to_f32(&self, fmt: &FixedFormat) -> Vec<f32> {
    self.0.iter().map(|&raw| fmt.to_f32(raw)).collect()
  }

  pub fn is_zero(&self) -> bool {
    self.0.iter().all(|&x| x == 0)
  }

  pub fn lanes(&self) -> &[i64; LANES] {
    &self.0
  }
}

/// A sign-select-or-skip weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Ternary {
  #[default]
  Zero,
  Plus,
  Minus,
}

impl Ternary {
  /// Quantize by sign.
  pub fn from_f32(x: f32) -> Self {
    if x > 0.0 {
      Ternary::Plus
    } else if x < 0.0 {
      Ternary::Minus
    } else {
      Ternary::Zero
    }
  }

  pub fn from_char(c: char) -> Result<Self, NpuError> {
    match c {
      '0' | '.' => Ok(Ternary::Zero),
      '+' | '1' => Ok(Ternary::Plus),
      '-' => Ok(Ternary::Minus),
      other => Err(NpuError::InvalidWeight(other)),
    }
  }

  pub fn to_char(self) -> char {
    match self {
      Ternary::Zero => '0',
      Ternary::Plus => '+',
      Ternary::Minus => '-',
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TernaryMatrix(pub [[Ternary; LANES]; LANES]);

impl TernaryMatrix {
  pub fn zero() -> Self {
    Self([[Ternary::Zero; LANES]; LANES])
  }

  /// PLUS on the diagonal.
  pub fn identity() -> Self {
    let mut m = Self::zero();
    for i in 0..LANES {
      m.0[i][i] = Ternary::Plus;
    }
    m
  }

  pub fn get(&self, row: usize, col: usize) -> Ternary {
    self.0[row][col]
  }

  pub fn set(&mut self, row: usize, col: usize, w: Ternary) {
    self.0[row][col] = w;
  }

  pub fn row(&self, row: usize) -> &[Ternary; LANES] {
    &self.0[row]
  }

  pub fn set_row(&mut self, row: usize, weights: [Ternary; LANES]) {
    self.0[row] = weights;
  }

  /// Parse rows written as `+`, `-` and `0` characters. Missing rows and
  /// columns stay ZERO.
  pub fn from_rows<S: AsRef<str>>(rows: &[S]) -> Result<Self, NpuError> {
    let mut m = Self::zero();
    for (r, line) in rows.iter().take(LANES).enumerate() {
      for (c, ch) in line.as_ref().chars().filter(|c| !c.is_whitespace()).take(LANES).enumerate() {
        m.0[r][c] = Ternary::from_char(ch)?;
      }
    }
    Ok(m)
  }

  pub fn to_rows(&self) -> Vec<String> {
    self.0.iter().map(|row| row.iter().map(|w| w.to_char()).collect()).collect()
  }
}
