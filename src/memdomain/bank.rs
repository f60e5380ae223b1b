// Backing banks: vector slots and the ternary weight matrix

use crate::error::BankError;
use crate::math::{Ternary, TernaryMatrix, Vector, LANES};

/// One row of ternary weights as stored in the matrix bank.
pub type WeightRow = [Ternary; LANES];

#[derive(Debug, Clone, PartialEq)]
pub struct VectorBank {
  slots: Vec<Vector>,
}

impl VectorBank {
  pub fn new(depth: usize) -> Self {
    Self {
      slots: vec![Vector::zero(); depth],
    }
  }

  pub fn depth(&self) -> usize {
    self.slots.len()
  }

  pub fn check(&self, addr: usize) -> Result<(), BankError> {
    if addr < self.slots.len() {
      Ok(())
    } else {
      Err(BankError::VectorAddress {
        addr,
        depth: self.slots.len(),
      })
    }
  }

  pub fn read(&self, addr: usize) -> Result<Vector, BankError> {
    self.check(addr)?;
    Ok(self.slots[addr])
  }

  pub fn write(&mut self, addr: usize, value: Vector) -> Result<(), BankError> {
    self.check(addr)?;
    self.slots[addr] = value;
    Ok(())
  }

  pub fn clear(&mut self) {
    self.slots.fill(Vector::zero());
  }
}

/// A single 16x16 ternary matrix; weight `(r, c)` lives at address `r * 16 + c`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MatrixBank {
  cells: TernaryMatrix,
}

impl MatrixBank {
  pub const DEPTH: usize = LANES * LANES;

  pub fn new() -> Self {
    Self::default()
  }

  /// Validate a row range `start .. start + count`.
  pub fn check_rows(&self, start: usize, count: usize) -> Result<(), BankError> {
    let end = start + count;
    if count == 0 || end > LANES {
      return Err(BankError::MatrixRows { start, end });
    }
    Ok(())
  }

  pub fn read_row(&self, row: usize) -> Result<WeightRow, BankError> {
    self.check_rows(row, 1)?;
    Ok(*self.cells.row(row))
  }

  pub fn write_row(&mut self, row: usize, weights: WeightRow) -> Result<(), BankError> {
    self.check_rows(row, 1)?;
    self.cells.set_row(row, weights);
    Ok(())
  }

  pub fn get(&self, addr: usize) -> Option<Ternary> {
    (addr < Self::DEPTH).then(|| self.cells.get(addr / LANES, addr % LANES))
  }

  pub fn set(&mut self, addr: usize, w: Ternary) -> Result<(), BankError> {
    self.check_rows(addr / LANES, 1)?;
    self.cells.set(addr / LANES, addr % LANES, w);
    Ok(())
  }

  pub fn matrix(&self) -> &TernaryMatrix {
    &self.cells
  }

  pub fn load(&mut self, m: TernaryMatrix) {
    self.cells = m;
  }

  pub fn clear(&mut self) {
    self.cells = TernaryMatrix::zero();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_vector_bank_range() {
    let mut bank = VectorBank::new(64);
    let v = Vector::splat(3);
    assert!(bank.write(63, v).is_ok());
    assert_eq!(bank.read(63), Ok(v));
    assert_eq!(bank.read(64), Err(BankError::VectorAddress { addr: 64, depth: 64 }));
    assert!(bank.write(100, v).is_err());
  }

  #[test]
  fn test_matrix_rows_range() {
    let bank = MatrixBank::new();
    assert!(bank.check_rows(0, 16).is_ok());
    assert!(bank.check_rows(15, 1).is_ok());
    assert_eq!(bank.check_rows(12, 8), Err(BankError::MatrixRows { start: 12, end: 20 }));
  }

  #[test]
  fn test_matrix_addressing() {
    let mut bank = MatrixBank::new();
    bank.set(2 * 16 + 5, Ternary::Minus).unwrap();
    assert_eq!(bank.matrix().get(2, 5), Ternary::Minus);
    assert_eq!(bank.get(37), Some(Ternary::Minus));
    assert_eq!(bank.get(256), None);
    assert!(bank.set(256, Ternary::Plus).is_err());
  }
}
