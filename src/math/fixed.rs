/// Fixed-point number format and saturation
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Signed fixed-point split: one sign bit, `int_bits` integer bits and
/// `frac_bits` fraction bits. Raw values are carried in an `i64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FixedFormat {
  pub int_bits: u32,
  pub frac_bits: u32,
}

/// A value after clamping into a format, with the flags the clamp raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Saturated {
  pub value: i64,
  pub overflow: bool,
  pub underflow: bool,
}

impl Saturated {
  pub fn exact(value: i64) -> Self {
    Self {
      value,
      overflow: false,
      underflow: false,
    }
  }
}

impl FixedFormat {
  /// Sign bit plus 31 fraction bits, range [-1.0, 1.0).
  pub const Q1_31: Self = Self {
    int_bits: 0,
    frac_bits: 31,
  };

  pub const FRAC_RANGE: std::ops::RangeInclusive<u32> = 16..=29;
  pub const INT_RANGE: std::ops::RangeInclusive<u32> = 2..=12;

  /// Build a custom split. Q1.31 is the only format allowed outside the
  /// configurable ranges.
  pub fn new(int_bits: u32, frac_bits: u32) -> Result<Self, ConfigError> {
    let fmt = Self { int_bits, frac_bits };
    fmt.validate()?;
    Ok(fmt)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if *self == Self::Q1_31 {
      return Ok(());
    }
    if !Self::FRAC_RANGE.contains(&self.frac_bits) {
      return Err(ConfigError::FractionBits(self.frac_bits));
    }
    if !Self::INT_RANGE.contains(&self.int_bits) {
      return Err(ConfigError::IntegerBits(self.int_bits));
    }
    Ok(())
  }

  /// Total width in bits, sign included.
  pub fn width(&self) -> u32 {
    self.int_bits + self.frac_bits + 1
  }

  pub fn max(&self) -> i64 {
    (1i64 << (self.width() - 1)) - 1
  }

  pub fn min(&self) -> i64 {
    -(1i64 << (self.width() - 1))
  }

  /// The representable +1.0. Without integer bits this is the largest
  /// positive value, one LSB short of 1.0.
  pub fn one(&self) -> i64 {
    if self.int_bits == 0 {
      self.max()
    } else {
      1i64 << self.frac_bits
    }
  }

  pub fn neg_one(&self) -> i64 {
    -(1i64 << self.frac_bits)
  }

  /// Clamp a wide intermediate into range.
  pub fn saturate(&self, wide: i64) -> Saturated {
    if wide > self.max() {
      Saturated {
        value: self.max(),
        overflow: true,
        underflow: false,
      }
    } else if wide < self.min() {
      Saturated {
        value: self.min(),
        overflow: true,
        underflow: false,
      }
    } else {
      Saturated::exact(wide)
    }
  }

  pub fn contains(&self, raw: i64) -> bool {
    raw >= self.min() && raw <= self.max()
  }

  /// Nearest representable value, clamped to the format range.
  pub fn from_f32(&self, x: f32) -> i64 {
    if x.is_nan() {
      return 0;
    }
    let scaled = (x as f64 * (1u64 << self.frac_bits) as f64).round();
    if scaled >= self.max() as f64 {
      self.max()
    } else if scaled <= self.min() as f64 {
      self.min()
    } else {
      scaled as i64
    }
  }

  pub fn to_f32(&self, raw: i64) -> f32 {
    (raw as f64 / (1u64 << self.frac_bits) as f64) as f32
  }
}

impl Default for FixedFormat {
  fn default() -> Self {
    Self::Q1_31
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_q1_31_bounds() {
    let q = FixedFormat::Q1_31;
    assert_eq!(q.width(), 32);
    assert_eq!(q.max(), i32::MAX as i64);
    assert_eq!(q.min(), i32::MIN as i64);
    assert_eq!(q.one(), q.max());
    assert_eq!(q.neg_one(), q.min());
  }

  #[test]
  fn test_custom_ranges() {
    assert!(FixedFormat::new(4, 20).is_ok());
    assert_eq!(FixedFormat::new(4, 15), Err(ConfigError::FractionBits(15)));
    assert_eq!(FixedFormat::new(4, 30), Err(ConfigError::FractionBits(30)));
    assert_eq!(FixedFormat::new(1, 20), Err(ConfigError::IntegerBits(1)));
    assert_eq!(FixedFormat::new(13, 20), Err(ConfigError::IntegerBits(13)));
  }

  #[test]
  fn test_one_with_integer_bits() {
    let f = FixedFormat::new(2, 16).unwrap();
    assert_eq!(f.width(), 19);
    assert_eq!(f.one(), 1 << 16);
    assert_eq!(f.neg_one(), -(1 << 16));
    assert_eq!(f.max(), (1 << 18) - 1);
  }

  #[test]
  fn test_saturate_flags() {
    let q = FixedFormat::Q1_31;
    assert_eq!(q.saturate(q.max() + 1).value, q.max());
    assert!(q.saturate(q.max() + 1).overflow);
    assert_eq!(q.saturate(q.min() - 1).value, q.min());
    assert!(q.saturate(q.min() - 1).overflow);
    assert!(!q.saturate(5).overflow);
  }

  #[test]
  fn test_f32_conversion() {
    let q = FixedFormat::Q1_31;
    assert_eq!(q.from_f32(0.5), 1 << 30);
    assert_eq!(q.from_f32(-0.5), -(1 << 30));
    assert_eq!(q.from_f32(2.0), q.max());
    assert_eq!(q.from_f32(-2.0), q.min());
    assert_eq!(q.to_f32(1 << 30), 0.5);
  }
}
