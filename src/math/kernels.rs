/// Saturating fixed-point and ternary kernels
///
/// Every kernel works lane by lane so the shared ALU can evaluate one lane
/// per cycle; the whole-vector forms just fold the lanes.
use super::fixed::{FixedFormat, Saturated};
use super::status::ComputeStatus;
use super::vector::{Ternary, TernaryMatrix, Vector};

pub fn sat_add(fmt: &FixedFormat, a: i64, b: i64) -> Saturated {
  fmt.saturate(a + b)
}

pub fn sat_sub(fmt: &FixedFormat, a: i64, b: i64) -> Saturated {
  fmt.saturate(a - b)
}

/// One output row of `m x v`. The accumulator is 64 bits wide and never
/// exceeds 46 significant bits for any legal format.
pub fn matvec_row(fmt: &FixedFormat, m: &TernaryMatrix, v: &Vector, row: usize) -> Saturated {
  let acc = m
    .row(row)
    .iter()
    .zip(v.0.iter())
    .fold(0i64, |acc, (w, &x)| match w {
      Ternary::Zero => acc,
      Ternary::Plus => acc + x,
      Ternary::Minus => acc - x,
    });
  fmt.saturate(acc)
}

/// Pass non-negative values, zero out the rest.
pub fn relu(x: i64) -> i64 {
  if x < 0 {
    0
  } else {
    x
  }
}

/// Two-level clamp standing in for tanh: negative inputs map to -1,
/// everything else to +1.
pub fn tanh_clamp(fmt: &FixedFormat, x: i64) -> i64 {
  if x < 0 {
    fmt.neg_one()
  } else {
    fmt.one()
  }
}

/// `x * x` rescaled into the format.
pub fn square(fmt: &FixedFormat, x: i64) -> Saturated {
  let wide = (x as i128 * x as i128) >> fmt.frac_bits;
  let mut out = if wide > fmt.max() as i128 {
    Saturated {
      value: fmt.max(),
      overflow: true,
      underflow: false,
    }
  } else {
    Saturated::exact(wide as i64)
  };
  out.underflow = x != 0 && out.value == 0;
  out
}

/// Lane-wise result of a whole-vector kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VectorResult {
  pub value: Vector,
  pub status: ComputeStatus,
}

impl VectorResult {
  fn collect(mut lane: impl FnMut(usize) -> Saturated) -> Self {
    let mut status = ComputeStatus::default();
    let value = Vector::from_fn(|i| {
      let s = lane(i);
      status.absorb(&s);
      s.value
    });
    status.zero = value.is_zero();
    Self { value, status }
  }
}

pub fn vec_add(fmt: &FixedFormat, a: &Vector, b: &Vector) -> VectorResult {
  VectorResult::collect(|i| sat_add(fmt, a.0[i], b.0[i]))
}

pub fn vec_sub(fmt: &FixedFormat, a: &Vector, b: &Vector) -> VectorResult {
  VectorResult::collect(|i| sat_sub(fmt, a.0[i], b.0[i]))
}

pub fn matvec(fmt: &FixedFormat, m: &TernaryMatrix, v: &Vector) -> VectorResult {
  VectorResult::collect(|r| matvec_row(fmt, m, v, r))
}

pub fn vec_relu(v: &Vector) -> VectorResult {
  VectorResult::collect(|i| Saturated::exact(relu(v.0[i])))
}

pub fn vec_tanh(fmt: &FixedFormat, v: &Vector) -> VectorResult {
  VectorResult::collect(|i| Saturated::exact(tanh_clamp(fmt, v.0[i])))
}

pub fn vec_square(fmt: &FixedFormat, v: &Vector) -> VectorResult {
  VectorResult::collect(|i| square(fmt, v.0[i]))
}
