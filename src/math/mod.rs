//! Fixed-point and ternary math kernels

pub mod fixed;
pub mod kernels;
pub mod status;
pub mod vector;

pub use fixed::{FixedFormat, Saturated};
pub use kernels::VectorResult;
pub use status::ComputeStatus;
pub use vector::{Ternary, TernaryMatrix, Vector, LANES};
