//! Memory domain: vector and matrix banks, the shared scratchpad and the
//! arbiter that serializes access to them

pub mod arbiter;
pub mod bank;
pub mod scratchpad;

pub use arbiter::{MemData, MemRequest, MemState, MemoryArbiter};
pub use bank::{MatrixBank, VectorBank, WeightRow};
pub use scratchpad::Scratchpad;
