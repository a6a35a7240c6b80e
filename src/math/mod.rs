//! Mathematical utilities: channel normalization, baseline polynomial, line profiles.

pub mod basis;

pub use basis::*;
