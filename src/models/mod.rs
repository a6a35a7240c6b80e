//! Spectral model implementations.
//!
//! Reconstruction is implemented as small, pure functions so aggregation code
//! can stay generic over the fitting protocol.

pub mod model;

pub use model::*;
