//! Spectrum preprocessing ahead of aggregation.

pub mod noise;

pub use noise::*;
