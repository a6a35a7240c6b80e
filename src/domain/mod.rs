//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - fit job outputs (`CandidateResult`, `Solution`, `ParamStats`, `FitArtifact`)
//! - selection and preprocessing results (`SelectedModel`, `NoiseEstimate`)
//! - output records (`SightlineRecord`, `ComponentRecord`)
//! - run configuration (`CombineConfig`, `FitProtocol`)

pub mod types;

pub use types::*;
