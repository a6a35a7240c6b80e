//! `bayes-combine` library crate.
//!
//! The binary (`combine`) is a thin wrapper around this library so that:
//!
//! - selection and reconstruction are testable without spawning processes
//! - the per-sightline engine can be driven from other batch runners
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
