//! Reporting utilities: run summaries and per-artifact selection tables.

pub mod format;

pub use format::*;
