//! Model selection and result aggregation.
//!
//! Responsibilities:
//!
//! - pick the best complexity and solution per sightline (BIC + parsimony margin)
//! - reconstruct the selected model and fold it into output records
//! - drive the per-sightline loop over a dataset (parallel, order-preserving)

pub mod aggregate;
pub mod selection;

pub use aggregate::*;
pub use selection::*;
