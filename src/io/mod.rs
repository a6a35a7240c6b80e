//! Input/output helpers.
//!
//! - dataset JSON ingest + validation (`dataset`)
//! - fit artifact storage (`artifact`)
//! - flattened CSV tables, write + read back (`table`)
//! - binary + tabular persistence of a batch (`export`)

pub mod artifact;
pub mod dataset;
pub mod export;
pub mod table;

pub use artifact::*;
pub use dataset::*;
pub use export::*;
pub use table::*;
