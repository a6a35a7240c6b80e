//! Dataset ingest.
//!
//! A dataset is a JSON array of sightlines:
//!
//! ```text
//! [{ "idx": 0, "glon": 30.1, "glat": -0.2, "spectrum": [0.01, null, ...] }, ...]
//! ```
//!
//! `null` samples are undefined. Array order is the output order.

use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::domain::Sightline;
use crate::error::AppError;

/// Load a dataset file. See [`validate_dataset`] for the checks a batch applies.
pub fn load_dataset(path: &Path) -> Result<Vec<Sightline>, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open dataset '{}': {e}", path.display())))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::new(2, format!("Invalid dataset JSON '{}': {e}", path.display())))
}

/// Reject empty datasets, duplicate sightline ids and spectra that do not
/// cover the channel grid sample for sample.
///
/// Fit artifacts are keyed by id, so a duplicate would silently share one.
pub fn validate_dataset(sightlines: &[Sightline], channels: usize) -> Result<(), AppError> {
    if sightlines.is_empty() {
        return Err(AppError::new(3, "Dataset contains no sightlines."));
    }
    let mut seen = HashSet::with_capacity(sightlines.len());
    for s in sightlines {
        if !seen.insert(s.idx) {
            return Err(AppError::new(2, format!("Duplicate sightline idx {} in dataset.", s.idx)));
        }
        if s.spectrum.len() != channels {
            return Err(AppError::new(
                2,
                format!(
                    "Sightline {} has {} samples, the channel grid has {channels}.",
                    s.idx,
                    s.spectrum.len()
                ),
            ));
        }
    }
    Ok(())
}
