//! Dataset-level driver shared by the CLI.
//!
//! dataset load -> per-sightline select/reconstruct (parallel) -> persist
//!
//! Printing stays in `app`; this module only computes and writes.

use std::time::Instant;

use tracing::info;

use crate::domain::{CombineConfig, CombinedRecords, Sightline};
use crate::error::AppError;
use crate::fit::combine_dataset;
use crate::io::{ArtifactStore, FsArtifactStore, PersistedPaths, load_dataset, persist_records, validate_dataset};

/// All computed outputs of a single `combine run`.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub records: CombinedRecords,
    pub paths: PersistedPaths,
}

/// Execute the full batch and persist its outputs.
pub fn run_combine(config: &CombineConfig) -> Result<RunOutput, AppError> {
    let sightlines = load_dataset(&config.dataset_path)?;
    let store = FsArtifactStore::new(&config.results_dir, config.protocol.r_hat_max);
    run_combine_with_store(config, &sightlines, &store)
}

/// Execute the batch against an arbitrary artifact store.
pub fn run_combine_with_store(
    config: &CombineConfig,
    sightlines: &[Sightline],
    store: &dyn ArtifactStore,
) -> Result<RunOutput, AppError> {
    validate_dataset(sightlines, config.protocol.grid.len)?;
    info!(
        sightlines = sightlines.len(),
        results = %config.results_dir.display(),
        bic_threshold = config.bic_threshold,
        "combining fit results"
    );
    let started = Instant::now();

    let records = if config.threads > 0 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .build()
            .map_err(|e| AppError::new(2, format!("Failed to start {} worker threads: {e}", config.threads)))?;
        pool.install(|| combine_dataset(sightlines, store, &config.protocol, config.bic_threshold))
    } else {
        combine_dataset(sightlines, store, &config.protocol, config.bic_threshold)
    };

    let tally = &records.tally;
    info!(
        fitted = tally.fitted,
        no_model = tally.no_model,
        no_output = tally.no_output,
        upstream = tally.upstream,
        excluded = tally.excluded,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "combined"
    );

    let paths = persist_records(&config.out_dir, &records, &config.protocol, config.sequences)?;
    info!(out = %config.out_dir.display(), "persisted outputs");

    Ok(RunOutput { records, paths })
}
