//! Command-line parsing for the fit-result combiner.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the selection/reconstruction code.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::SequencePolicy;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "combine",
    version,
    about = "Combine per-sightline Bayesian line fits into sightline/component tables"
)]
pub struct Cli {
    /// Emit logs as JSON lines instead of human-readable text.
    #[arg(long, global = true, env = "COMBINE_LOG_JSON")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Select, reconstruct and persist every sightline of a dataset.
    Run(RunArgs),
    /// Run model selection on a single fit artifact and print the candidate table.
    Select(SelectArgs),
}

/// Options for a full batch run.
#[derive(Debug, Parser, Clone)]
pub struct RunArgs {
    /// Dataset JSON (array of sightlines).
    #[arg(long, env = "COMBINE_DATASET")]
    pub dataset: PathBuf,

    /// Directory holding one fit artifact per sightline (`{idx:06}.json`).
    #[arg(long, env = "COMBINE_RESULTS")]
    pub results: PathBuf,

    /// Output directory for the binary blobs and tables.
    #[arg(long, env = "COMBINE_OUT")]
    pub out: PathBuf,

    /// BIC improvement required to adopt a more complex model.
    #[arg(long, env = "COMBINE_BIC_THRESHOLD", default_value_t = 10.0)]
    pub bic_threshold: f64,

    /// Polynomial baseline degree used by the fit job.
    #[arg(long, env = "COMBINE_BASELINE_DEGREE", default_value_t = 1)]
    pub baseline_degree: usize,

    /// How sequence-valued fields are written to the CSV tables.
    #[arg(long, value_enum, env = "COMBINE_SEQUENCES", default_value_t = SequencePolicy::Stringify)]
    pub sequences: SequencePolicy,

    /// Worker threads (0 = one per core).
    #[arg(long, env = "COMBINE_THREADS", default_value_t = 0)]
    pub threads: usize,
}

/// Options for inspecting one artifact.
#[derive(Debug, Parser, Clone)]
pub struct SelectArgs {
    /// Fit artifact JSON.
    #[arg(long)]
    pub artifact: PathBuf,

    /// BIC improvement required to adopt a more complex model.
    #[arg(long, env = "COMBINE_BIC_THRESHOLD", default_value_t = 10.0)]
    pub bic_threshold: f64,
}
