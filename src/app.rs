//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and parses CLI arguments
//! - installs the tracing subscriber
//! - runs the batch pipeline or a single-artifact selection
//! - prints reports

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Command, RunArgs, SelectArgs};
use crate::domain::{CombineConfig, FitProtocol};
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `combine` binary.
pub fn run() -> Result<(), AppError> {
    // A missing .env is the common case.
    let _ = dotenvy::dotenv();
    let cli = crate::cli::Cli::parse();
    init_logging(cli.log_json);

    match cli.command {
        Command::Run(args) => handle_run(args),
        Command::Select(args) => handle_select(args),
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    // try_init: a subscriber may already be installed when embedded.
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

fn handle_run(args: RunArgs) -> Result<(), AppError> {
    let config = combine_config_from_args(&args)?;
    let run = pipeline::run_combine(&config)?;

    println!(
        "{}",
        crate::report::format_run_summary(
            &run.records.tally,
            run.records.components.len(),
            &config,
            &run.paths
        )
    );
    Ok(())
}

fn handle_select(args: SelectArgs) -> Result<(), AppError> {
    validate_threshold(args.bic_threshold)?;
    let protocol = FitProtocol::default();
    let artifact = crate::io::read_artifact_file(&args.artifact, protocol.r_hat_max)?;
    let selected = crate::fit::select_best_model(&artifact.candidates, args.bic_threshold)
        .map_err(|e| AppError::new(2, format!("Sightline {}: {e}", artifact.idx)))?;

    println!(
        "{}",
        crate::report::format_selection(&artifact, &selected, args.bic_threshold)
    );
    Ok(())
}

fn validate_threshold(bic_threshold: f64) -> Result<(), AppError> {
    if !bic_threshold.is_finite() || bic_threshold < 0.0 {
        return Err(AppError::new(
            2,
            format!("--bic-threshold must be finite and >= 0 (got {bic_threshold})."),
        ));
    }
    Ok(())
}

pub fn combine_config_from_args(args: &RunArgs) -> Result<CombineConfig, AppError> {
    validate_threshold(args.bic_threshold)?;
    Ok(CombineConfig {
        dataset_path: args.dataset.clone(),
        results_dir: args.results.clone(),
        out_dir: args.out.clone(),
        bic_threshold: args.bic_threshold,
        protocol: FitProtocol {
            baseline_degree: args.baseline_degree,
            ..FitProtocol::default()
        },
        sequences: args.sequences,
        threads: args.threads,
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::domain::SequencePolicy;

    fn args(bic_threshold: f64) -> RunArgs {
        RunArgs {
            dataset: PathBuf::from("d.json"),
            results: PathBuf::from("res"),
            out: PathBuf::from("out"),
            bic_threshold,
            baseline_degree: 3,
            sequences: SequencePolicy::Drop,
            threads: 2,
        }
    }

    #[test]
    fn config_carries_flags() {
        let config = combine_config_from_args(&args(4.0)).unwrap();
        assert_eq!(config.bic_threshold, 4.0);
        assert_eq!(config.protocol.baseline_degree, 3);
        assert_eq!(config.protocol.species, FitProtocol::default().species);
        assert_eq!(config.sequences, SequencePolicy::Drop);
        assert_eq!(config.threads, 2);
    }

    #[test]
    fn rejects_bad_threshold() {
        for t in [-1.0, f64::NAN, f64::INFINITY] {
            let err = combine_config_from_args(&args(t)).unwrap_err();
            assert_eq!(err.exit_code(), 2);
        }
    }
}
