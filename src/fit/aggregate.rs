//! Fold fit artifacts into sightline and component records.
//!
//! Per sightline:
//! 1. all-undefined / all-zero spectra are excluded from every output
//! 2. missing artifact -> "no output", zero components, all-zero model curve
//! 3. upstream exception -> message recorded verbatim; an artifact that cannot be
//!    decoded is recorded as "unreadable output: ..."
//! 4. nothing beats the null model -> "no model"
//! 5. otherwise reconstruct and emit one component record per component
//!
//! No per-sightline failure aborts the batch. Sightlines are independent, so the
//! dataset loop runs on rayon; `collect` preserves input order.

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::data::{estimate_noise, is_excluded};
use crate::domain::{
    CandidateResult, CombinedRecords, ComponentRecord, FitArtifact, FitProtocol, LineQuantity, NamedStats,
    NoiseEstimate, OutcomeTally, ParamSummary, SelectedModel, Sightline, SightlineRecord,
};
use crate::error::FailureKind;
use crate::fit::selection::{candidate_bics, select_best_model};
use crate::io::ArtifactStore;
use crate::models::{Reconstruction, reconstruct};

/// A sightline whose selected model was reconstructed.
#[derive(Debug, Clone)]
pub struct FittedSightline {
    pub selected: SelectedModel,
    pub candidate_bics: Vec<f64>,
    pub baseline: Vec<NamedStats>,
    pub globals: Vec<NamedStats>,
    /// Untemplated per-component statistics, one entry per component.
    pub components: Vec<Vec<NamedStats>>,
    pub reconstruction: Reconstruction,
}

/// Coarse outcome class, kept for the run tally after the failure is flattened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeClass {
    Fitted,
    NoOutput,
    NoModel,
    Failed,
}

impl OutcomeClass {
    fn of(outcome: &Result<FittedSightline, FailureKind>) -> Self {
        match outcome {
            Ok(_) => OutcomeClass::Fitted,
            Err(FailureKind::MissingArtifact) => OutcomeClass::NoOutput,
            Err(FailureKind::NoModel { .. }) => OutcomeClass::NoModel,
            Err(_) => OutcomeClass::Failed,
        }
    }
}

/// Result of processing one sightline.
#[derive(Debug, Clone)]
pub enum SightlineOutcome {
    /// Data-quality exclusion: nothing is emitted.
    Excluded,
    Recorded {
        class: OutcomeClass,
        sightline: SightlineRecord,
        components: Vec<ComponentRecord>,
    },
}

fn collect_stats(summary: &ParamSummary, names: impl IntoIterator<Item = String>) -> Vec<NamedStats> {
    names
        .into_iter()
        .filter_map(|name| summary.get(&name).map(|&stats| NamedStats { name, stats }))
        .collect()
}

fn component_stats(summary: &ParamSummary, protocol: &FitProtocol, c: usize) -> Vec<NamedStats> {
    protocol
        .species
        .iter()
        .flat_map(|s| LineQuantity::ALL.iter().map(move |&q| (s, q)))
        .filter_map(|(s, q)| {
            summary.get(&FitProtocol::line_name(s, q, c)).map(|&stats| NamedStats {
                name: FitProtocol::line_base_name(s, q),
                stats,
            })
        })
        .collect()
}

/// Select and reconstruct the best model from one artifact.
pub fn fit_artifact(
    artifact: &FitArtifact,
    channels: &[f64],
    noise: NoiseEstimate,
    protocol: &FitProtocol,
    bic_threshold: f64,
) -> Result<FittedSightline, FailureKind> {
    if let Some(message) = &artifact.exception {
        return Err(FailureKind::Upstream(message.clone()));
    }

    let selected = select_best_model(&artifact.candidates, bic_threshold)?;
    let bics = candidate_bics(&artifact.candidates);

    let solution = match (selected.solution, artifact.candidates.get(&selected.complexity)) {
        (Some(id), Some(CandidateResult::Fitted { solutions, .. })) if selected.complexity > 0 => solutions.get(&id),
        _ => None,
    };
    let Some(solution) = solution else {
        return Err(FailureKind::NoModel {
            bic: selected.bic,
            candidate_bics: bics,
        });
    };

    let summary = &solution.summary;
    let reconstruction = reconstruct(
        summary,
        selected.complexity,
        channels,
        protocol,
        noise.rms,
        noise.offset,
    )
    .map_err(FailureKind::Reconstruction)?;

    Ok(FittedSightline {
        selected,
        candidate_bics: bics,
        baseline: collect_stats(summary, (0..=protocol.baseline_degree).map(|i| protocol.baseline_name(i))),
        globals: collect_stats(summary, protocol.global_params.iter().cloned()),
        components: (0..selected.complexity)
            .map(|c| component_stats(summary, protocol, c))
            .collect(),
        reconstruction,
    })
}

fn empty_record(sightline: &Sightline, noise: NoiseEstimate, grid_len: usize) -> SightlineRecord {
    SightlineRecord {
        idx: sightline.idx,
        glon: sightline.glon,
        glat: sightline.glat,
        rms: noise.rms,
        exception: None,
        n_components: 0,
        bic: None,
        multiplicity: 0,
        candidate_bics: Vec::new(),
        baseline: Vec::new(),
        globals: Vec::new(),
        model: vec![0.0; grid_len],
        spectrum: sightline.spectrum.clone(),
    }
}

/// Flatten an outcome into records. The failure becomes the `exception` text here.
pub fn build_records(
    sightline: &Sightline,
    noise: NoiseEstimate,
    outcome: Result<FittedSightline, FailureKind>,
    grid_len: usize,
) -> (SightlineRecord, Vec<ComponentRecord>) {
    let mut record = empty_record(sightline, noise, grid_len);

    let fitted = match outcome {
        Ok(fitted) => fitted,
        Err(kind) => {
            record.exception = Some(kind.to_string());
            if let FailureKind::NoModel { bic, candidate_bics } = kind {
                record.bic = Some(bic);
                record.candidate_bics = candidate_bics;
            }
            return (record, Vec::new());
        }
    };

    let components = fitted
        .components
        .into_iter()
        .zip(fitted.reconstruction.components)
        .enumerate()
        .map(|(c, (params, model))| ComponentRecord {
            idx: sightline.idx,
            component: c,
            glon: sightline.glon,
            glat: sightline.glat,
            rms: noise.rms,
            params,
            model,
        })
        .collect();

    record.n_components = fitted.selected.complexity;
    record.bic = Some(fitted.selected.bic);
    record.multiplicity = fitted.selected.multiplicity;
    record.candidate_bics = fitted.candidate_bics;
    record.baseline = fitted.baseline;
    record.globals = fitted.globals;
    record.model = fitted.reconstruction.total;

    (record, components)
}

/// Process one sightline end to end.
pub fn process_sightline(
    sightline: &Sightline,
    store: &dyn ArtifactStore,
    channels: &[f64],
    protocol: &FitProtocol,
    bic_threshold: f64,
) -> SightlineOutcome {
    if is_excluded(&sightline.spectrum) {
        debug!(sightline = sightline.idx, "excluded: no data");
        return SightlineOutcome::Excluded;
    }

    let noise = estimate_noise(&sightline.spectrum, channels, protocol);
    let outcome = match store.load(sightline.idx) {
        Ok(Some(artifact)) => fit_artifact(&artifact, channels, noise, protocol, bic_threshold),
        Ok(None) => Err(FailureKind::MissingArtifact),
        Err(e) => Err(FailureKind::Unreadable(e.to_string())),
    };

    match &outcome {
        Ok(fitted) => {
            if fitted.selected.is_ambiguous() {
                warn!(
                    sightline = sightline.idx,
                    complexity = fitted.selected.complexity,
                    multiplicity = fitted.selected.multiplicity,
                    "multiple converged solutions at selected complexity"
                );
            }
            debug!(
                sightline = sightline.idx,
                complexity = fitted.selected.complexity,
                bic = fitted.selected.bic,
                "model selected"
            );
        }
        Err(FailureKind::Upstream(message)) | Err(FailureKind::Unreadable(message)) => {
            warn!(sightline = sightline.idx, exception = %message, "fit output unusable");
        }
        Err(kind) => debug!(sightline = sightline.idx, exception = %kind, "no components"),
    }

    let class = OutcomeClass::of(&outcome);
    let (sightline, components) = build_records(sightline, noise, outcome, channels.len());
    SightlineOutcome::Recorded {
        class,
        sightline,
        components,
    }
}

fn tally_outcome(tally: &mut OutcomeTally, outcome: &SightlineOutcome) {
    tally.total += 1;
    let SightlineOutcome::Recorded { class, sightline, .. } = outcome else {
        tally.excluded += 1;
        return;
    };
    match class {
        OutcomeClass::Fitted => {
            tally.fitted += 1;
            *tally.complexity.entry(sightline.n_components).or_insert(0) += 1;
            if sightline.multiplicity > 1 {
                tally.ambiguous += 1;
            }
        }
        OutcomeClass::NoOutput => tally.no_output += 1,
        OutcomeClass::NoModel => tally.no_model += 1,
        OutcomeClass::Failed => tally.upstream += 1,
    }
}

/// Process a whole dataset, preserving input order.
pub fn combine_dataset(
    sightlines: &[Sightline],
    store: &dyn ArtifactStore,
    protocol: &FitProtocol,
    bic_threshold: f64,
) -> CombinedRecords {
    let channels = protocol.grid.channels();

    let outcomes: Vec<SightlineOutcome> = sightlines
        .par_iter()
        .map(|s| process_sightline(s, store, &channels, protocol, bic_threshold))
        .collect();

    let mut combined = CombinedRecords::default();
    for outcome in outcomes {
        tally_outcome(&mut combined.tally, &outcome);
        if let SightlineOutcome::Recorded {
            sightline, components, ..
        } = outcome
        {
            combined.sightlines.push(sightline);
            combined.components.extend(components);
        }
    }
    combined
}
