//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - produced once from fit artifacts and never mutated
//! - folded into output records
//! - persisted as `bincode` blobs and CSV tables

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Posterior statistics for one parameter.
///
/// `hdi_lower` / `hdi_upper` bound the credible interval at whatever
/// probability level the upstream summarizer was configured with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamStats {
    pub mean: f64,
    pub sd: f64,
    pub hdi_lower: f64,
    pub hdi_upper: f64,
    /// Potential-scale-reduction statistic, when the summarizer reported one.
    pub r_hat: Option<f64>,
}

impl ParamStats {
    /// Statistic column suffixes, in table order.
    pub const COLUMNS: [&'static str; 5] = ["mean", "sd", "hdi_lower", "hdi_upper", "r_hat"];

    /// Values in the same order as [`ParamStats::COLUMNS`].
    pub fn values(&self) -> [Option<f64>; 5] {
        [
            Some(self.mean),
            Some(self.sd),
            Some(self.hdi_lower),
            Some(self.hdi_upper),
            self.r_hat,
        ]
    }
}

/// Parameter name (templated by component index, e.g. `H_amplitude[1]`) to statistics.
pub type ParamSummary = BTreeMap<String, ParamStats>;

/// One converged (or not) mode of the posterior at a fixed complexity.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub converged: bool,
    pub bic: f64,
    pub summary: ParamSummary,
}

/// Fit outcome for one candidate complexity.
#[derive(Debug, Clone, PartialEq)]
pub enum CandidateResult {
    /// Terminal sentinel used for the zero-component model: a BIC and nothing else.
    Null { bic: f64 },
    /// A sampled model. `bic` is whatever the fit job reported; selection
    /// recomputes its own representative value from the converged solutions.
    Fitted {
        bic: f64,
        solutions: BTreeMap<u32, Solution>,
    },
}

/// Candidate complexity to its fit outcome. `BTreeMap` gives ascending iteration.
pub type Candidates = BTreeMap<usize, CandidateResult>;

/// Everything the external fit job left behind for one sightline.
#[derive(Debug, Clone, PartialEq)]
pub struct FitArtifact {
    pub idx: u64,
    /// Non-empty when the fit job itself failed.
    pub exception: Option<String>,
    pub candidates: Candidates,
}

/// Output of the model selector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectedModel {
    pub complexity: usize,
    pub solution: Option<u32>,
    pub bic: f64,
    /// Number of converged solutions at the selected complexity.
    pub multiplicity: usize,
}

impl SelectedModel {
    /// No complexity improved on the null model.
    pub fn is_null(&self) -> bool {
        self.complexity == 0 || self.solution.is_none()
    }

    pub fn is_ambiguous(&self) -> bool {
        self.multiplicity > 1
    }
}

/// One observed spectrum and its sky position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sightline {
    pub idx: u64,
    pub glon: f64,
    pub glat: f64,
    /// Raw samples; `None` marks an undefined sample.
    pub spectrum: Vec<Option<f64>>,
}

/// Robust noise estimate of a spectrum, in fitted units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseEstimate {
    /// Spectral rms from the line-free channels.
    pub rms: f64,
    /// Brightness offset (median of all defined samples).
    pub offset: f64,
}

/// A parameter name paired with its statistics (order-preserving record field).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedStats {
    pub name: String,
    pub stats: ParamStats,
}

/// One record per spectrum that passed the data-quality check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SightlineRecord {
    pub idx: u64,
    pub glon: f64,
    pub glat: f64,
    pub rms: f64,
    pub exception: Option<String>,
    pub n_components: usize,
    pub bic: Option<f64>,
    pub multiplicity: usize,
    /// Representative BIC per candidate complexity, ascending.
    pub candidate_bics: Vec<f64>,
    pub baseline: Vec<NamedStats>,
    pub globals: Vec<NamedStats>,
    pub model: Vec<f64>,
    pub spectrum: Vec<Option<f64>>,
}

/// One record per detected component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRecord {
    pub idx: u64,
    pub component: usize,
    pub glon: f64,
    pub glat: f64,
    pub rms: f64,
    /// Keyed by the untemplated parameter name (e.g. `H_amplitude`).
    pub params: Vec<NamedStats>,
    pub model: Vec<f64>,
}

/// Per-component quantities tracked for every species.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineQuantity {
    Amplitude,
    Center,
    Fwhm,
}

impl LineQuantity {
    pub const ALL: [LineQuantity; 3] = [LineQuantity::Amplitude, LineQuantity::Center, LineQuantity::Fwhm];

    pub fn as_str(self) -> &'static str {
        match self {
            LineQuantity::Amplitude => "amplitude",
            LineQuantity::Center => "center",
            LineQuantity::Fwhm => "fwhm",
        }
    }
}

/// A linearly spaced channel axis (inclusive endpoints).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelGrid {
    pub start: f64,
    pub end: f64,
    pub len: usize,
}

impl ChannelGrid {
    pub fn channels(&self) -> Vec<f64> {
        match self.len {
            0 => Vec::new(),
            1 => vec![self.start],
            n => {
                let step = (self.end - self.start) / (n as f64 - 1.0);
                let mut out: Vec<f64> = (0..n).map(|i| self.start + step * i as f64).collect();
                out[n - 1] = self.end;
                out
            }
        }
    }
}

/// Conventions of the fit job that produced the posteriors.
///
/// Reconstruction is only exact when these match the upstream fitting setup.
#[derive(Debug, Clone, PartialEq)]
pub struct FitProtocol {
    pub grid: ChannelGrid,
    pub baseline_degree: usize,
    /// Base name of the baseline coefficients, e.g. `baseline_coeffs` -> `baseline_coeffs[0]`.
    pub baseline_param: String,
    /// Species with a line profile per component, e.g. `H`, `He`.
    pub species: Vec<String>,
    /// Component-independent parameters recorded per sightline.
    pub global_params: Vec<String>,
    /// Channels with `|x| > line_free_edge` are treated as line-free.
    pub line_free_edge: f64,
    /// Multiplier converting stored spectrum samples into fitted units.
    pub spectrum_scale: f64,
    /// Convergence cut on `r_hat` when an artifact has no explicit flag.
    pub r_hat_max: f64,
}

impl Default for FitProtocol {
    fn default() -> Self {
        Self {
            grid: ChannelGrid {
                start: -300.0,
                end: 300.0,
                len: 1201,
            },
            baseline_degree: 1,
            baseline_param: "baseline_coeffs".to_string(),
            species: vec!["H".to_string(), "He".to_string()],
            global_params: vec!["He_H_fwhm_ratio".to_string(), "yplus".to_string()],
            line_free_edge: 150.0,
            spectrum_scale: 1000.0,
            r_hat_max: 1.05,
        }
    }
}

impl FitProtocol {
    /// Name of baseline coefficient `i`.
    pub fn baseline_name(&self, i: usize) -> String {
        format!("{}[{i}]", self.baseline_param)
    }

    /// Untemplated name of a line parameter, e.g. `He_fwhm`.
    pub fn line_base_name(species: &str, quantity: LineQuantity) -> String {
        format!("{species}_{}", quantity.as_str())
    }

    /// Templated name of a line parameter for component `c`, e.g. `He_fwhm[2]`.
    pub fn line_name(species: &str, quantity: LineQuantity, c: usize) -> String {
        format!("{}[{c}]", Self::line_base_name(species, quantity))
    }

    /// Untemplated per-component parameter names in table order.
    pub fn component_params(&self) -> Vec<String> {
        self.species
            .iter()
            .flat_map(|s| LineQuantity::ALL.iter().map(move |&q| Self::line_base_name(s, q)))
            .collect()
    }
}

/// What to do with sequence-valued fields in the delimited tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SequencePolicy {
    /// Write sequences as JSON array text.
    Stringify,
    /// Omit sequence columns entirely.
    Drop,
}

impl fmt::Display for SequencePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequencePolicy::Stringify => write!(f, "stringify"),
            SequencePolicy::Drop => write!(f, "drop"),
        }
    }
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct CombineConfig {
    pub dataset_path: PathBuf,
    pub results_dir: PathBuf,
    pub out_dir: PathBuf,
    /// Required BIC improvement before a more complex model is adopted.
    pub bic_threshold: f64,
    pub protocol: FitProtocol,
    pub sequences: SequencePolicy,
    /// Worker threads (0 = rayon default).
    pub threads: usize,
}

/// Counts of per-sightline outcomes for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutcomeTally {
    pub total: usize,
    pub excluded: usize,
    pub no_output: usize,
    pub upstream: usize,
    pub no_model: usize,
    pub fitted: usize,
    pub ambiguous: usize,
    /// Selected complexity to number of fitted sightlines.
    pub complexity: BTreeMap<usize, usize>,
}

/// Everything one batch run produces.
#[derive(Debug, Clone, Default)]
pub struct CombinedRecords {
    pub sightlines: Vec<SightlineRecord>,
    pub components: Vec<ComponentRecord>,
    pub tally: OutcomeTally,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_grid_matches_fit_axis() {
        let grid = FitProtocol::default().grid;
        let x = grid.channels();
        assert_eq!(x.len(), 1201);
        assert_eq!(x[0], -300.0);
        assert_eq!(x[600], 0.0);
        assert_eq!(x[1200], 300.0);
        assert!((x[1] - x[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn line_names_are_templated_by_component() {
        assert_eq!(FitProtocol::line_name("He", LineQuantity::Fwhm, 2), "He_fwhm[2]");
        assert_eq!(FitProtocol::default().baseline_name(1), "baseline_coeffs[1]");
        assert_eq!(
            FitProtocol::default().component_params(),
            vec!["H_amplitude", "H_center", "H_fwhm", "He_amplitude", "He_center", "He_fwhm"]
        );
    }
}
