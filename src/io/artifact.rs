//! Fit artifact storage.
//!
//! Each sightline's fit job leaves one JSON file, `{idx:06}.json`:
//!
//! ```text
//! {
//!   "idx": 12,
//!   "exception": "",
//!   "results": {
//!     "0": { "bic": 1520.3 },
//!     "1": { "bic": 1490.1, "solutions": { "0": { "bic": 1490.1, "converged": true,
//!             "summary": { "H_amplitude[0]": { "mean": .., "sd": .., "hdi_lower": .., "hdi_upper": .., "r_hat": .. } } } } }
//!   }
//! }
//! ```
//!
//! Non-finite BICs may be written as `null` (read as `+inf`) or as strings such
//! as `"inf"`. When a solution has no `converged` flag, convergence is inferred
//! from its `r_hat` values.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::domain::{CandidateResult, Candidates, FitArtifact, ParamStats, ParamSummary, Solution};
use crate::error::AppError;

/// Read-only access to fit artifacts keyed by sightline id.
pub trait ArtifactStore: Send + Sync {
    /// `Ok(None)` when no artifact exists for `idx`.
    fn load(&self, idx: u64) -> Result<Option<FitArtifact>, AppError>;
}

/// Artifacts stored as `{dir}/{idx:06}.json`.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    dir: PathBuf,
    r_hat_max: f64,
}

impl FsArtifactStore {
    pub fn new(dir: impl Into<PathBuf>, r_hat_max: f64) -> Self {
        Self {
            dir: dir.into(),
            r_hat_max,
        }
    }

    pub fn path_for(&self, idx: u64) -> PathBuf {
        self.dir.join(format!("{idx:06}.json"))
    }
}

impl ArtifactStore for FsArtifactStore {
    fn load(&self, idx: u64) -> Result<Option<FitArtifact>, AppError> {
        let path = self.path_for(idx);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AppError::new(
                    2,
                    format!("Failed to open fit artifact '{}': {e}", path.display()),
                ));
            }
        };
        let artifact = parse_artifact(BufReader::new(file), self.r_hat_max)?;
        if artifact.idx != idx {
            return Err(AppError::new(
                4,
                format!("Fit artifact '{}' is for sightline {}, expected {idx}.", path.display(), artifact.idx),
            ));
        }
        Ok(Some(artifact))
    }
}

/// In-memory artifacts, mostly for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemoryArtifactStore {
    artifacts: HashMap<u64, FitArtifact>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, artifact: FitArtifact) {
        self.artifacts.insert(artifact.idx, artifact);
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn load(&self, idx: u64) -> Result<Option<FitArtifact>, AppError> {
        Ok(self.artifacts.get(&idx).cloned())
    }
}

/// Read a single artifact file (sightline id taken from the file).
pub fn read_artifact_file(path: &Path, r_hat_max: f64) -> Result<FitArtifact, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open fit artifact '{}': {e}", path.display())))?;
    parse_artifact(BufReader::new(file), r_hat_max)
}

/// Decode an artifact from JSON.
pub fn parse_artifact<R: Read>(reader: R, r_hat_max: f64) -> Result<FitArtifact, AppError> {
    let file: ArtifactFile =
        serde_json::from_reader(reader).map_err(|e| AppError::new(2, format!("Invalid fit artifact JSON: {e}")))?;
    file.into_artifact(r_hat_max).map_err(|e| AppError::new(2, format!("Invalid fit artifact: {e}")))
}

/// `true` when every reported `r_hat` is below `r_hat_max` (and at least one exists).
pub fn converged_from_r_hat(summary: &ParamSummary, r_hat_max: f64) -> bool {
    let r_hats: Vec<f64> = summary
        .values()
        .filter_map(|s| s.r_hat)
        .filter(|r| r.is_finite())
        .collect();
    !r_hats.is_empty() && r_hats.iter().all(|&r| r < r_hat_max)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireFloat {
    Num(f64),
    Text(String),
}

fn resolve_float(value: Option<WireFloat>, if_null: f64) -> Result<f64, String> {
    match value {
        None => Ok(if_null),
        Some(WireFloat::Num(x)) => Ok(x),
        Some(WireFloat::Text(t)) => match t.trim().to_ascii_lowercase().as_str() {
            "inf" | "+inf" | "infinity" | "+infinity" => Ok(f64::INFINITY),
            "-inf" | "-infinity" => Ok(f64::NEG_INFINITY),
            "nan" => Ok(f64::NAN),
            other => other.parse::<f64>().map_err(|_| format!("not a number: '{t}'")),
        },
    }
}

#[derive(Debug, Deserialize)]
struct ArtifactFile {
    #[serde(default)]
    idx: Option<u64>,
    #[serde(default)]
    exception: Option<String>,
    #[serde(default)]
    results: BTreeMap<String, CandidateEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CandidateEntry {
    Fitted {
        #[serde(default)]
        bic: Option<WireFloat>,
        solutions: BTreeMap<String, SolutionEntry>,
    },
    Null {
        #[serde(default)]
        bic: Option<WireFloat>,
    },
}

#[derive(Debug, Deserialize)]
struct SolutionEntry {
    #[serde(default)]
    bic: Option<WireFloat>,
    #[serde(default)]
    converged: Option<bool>,
    #[serde(default)]
    summary: BTreeMap<String, StatsEntry>,
}

#[derive(Debug, Deserialize)]
struct StatsEntry {
    #[serde(default)]
    mean: Option<WireFloat>,
    #[serde(default)]
    sd: Option<WireFloat>,
    #[serde(default, alias = "hdi_3%", alias = "hdi_16%", alias = "hdi_2.5%")]
    hdi_lower: Option<WireFloat>,
    #[serde(default, alias = "hdi_97%", alias = "hdi_84%", alias = "hdi_97.5%")]
    hdi_upper: Option<WireFloat>,
    #[serde(default)]
    r_hat: Option<WireFloat>,
}

impl StatsEntry {
    fn into_stats(self) -> Result<ParamStats, String> {
        Ok(ParamStats {
            mean: resolve_float(self.mean, f64::NAN)?,
            sd: resolve_float(self.sd, f64::NAN)?,
            hdi_lower: resolve_float(self.hdi_lower, f64::NAN)?,
            hdi_upper: resolve_float(self.hdi_upper, f64::NAN)?,
            r_hat: match self.r_hat {
                None => None,
                v => Some(resolve_float(v, f64::NAN)?),
            },
        })
    }
}

impl SolutionEntry {
    fn into_solution(self, r_hat_max: f64) -> Result<Solution, String> {
        let summary = self
            .summary
            .into_iter()
            .map(|(name, s)| s.into_stats().map(|s| (name, s)))
            .collect::<Result<ParamSummary, _>>()?;
        let converged = match self.converged {
            Some(flag) => flag,
            None => converged_from_r_hat(&summary, r_hat_max),
        };
        Ok(Solution {
            converged,
            bic: resolve_float(self.bic, f64::INFINITY)?,
            summary,
        })
    }
}

impl ArtifactFile {
    fn into_artifact(self, r_hat_max: f64) -> Result<FitArtifact, String> {
        let idx = self.idx.ok_or("missing 'idx'")?;
        let exception = self.exception.filter(|e| !e.trim().is_empty());

        let mut candidates = Candidates::new();
        for (key, entry) in self.results {
            let complexity: usize = key
                .trim()
                .parse()
                .map_err(|_| format!("invalid complexity key '{key}'"))?;
            let candidate = match entry {
                CandidateEntry::Null { bic } => CandidateResult::Null {
                    bic: resolve_float(bic, f64::INFINITY)?,
                },
                CandidateEntry::Fitted { bic, solutions } => {
                    let mut out = BTreeMap::new();
                    for (id, s) in solutions {
                        let id: u32 = id
                            .trim()
                            .parse()
                            .map_err(|_| format!("invalid solution id '{id}' at complexity {complexity}"))?;
                        out.insert(id, s.into_solution(r_hat_max)?);
                    }
                    CandidateResult::Fitted {
                        bic: resolve_float(bic, f64::INFINITY)?,
                        solutions: out,
                    }
                }
            };
            candidates.insert(complexity, candidate);
        }

        Ok(FitArtifact {
            idx,
            exception,
            candidates,
        })
    }
}
