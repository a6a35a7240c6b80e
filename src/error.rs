use thiserror::Error;

/// Application-level failure carrying the process exit code.
///
/// - 2: bad input, configuration or I/O
/// - 3: nothing to process
/// - 4: internal consistency problem
#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

/// Model selection cannot run on the supplied candidates.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SelectionError {
    #[error("missing null model")]
    MissingNullModel,
    #[error("invalid bic threshold {0} (must be finite and >= 0)")]
    InvalidThreshold(f64),
}

/// Why a sightline has no reconstructed components.
///
/// The display string is what ends up in the `exception` column.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FailureKind {
    /// No fit artifact exists for this sightline.
    #[error("no output")]
    MissingArtifact,
    /// The artifact exists but could not be decoded.
    #[error("unreadable output: {0}")]
    Unreadable(String),
    /// The fit job itself failed; the message is kept verbatim.
    #[error("{0}")]
    Upstream(String),
    /// No complexity improved on the null model.
    #[error("no model")]
    NoModel { bic: f64, candidate_bics: Vec<f64> },
    #[error("{0}")]
    Selection(#[from] SelectionError),
    #[error("reconstruction failed: {0}")]
    Reconstruction(String),
}
