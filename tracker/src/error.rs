//! Error taxonomy for calibration, model fitting and filter configuration.

use serde::Serialize;

/// Why a regression model could not be fitted.
///
/// Detailed enough that a caller can pick a lower-capacity variant and retry
/// from the same buffered samples.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrainingFailure {
    #[error("insufficient points: got {got} samples, need at least {need}")]
    TooFewSamples { got: usize, need: usize },

    #[error("singular matrix: design matrix is not invertible")]
    SingularMatrix,

    #[error("non-finite value encountered during fitting")]
    NonFinite,

    #[error("feature dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Invalid smoothing filter parameters.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FilterError {
    #[error("degenerate filter config: {0}")]
    DegenerateFilterConfig(String),
}

/// Short tag for a calibration error, stored in the session's `Error` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    InvalidLayout,
    InvalidState,
    InsufficientSamples,
    TrainingFailed,
    DegenerateFilterConfig,
    FeatureDimensionMismatch,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidLayout => "invalid-layout",
            Self::InvalidState => "invalid-state",
            Self::InsufficientSamples => "insufficient-samples",
            Self::TrainingFailed => "training-failed",
            Self::DegenerateFilterConfig => "degenerate-filter-config",
            Self::FeatureDimensionMismatch => "feature-dimension-mismatch",
        }
    }
}

/// Errors returned by the calibration session.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalibrationError {
    #[error("invalid layout: {0}")]
    InvalidLayout(String),

    #[error("`{op}` is not valid in state {state}")]
    InvalidState { op: &'static str, state: String },

    #[error("point {point}: {got} samples after {attempts} attempts, need {need}")]
    InsufficientSamples {
        point: usize,
        got: usize,
        need: usize,
        attempts: u32,
    },

    #[error("training failed: {0}")]
    TrainingFailed(#[from] TrainingFailure),

    #[error("degenerate filter config: {0}")]
    DegenerateFilterConfig(String),

    #[error("feature vector has {got} values, session expects {expected}")]
    FeatureDimensionMismatch { expected: usize, got: usize },
}

impl CalibrationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidLayout(_) => ErrorKind::InvalidLayout,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::InsufficientSamples { .. } => ErrorKind::InsufficientSamples,
            Self::TrainingFailed(_) => ErrorKind::TrainingFailed,
            Self::DegenerateFilterConfig(_) => ErrorKind::DegenerateFilterConfig,
            Self::FeatureDimensionMismatch { .. } => ErrorKind::FeatureDimensionMismatch,
        }
    }

    /// Whether the error ends the current session.
    ///
    /// A mismatched feature vector is rejected on its own; everything else
    /// moves the session to `Error`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::FeatureDimensionMismatch { .. })
    }
}

impl From<FilterError> for CalibrationError {
    fn from(err: FilterError) -> Self {
        match err {
            FilterError::DegenerateFilterConfig(msg) => Self::DegenerateFilterConfig(msg),
        }
    }
}

pub type CalibrationResult<T> = Result<T, CalibrationError>;
