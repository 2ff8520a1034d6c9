//! Per-user calibration: collect samples at known targets, fit a model,
//! optionally measure variance for the Kalman filter.

pub mod layout;
pub mod session;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::filter::KalmanTuning;
use crate::model::TrainedModel;

pub use layout::{CalibrationPoint, PointLayout};
pub use session::CalibrationSession;

/// Calibration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Layout used by callers that do not pass one explicitly.
    pub layout: PointLayout,
    /// Left/right/top inset of grid layouts as a fraction of the screen.
    pub margin_ratio: f64,
    pub min_samples_per_point: usize,
    pub max_samples_per_point: usize,
    /// Extra attempts allowed for a point that came up short.
    pub max_point_retries: u32,
    /// Held-out points visited in the tuning phase (at most 4, 0 disables).
    pub tuning_points: usize,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            layout: PointLayout::default(),
            margin_ratio: 0.10,
            min_samples_per_point: 3,
            max_samples_per_point: 25,
            max_point_retries: 2,
            tuning_points: 3,
        }
    }
}

// ── State machine ──────────────────────────────────────────

/// Where a calibration session is. `point` indexes the current target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CalibrationState {
    Idle,
    Presenting { point: usize },
    Capturing { point: usize },
    Training,
    /// Collecting held-out samples; `point` equals the tuning point count
    /// once every point has been visited.
    Tuning { point: usize },
    Completed,
    Error { kind: ErrorKind },
}

impl CalibrationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Presenting { .. } => "presenting",
            Self::Capturing { .. } => "capturing",
            Self::Training => "training",
            Self::Tuning { .. } => "tuning",
            Self::Completed => "completed",
            Self::Error { .. } => "error",
        }
    }

    /// Whether a session is in flight (buffers may hold samples).
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Presenting { .. } | Self::Capturing { .. } | Self::Training | Self::Tuning { .. }
        )
    }
}

impl fmt::Display for CalibrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Presenting { point } | Self::Capturing { point } | Self::Tuning { point } => {
                write!(f, "{}({})", self.as_str(), point)
            }
            Self::Error { kind } => write!(f, "error({})", kind.as_str()),
            _ => f.write_str(self.as_str()),
        }
    }
}

/// What happened to a submitted sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    /// Stored; `count` is the buffer size afterwards.
    Accepted { count: usize },
    /// Ignored: the buffer is full or the vector is not finite.
    Dropped,
}

/// Product of a completed session.
#[derive(Debug, Clone)]
pub struct CalibrationOutcome {
    pub model: TrainedModel,
    /// Present when the tuning phase ran to completion.
    pub tuning: Option<KalmanTuning>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(CalibrationState::Presenting { point: 3 }.to_string(), "presenting(3)");
        assert_eq!(CalibrationState::Training.to_string(), "training");
        assert_eq!(
            CalibrationState::Error {
                kind: ErrorKind::InsufficientSamples
            }
            .to_string(),
            "error(insufficient-samples)"
        );
    }

    #[test]
    fn test_state_serializes_with_tag() {
        let json = serde_json::to_value(CalibrationState::Capturing { point: 2 }).unwrap();
        assert_eq!(json, serde_json::json!({"state": "capturing", "point": 2}));
        let json = serde_json::to_value(CalibrationState::Error {
            kind: ErrorKind::TrainingFailed,
        })
        .unwrap();
        assert_eq!(json["kind"], "training-failed");
    }

    #[test]
    fn test_config_defaults() {
        let config = CalibrationConfig::default();
        assert_eq!(config.min_samples_per_point, 3);
        assert_eq!(config.max_samples_per_point, 25);
        assert_eq!(config.max_point_retries, 2);
        assert_eq!(config.layout, PointLayout::Five);
    }
}
