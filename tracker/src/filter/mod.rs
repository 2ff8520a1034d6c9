//! Smoothing filters: raw model estimates → temporally stable coordinates.
//!
//! Every variant consumes exactly one observation per `step` at bounded
//! cost. `reset` clears all memory; the gaze loop calls it on
//! recalibration, restart, and when the no-face watchdog trips.

pub mod ema;
pub mod kalman;
pub mod kde;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::FilterError;
use crate::screen::GazePoint;

pub use ema::EmaFilter;
pub use kalman::{KalmanFilter, KalmanTuning};
pub use kde::KdeFilter;

/// Common step/reset contract.
pub trait SmoothingFilter {
    fn step(&mut self, raw: GazePoint) -> GazePoint;
    fn reset(&mut self);
}

// ── Variant selection ──────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterKind {
    /// Passthrough. No latency, no memory.
    None,
    /// Constant-velocity Kalman filter.
    #[default]
    Kalman,
    /// Mode of a kernel density estimate over a sliding window.
    Kde,
    /// Exponential moving average.
    Ema,
}

impl FilterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Kalman => "kalman",
            Self::Kde => "kde",
            Self::Ema => "ema",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "none" | "passthrough" => Some(Self::None),
            "kalman" => Some(Self::Kalman),
            "kde" => Some(Self::Kde),
            "ema" => Some(Self::Ema),
            _ => Option::None,
        }
    }

    /// Whether calibration should run the tuning phase for this filter.
    pub fn is_variance_sensitive(&self) -> bool {
        matches!(self, Self::Kalman)
    }
}

/// Parameters for all filter variants. Variances are in px².
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterParams {
    pub process_variance: f64,
    pub measurement_variance_x: f64,
    pub measurement_variance_y: f64,
    /// Sliding window length for KDE, in frames.
    pub kde_window: usize,
    /// Fixed KDE bandwidth; `None` uses Scott's rule on the window.
    pub kde_bandwidth_px: Option<f64>,
    /// Mean-shift iterations per KDE step.
    pub kde_iterations: usize,
    /// EMA weight of the newest observation, in (0, 1].
    pub ema_alpha: f64,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            process_variance: 50.0,
            measurement_variance_x: 200.0,
            measurement_variance_y: 200.0,
            kde_window: 30,
            kde_bandwidth_px: None,
            kde_iterations: 5,
            ema_alpha: 0.3,
        }
    }
}

/// `[filter]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub kind: FilterKind,
    pub params: FilterParams,
}

// ── Passthrough ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl SmoothingFilter for Passthrough {
    fn step(&mut self, raw: GazePoint) -> GazePoint {
        raw
    }

    fn reset(&mut self) {}
}

// ── Closed variant set ─────────────────────────────────────

/// The configured filter, chosen once at startup.
#[derive(Debug, Clone)]
pub enum Smoother {
    Passthrough(Passthrough),
    Kalman(KalmanFilter),
    Kde(KdeFilter),
    Ema(EmaFilter),
}

impl Smoother {
    pub fn build(kind: FilterKind, params: &FilterParams) -> Result<Self, FilterError> {
        let smoother = match kind {
            FilterKind::None => Self::Passthrough(Passthrough),
            FilterKind::Kalman => Self::Kalman(KalmanFilter::new(
                params.process_variance,
                KalmanTuning::new(params.measurement_variance_x, params.measurement_variance_y)?,
            )?),
            FilterKind::Kde => Self::Kde(KdeFilter::new(
                params.kde_window,
                params.kde_bandwidth_px,
                params.kde_iterations,
            )?),
            FilterKind::Ema => Self::Ema(EmaFilter::new(params.ema_alpha)?),
        };
        debug!(filter = kind.as_str(), "Smoothing filter built");
        Ok(smoother)
    }

    pub fn kind(&self) -> FilterKind {
        match self {
            Self::Passthrough(_) => FilterKind::None,
            Self::Kalman(_) => FilterKind::Kalman,
            Self::Kde(_) => FilterKind::Kde,
            Self::Ema(_) => FilterKind::Ema,
        }
    }

    /// Apply calibration tuning. Returns false for variance-insensitive filters.
    pub fn apply_tuning(&mut self, tuning: KalmanTuning) -> bool {
        match self {
            Self::Kalman(k) => {
                k.apply_tuning(tuning);
                true
            }
            _ => false,
        }
    }
}

impl SmoothingFilter for Smoother {
    fn step(&mut self, raw: GazePoint) -> GazePoint {
        match self {
            Self::Passthrough(f) => f.step(raw),
            Self::Kalman(f) => f.step(raw),
            Self::Kde(f) => f.step(raw),
            Self::Ema(f) => f.step(raw),
        }
    }

    fn reset(&mut self) {
        match self {
            Self::Passthrough(f) => f.reset(),
            Self::Kalman(f) => f.reset(),
            Self::Kde(f) => f.reset(),
            Self::Ema(f) => f.reset(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_kind_roundtrip() {
        for kind in [FilterKind::None, FilterKind::Kalman, FilterKind::Kde, FilterKind::Ema] {
            assert_eq!(FilterKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(FilterKind::from_str("median"), None);
        assert!(FilterKind::Kalman.is_variance_sensitive());
        assert!(!FilterKind::Kde.is_variance_sensitive());
    }

    #[test]
    fn test_passthrough_is_identity() {
        let mut f = Smoother::build(FilterKind::None, &FilterParams::default()).unwrap();
        for p in [GazePoint::new(1.0, 2.0), GazePoint::new(-5.0, 1e6)] {
            assert_eq!(f.step(p), p);
        }
    }

    #[test]
    fn test_build_every_variant() {
        let params = FilterParams::default();
        for kind in [FilterKind::None, FilterKind::Kalman, FilterKind::Kde, FilterKind::Ema] {
            let f = Smoother::build(kind, &params).unwrap();
            assert_eq!(f.kind(), kind);
        }
    }

    #[test]
    fn test_degenerate_params_rejected() {
        let params = FilterParams {
            measurement_variance_x: 0.0,
            ..FilterParams::default()
        };
        assert!(matches!(
            Smoother::build(FilterKind::Kalman, &params),
            Err(FilterError::DegenerateFilterConfig(_))
        ));
        // the same params are fine for a filter that ignores variance
        assert!(Smoother::build(FilterKind::Ema, &params).is_ok());
    }

    #[test]
    fn test_apply_tuning_only_for_kalman() {
        let tuning = KalmanTuning::new(10.0, 20.0).unwrap();
        let mut ema = Smoother::build(FilterKind::Ema, &FilterParams::default()).unwrap();
        assert!(!ema.apply_tuning(tuning));
        let mut kalman = Smoother::build(FilterKind::Kalman, &FilterParams::default()).unwrap();
        assert!(kalman.apply_tuning(tuning));
    }
}
