//! Exponential moving average smoothing.

use crate::error::FilterError;
use crate::screen::GazePoint;

use super::SmoothingFilter;

#[derive(Debug, Clone)]
pub struct EmaFilter {
    /// Weight of the newest observation: 1 = no smoothing.
    alpha: f64,
    last: Option<GazePoint>,
}

impl EmaFilter {
    pub fn new(alpha: f64) -> Result<Self, FilterError> {
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(FilterError::DegenerateFilterConfig(format!(
                "ema_alpha must be in (0, 1], got {alpha}"
            )));
        }
        Ok(Self { alpha, last: None })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}

impl SmoothingFilter for EmaFilter {
    fn step(&mut self, raw: GazePoint) -> GazePoint {
        let smoothed = match self.last {
            Some(last) => GazePoint::new(
                last.x + self.alpha * (raw.x - last.x),
                last.y + self.alpha * (raw.y - last.y),
            ),
            None => raw,
        };
        self.last = Some(smoothed);
        smoothed
    }

    fn reset(&mut self) {
        self.last = None;
    }
}
