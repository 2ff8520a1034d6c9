//! Calibration point layouts.
//!
//! Grid layouts sit on a 3×3 lattice inset from the screen edges. The bottom
//! inset is larger than the others so the lowest row clears task bars.

use serde::{Deserialize, Serialize};

use crate::error::CalibrationError;
use crate::screen::{GazePoint, ScreenSize};

/// Bottom inset as a fraction of screen height.
const BOTTOM_MARGIN_RATIO: f64 = 0.15;

/// Five-point visiting order as (row, col): center first, then corners.
const FIVE_POINT_ORDER: [(u32, u32); 5] = [(1, 1), (0, 0), (2, 0), (0, 2), (2, 2)];

/// Nine-point visiting order as (row, col): center first, then column-major.
const NINE_POINT_ORDER: [(u32, u32); 9] = [
    (1, 1),
    (0, 0),
    (0, 1),
    (0, 2),
    (1, 0),
    (1, 2),
    (2, 0),
    (2, 1),
    (2, 2),
];

/// Held-out tuning positions as fractions of the screen.
const TUNING_POSITIONS: [(f64, f64); 4] = [(0.25, 0.25), (0.75, 0.25), (0.5, 0.75), (0.25, 0.75)];

/// Which points a calibration session visits.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PointLayout {
    #[default]
    Five,
    Nine,
    /// Caller-supplied targets, visited in the given order.
    Custom(Vec<GazePoint>),
}

impl PointLayout {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Five => "five",
            Self::Nine => "nine",
            Self::Custom(_) => "custom",
        }
    }

    /// Grid layouts by name. Custom layouts come from config only.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "five" | "5" | "five-point" => Some(Self::Five),
            "nine" | "9" | "nine-point" => Some(Self::Nine),
            _ => None,
        }
    }

    /// Resolve to the ordered point sequence for `screen`.
    pub fn points(
        &self,
        screen: ScreenSize,
        margin_ratio: f64,
    ) -> Result<Vec<CalibrationPoint>, CalibrationError> {
        let targets: Vec<GazePoint> = match self {
            Self::Five => grid_points(screen, margin_ratio, &FIVE_POINT_ORDER),
            Self::Nine => grid_points(screen, margin_ratio, &NINE_POINT_ORDER),
            Self::Custom(points) => {
                if let Some(bad) = points.iter().find(|p| !p.is_finite() || !screen.contains(**p)) {
                    return Err(CalibrationError::InvalidLayout(format!(
                        "point ({}, {}) is outside the {screen} screen",
                        bad.x, bad.y
                    )));
                }
                points.clone()
            }
        };
        if targets.len() < 2 {
            return Err(CalibrationError::InvalidLayout(format!(
                "need at least 2 points, got {}",
                targets.len()
            )));
        }
        Ok(number(targets))
    }
}

fn grid_points(screen: ScreenSize, margin_ratio: f64, order: &[(u32, u32)]) -> Vec<GazePoint> {
    let (w, h) = (screen.width as f64, screen.height as f64);
    let mx = (w * margin_ratio).floor();
    let my_top = (h * margin_ratio).floor();
    let my_bottom = (h * BOTTOM_MARGIN_RATIO).floor();
    let max_r = order.iter().map(|(r, _)| *r).max().unwrap_or(0);
    let max_c = order.iter().map(|(_, c)| *c).max().unwrap_or(0);
    let step_x = if max_c == 0 { 0.0 } else { (w - 2.0 * mx) / max_c as f64 };
    let step_y = if max_r == 0 { 0.0 } else { (h - my_top - my_bottom) / max_r as f64 };
    order
        .iter()
        .map(|&(r, c)| {
            GazePoint::new(
                mx + (c as f64 * step_x).floor(),
                my_top + (r as f64 * step_y).floor(),
            )
        })
        .collect()
}

/// Held-out tuning targets, at most four.
pub fn tuning_points(screen: ScreenSize, count: usize) -> Vec<CalibrationPoint> {
    let targets = TUNING_POSITIONS
        .iter()
        .take(count)
        .map(|(fx, fy)| GazePoint::new((screen.width as f64 * fx).floor(), (screen.height as f64 * fy).floor()))
        .collect();
    number(targets)
}

fn number(targets: Vec<GazePoint>) -> Vec<CalibrationPoint> {
    let total = targets.len();
    targets
        .into_iter()
        .enumerate()
        .map(|(index, target)| CalibrationPoint {
            index,
            total,
            target,
        })
        .collect()
}

/// One target in a session's ordered sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CalibrationPoint {
    pub index: usize,
    pub total: usize,
    pub target: GazePoint,
}
