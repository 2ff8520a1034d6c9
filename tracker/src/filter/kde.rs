//! Kernel density smoothing over a bounded window of recent raw points.
//!
//! Each step pushes the newest observation, then runs a few mean-shift
//! iterations from it toward the local density mode. Cost is
//! O(window × iterations) per step, independent of session length.

use std::collections::VecDeque;

use crate::error::FilterError;
use crate::screen::GazePoint;

use super::SmoothingFilter;

const MIN_BANDWIDTH_PX: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct KdeFilter {
    window: VecDeque<GazePoint>,
    capacity: usize,
    bandwidth_px: Option<f64>,
    iterations: usize,
}

impl KdeFilter {
    pub fn new(
        capacity: usize,
        bandwidth_px: Option<f64>,
        iterations: usize,
    ) -> Result<Self, FilterError> {
        if capacity == 0 {
            return Err(FilterError::DegenerateFilterConfig(
                "kde_window must be at least 1".into(),
            ));
        }
        if let Some(bw) = bandwidth_px {
            if !(bw.is_finite() && bw > 0.0) {
                return Err(FilterError::DegenerateFilterConfig(format!(
                    "kde_bandwidth_px must be positive and finite, got {bw}"
                )));
            }
        }
        Ok(Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            bandwidth_px,
            iterations,
        })
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Per-axis bandwidth: fixed, or Scott's rule σ·n^(-1/6) for 2-D data.
    fn bandwidth(&self) -> (f64, f64) {
        if let Some(bw) = self.bandwidth_px {
            return (bw, bw);
        }
        let n = self.window.len() as f64;
        let (mx, my) = self
            .window
            .iter()
            .fold((0.0, 0.0), |(ax, ay), p| (ax + p.x / n, ay + p.y / n));
        let (vx, vy) = self.window.iter().fold((0.0, 0.0), |(ax, ay), p| {
            (ax + (p.x - mx).powi(2) / n, ay + (p.y - my).powi(2) / n)
        });
        let factor = n.powf(-1.0 / 6.0);
        (
            (vx.sqrt() * factor).max(MIN_BANDWIDTH_PX),
            (vy.sqrt() * factor).max(MIN_BANDWIDTH_PX),
        )
    }
}

impl SmoothingFilter for KdeFilter {
    fn step(&mut self, raw: GazePoint) -> GazePoint {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(raw);
        if self.window.len() == 1 {
            return raw;
        }

        let (hx, hy) = self.bandwidth();
        let mut mode = raw;
        for _ in 0..self.iterations {
            let mut wsum = 0.0;
            let mut acc = (0.0, 0.0);
            for p in &self.window {
                let d2 = ((p.x - mode.x) / hx).powi(2) + ((p.y - mode.y) / hy).powi(2);
                let w = (-0.5 * d2).exp();
                wsum += w;
                acc.0 += w * p.x;
                acc.1 += w * p.y;
            }
            // the newest point always contributes, but it can underflow far out
            if wsum <= f64::MIN_POSITIVE {
                break;
            }
            mode = GazePoint::new(acc.0 / wsum, acc.1 / wsum);
        }
        mode
    }

    fn reset(&mut self) {
        self.window.clear();
    }
}
