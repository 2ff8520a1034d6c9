//! Constant-velocity Kalman filter over screen coordinates.
//!
//! State vector: [x, y, vx, vy]ᵀ, one step per frame (dt = 1 frame).
//! Measurement noise comes from calibration tuning; process noise from
//! configuration.

use nalgebra::{SMatrix, SVector};
use serde::{Deserialize, Serialize};

use crate::error::FilterError;
use crate::screen::GazePoint;

use super::SmoothingFilter;

type State = SVector<f64, 4>;
type Matrix4 = SMatrix<f64, 4, 4>;
type Matrix2x4 = SMatrix<f64, 2, 4>;
type Matrix2 = SMatrix<f64, 2, 2>;

fn check_variance(name: &str, value: f64) -> Result<f64, FilterError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(FilterError::DegenerateFilterConfig(format!(
            "{name} must be positive and finite, got {value}"
        )))
    }
}

/// Per-axis measurement variance (px²) measured during calibration tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KalmanTuning {
    variance_x: f64,
    variance_y: f64,
}

impl KalmanTuning {
    /// Rejects zero, negative and non-finite variances.
    pub fn new(variance_x: f64, variance_y: f64) -> Result<Self, FilterError> {
        Ok(Self {
            variance_x: check_variance("variance_x", variance_x)?,
            variance_y: check_variance("variance_y", variance_y)?,
        })
    }

    pub fn variance_x(&self) -> f64 {
        self.variance_x
    }

    pub fn variance_y(&self) -> f64 {
        self.variance_y
    }
}

#[derive(Debug, Clone)]
pub struct KalmanFilter {
    state: State,
    covariance: Matrix4,
    process_noise: Matrix4,
    measurement_noise: Matrix2,
    initialized: bool,
}

impl KalmanFilter {
    pub fn new(process_variance: f64, tuning: KalmanTuning) -> Result<Self, FilterError> {
        let q = check_variance("process_variance", process_variance)?;
        let mut filter = Self {
            state: State::zeros(),
            covariance: Matrix4::identity(),
            process_noise: Matrix4::identity() * q,
            measurement_noise: Matrix2::identity(),
            initialized: false,
        };
        filter.apply_tuning(tuning);
        Ok(filter)
    }

    /// Replace the measurement noise. State is kept.
    pub fn apply_tuning(&mut self, tuning: KalmanTuning) {
        self.measurement_noise = Matrix2::new(tuning.variance_x, 0.0, 0.0, tuning.variance_y);
    }

    pub fn measurement_variance(&self) -> (f64, f64) {
        (self.measurement_noise[(0, 0)], self.measurement_noise[(1, 1)])
    }

    /// Estimated velocity in px per frame.
    pub fn velocity(&self) -> (f64, f64) {
        (self.state[2], self.state[3])
    }

    /// ```text
    /// | 1 0 1 0 |
    /// | 0 1 0 1 |
    /// | 0 0 1 0 |
    /// | 0 0 0 1 |
    /// ```
    fn transition() -> Matrix4 {
        Matrix4::new(
            1.0, 0.0, 1.0, 0.0,
            0.0, 1.0, 0.0, 1.0,
            0.0, 0.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        )
    }

    fn observation() -> Matrix2x4 {
        Matrix2x4::new(
            1.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
        )
    }

    fn initialize(&mut self, raw: GazePoint) {
        self.state = State::new(raw.x, raw.y, 0.0, 0.0);
        let (vx, vy) = self.measurement_variance();
        self.covariance = Matrix4::from_diagonal(&State::new(vx, vy, vx, vy));
        self.initialized = true;
    }
}

impl SmoothingFilter for KalmanFilter {
    fn step(&mut self, raw: GazePoint) -> GazePoint {
        if !self.initialized {
            self.initialize(raw);
            return raw;
        }

        let f = Self::transition();
        self.state = f * self.state;
        self.covariance = f * self.covariance * f.transpose() + self.process_noise;

        let h = Self::observation();
        let innovation = SVector::<f64, 2>::new(raw.x, raw.y) - h * self.state;
        let s = h * self.covariance * h.transpose() + self.measurement_noise;
        // S is positive definite while R is; skip the correction otherwise
        if let Some(s_inv) = s.try_inverse() {
            let gain = self.covariance * h.transpose() * s_inv;
            self.state += gain * innovation;
            self.covariance = (Matrix4::identity() - gain * h) * self.covariance;
        }

        GazePoint::new(self.state[0], self.state[1])
    }

    fn reset(&mut self) {
        self.state = State::zeros();
        self.covariance = Matrix4::identity();
        self.initialized = false;
    }
}
