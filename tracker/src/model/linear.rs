//! Penalized linear regression: ridge (closed form) and elastic net
//! (coordinate descent). Both fit on standardized features and share the
//! same fitted representation.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::scaler::StandardScaler;
use super::{ModelParams, Regressor, TrainingSet};
use crate::error::TrainingFailure;

/// Linear map from standardized features to (x, y).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearModel {
    scaler: StandardScaler,
    coef_x: Vec<f64>,
    coef_y: Vec<f64>,
    intercept: [f64; 2],
}

/// Standardized design matrix plus column scaler.
pub(super) fn design(set: &TrainingSet) -> (StandardScaler, DMatrix<f64>) {
    let scaler = StandardScaler::fit(set.rows());
    let mut z = DMatrix::zeros(set.len(), set.dim());
    for (i, row) in set.rows().iter().enumerate() {
        for (j, v) in scaler.transform(row).into_iter().enumerate() {
            z[(i, j)] = v;
        }
    }
    (scaler, z)
}

pub(super) fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn soft_threshold(value: f64, lambda: f64) -> f64 {
    if value > lambda {
        value - lambda
    } else if value < -lambda {
        value + lambda
    } else {
        0.0
    }
}

impl LinearModel {
    /// Closed-form ridge: (ZᵀZ + αI) w = Zᵀ(y − ȳ).
    pub fn fit_ridge(set: &TrainingSet, alpha: f64) -> Result<Self, TrainingFailure> {
        let (scaler, z) = design(set);
        let d = z.ncols();

        let gram = z.transpose() * &z + DMatrix::<f64>::identity(d, d) * alpha;
        let chol = gram.cholesky().ok_or(TrainingFailure::SingularMatrix)?;
        let pivots = chol.l().diagonal();
        let (lo, hi) = (pivots.min(), pivots.max());
        if !(lo * lo > 1e-12 * hi * hi) {
            return Err(TrainingFailure::SingularMatrix);
        }

        let mut coefs = [Vec::new(), Vec::new()];
        let mut intercept = [0.0; 2];
        for axis in 0..2 {
            let y = set.target_column(axis);
            let y_mean = mean(&y);
            let centered = DVector::from_iterator(y.len(), y.iter().map(|v| v - y_mean));
            let w = chol.solve(&(z.transpose() * centered));
            if w.iter().any(|v| !v.is_finite()) {
                return Err(TrainingFailure::NonFinite);
            }
            coefs[axis] = w.iter().copied().collect();
            intercept[axis] = y_mean;
        }

        debug!(alpha, dim = d, samples = set.len(), "Ridge solved");
        let [coef_x, coef_y] = coefs;
        Ok(Self {
            scaler,
            coef_x,
            coef_y,
            intercept,
        })
    }

    /// Elastic net via cyclic coordinate descent on
    /// (1/2n)‖y − Zw‖² + α(ρ‖w‖₁ + (1−ρ)/2 ‖w‖²).
    pub fn fit_elastic_net(set: &TrainingSet, params: &ModelParams) -> Result<Self, TrainingFailure> {
        let (scaler, z) = design(set);
        let n = z.nrows() as f64;
        let d = z.ncols();
        let alpha = params.elastic_alpha;
        let rho = params.l1_ratio.clamp(0.0, 1.0);

        let col_sq: Vec<f64> = (0..d).map(|j| z.column(j).norm_squared() / n).collect();

        let mut coefs = [vec![0.0; d], vec![0.0; d]];
        let mut intercept = [0.0; 2];
        for axis in 0..2 {
            let y = set.target_column(axis);
            let y_mean = mean(&y);
            let mut residual = DVector::from_iterator(y.len(), y.iter().map(|v| v - y_mean));
            let w = &mut coefs[axis];

            let mut converged = false;
            for _ in 0..params.max_iter {
                let mut max_delta = 0.0f64;
                for j in 0..d {
                    let denom = col_sq[j] + alpha * (1.0 - rho);
                    if col_sq[j] == 0.0 || denom <= 0.0 {
                        continue;
                    }
                    let col = z.column(j);
                    let partial = col.dot(&residual) / n + col_sq[j] * w[j];
                    let updated = soft_threshold(partial, alpha * rho) / denom;
                    let delta = updated - w[j];
                    if delta != 0.0 {
                        residual.axpy(-delta, &col, 1.0);
                        w[j] = updated;
                    }
                    max_delta = max_delta.max(delta.abs());
                }
                if !max_delta.is_finite() {
                    return Err(TrainingFailure::NonFinite);
                }
                if max_delta < params.tol {
                    converged = true;
                    break;
                }
            }
            if !converged {
                warn!(
                    axis,
                    max_iter = params.max_iter,
                    "Elastic net did not reach tolerance; using last iterate"
                );
            }
            intercept[axis] = y_mean;
        }

        let [coef_x, coef_y] = coefs;
        Ok(Self {
            scaler,
            coef_x,
            coef_y,
            intercept,
        })
    }

    /// Number of coefficients that are exactly zero (elastic-net sparsity).
    pub fn zero_coefficients(&self) -> usize {
        self.coef_x
            .iter()
            .zip(&self.coef_y)
            .filter(|(a, b)| **a == 0.0 && **b == 0.0)
            .count()
    }
}

impl Regressor for LinearModel {
    fn fit(set: &TrainingSet, params: &ModelParams) -> Result<Self, TrainingFailure> {
        Self::fit_ridge(set, params.ridge_alpha)
    }

    fn predict_row(&self, row: &[f64]) -> [f64; 2] {
        let z = self.scaler.transform(row);
        let dot = |coef: &[f64]| coef.iter().zip(&z).map(|(c, v)| c * v).sum::<f64>();
        [
            self.intercept[0] + dot(&self.coef_x),
            self.intercept[1] + dot(&self.coef_y),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::linear_set;

    #[test]
    fn test_ridge_recovers_linear_map() {
        let set = linear_set(5);
        let model = LinearModel::fit_ridge(&set, 1e-6).unwrap();
        for (row, target) in set.rows().iter().zip(set.targets()) {
            let [x, y] = model.predict_row(row);
            assert!((x - target[0]).abs() < 0.5, "x {} vs {}", x, target[0]);
            assert!((y - target[1]).abs() < 0.5, "y {} vs {}", y, target[1]);
        }
    }

    #[test]
    fn test_ridge_without_penalty_on_collinear_columns_is_singular() {
        // second column duplicates the first
        let rows = vec![vec![1.0, 1.0], vec![2.0, 2.0], vec![3.0, 3.0]];
        let set = TrainingSet::new(rows, vec![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0]]).unwrap();
        let err = LinearModel::fit_ridge(&set, 0.0).unwrap_err();
        assert_eq!(err, TrainingFailure::SingularMatrix);
        // the penalty makes the same system solvable
        assert!(LinearModel::fit_ridge(&set, 1.0).is_ok());
    }

    #[test]
    fn test_penalty_shrinks_towards_mean() {
        let set = linear_set(4);
        let loose = LinearModel::fit_ridge(&set, 1e-6).unwrap();
        let tight = LinearModel::fit_ridge(&set, 1e6).unwrap();
        let row = &set.rows()[0];
        let mean_x = set.target_column(0).iter().sum::<f64>() / set.len() as f64;
        let loose_gap = (loose.predict_row(row)[0] - mean_x).abs();
        let tight_gap = (tight.predict_row(row)[0] - mean_x).abs();
        assert!(tight_gap < loose_gap);
    }

    #[test]
    fn test_elastic_net_fits_and_sparsifies() {
        let set = linear_set(5);
        let params = ModelParams {
            elastic_alpha: 0.5,
            l1_ratio: 0.9,
            ..ModelParams::default()
        };
        let model = LinearModel::fit_elastic_net(&set, &params).unwrap();
        let mut sq = 0.0;
        for (row, target) in set.rows().iter().zip(set.targets()) {
            let [x, y] = model.predict_row(row);
            sq += (x - target[0]).powi(2) + (y - target[1]).powi(2);
        }
        let rmse = (sq / set.len() as f64).sqrt();
        assert!(rmse < 20.0, "rmse {rmse}");
        // the constant roll column carries no signal
        assert!(model.zero_coefficients() >= 1);
    }

    #[test]
    fn test_soft_threshold() {
        assert_eq!(soft_threshold(3.0, 1.0), 2.0);
        assert_eq!(soft_threshold(-3.0, 1.0), -2.0);
        assert_eq!(soft_threshold(0.5, 1.0), 0.0);
    }
}
