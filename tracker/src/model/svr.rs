//! RBF-kernel epsilon support-vector regression.
//!
//! Solved per output axis by dual coordinate descent. The bias is folded
//! into the kernel (K + 1), which removes the equality constraint and leaves
//! a box-constrained problem in β ∈ [−C, C]:
//!
//! ```text
//! min ½ βᵀKβ − yᵀβ + ε‖β‖₁
//! ```
//!
//! Features and targets are standardized; only rows with a non-zero
//! coefficient on either axis are kept as support vectors.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::linear::design;
use super::scaler::StandardScaler;
use super::{ModelParams, Regressor, TrainingSet};
use crate::error::TrainingFailure;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvrModel {
    scaler: StandardScaler,
    target_scaler: StandardScaler,
    gamma: f64,
    support: Vec<Vec<f64>>,
    beta_x: Vec<f64>,
    beta_y: Vec<f64>,
}

fn rbf(gamma: f64, a: &[f64], b: &[f64]) -> f64 {
    let dist: f64 = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum();
    (-gamma * dist).exp()
}

/// Box-constrained dual coordinate descent for one axis.
fn solve_dual(kernel: &DMatrix<f64>, y: &[f64], params: &ModelParams) -> Result<Vec<f64>, TrainingFailure> {
    let n = y.len();
    let c = params.svr_c;
    let eps = params.svr_epsilon;
    let mut beta = vec![0.0; n];
    // f = Kβ, maintained incrementally
    let mut f = vec![0.0; n];

    for _ in 0..params.max_iter {
        let mut max_delta = 0.0f64;
        for i in 0..n {
            let kii = kernel[(i, i)];
            let g = f[i] - y[i];
            let pre = kii * beta[i] - g;
            let shrunk = if pre > eps {
                pre - eps
            } else if pre < -eps {
                pre + eps
            } else {
                0.0
            };
            let updated = (shrunk / kii).clamp(-c, c);
            let delta = updated - beta[i];
            if delta != 0.0 {
                beta[i] = updated;
                for (k, fk) in f.iter_mut().enumerate() {
                    *fk += delta * kernel[(k, i)];
                }
            }
            max_delta = max_delta.max(delta.abs());
        }
        if !max_delta.is_finite() {
            return Err(TrainingFailure::NonFinite);
        }
        if max_delta < params.tol {
            return Ok(beta);
        }
    }
    warn!(max_iter = params.max_iter, "SVR dual did not reach tolerance; using last iterate");
    Ok(beta)
}

impl Regressor for SvrModel {
    fn fit(set: &TrainingSet, params: &ModelParams) -> Result<Self, TrainingFailure> {
        let (scaler, z) = design(set);
        let n = z.nrows();
        let gamma = params.svr_gamma.unwrap_or(1.0 / set.dim() as f64);

        let rows: Vec<Vec<f64>> = (0..n).map(|i| z.row(i).iter().copied().collect()).collect();
        let kernel = DMatrix::from_fn(n, n, |i, j| rbf(gamma, &rows[i], &rows[j]) + 1.0);

        let targets: Vec<Vec<f64>> = set.targets().iter().map(|t| t.to_vec()).collect();
        let target_scaler = StandardScaler::fit(&targets);
        let scaled: Vec<Vec<f64>> = targets.iter().map(|t| target_scaler.transform(t)).collect();
        let yx: Vec<f64> = scaled.iter().map(|t| t[0]).collect();
        let yy: Vec<f64> = scaled.iter().map(|t| t[1]).collect();

        let bx = solve_dual(&kernel, &yx, params)?;
        let by = solve_dual(&kernel, &yy, params)?;

        let mut support = Vec::new();
        let mut beta_x = Vec::new();
        let mut beta_y = Vec::new();
        for (i, row) in rows.into_iter().enumerate() {
            if bx[i] != 0.0 || by[i] != 0.0 {
                support.push(row);
                beta_x.push(bx[i]);
                beta_y.push(by[i]);
            }
        }
        debug!(support = support.len(), samples = n, gamma, "SVR fitted");

        Ok(Self {
            scaler,
            target_scaler,
            gamma,
            support,
            beta_x,
            beta_y,
        })
    }

    fn predict_row(&self, row: &[f64]) -> [f64; 2] {
        let z = self.scaler.transform(row);
        let mut acc = [0.0; 2];
        for ((sv, bx), by) in self.support.iter().zip(&self.beta_x).zip(&self.beta_y) {
            let k = rbf(self.gamma, &z, sv) + 1.0;
            acc[0] += bx * k;
            acc[1] += by * k;
        }
        [
            self.target_scaler.inverse_column(0, acc[0]),
            self.target_scaler.inverse_column(1, acc[1]),
        ]
    }
}

impl SvrModel {
    pub fn support_count(&self) -> usize {
        self.support.len()
    }
}
