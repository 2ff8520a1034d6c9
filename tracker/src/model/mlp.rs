//! Small feed-forward network: one tanh hidden layer, linear output.
//!
//! Trained full-batch with Adam on standardized features and targets.
//! Initialization is seeded so identical inputs give identical models.

use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::linear::design;
use super::scaler::StandardScaler;
use super::{ModelParams, Regressor, TrainingSet};
use crate::error::TrainingFailure;

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const ADAM_EPS: f64 = 1e-8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlpModel {
    scaler: StandardScaler,
    target_scaler: StandardScaler,
    /// hidden × input
    w1: DMatrix<f64>,
    /// 1 × hidden
    b1: DMatrix<f64>,
    /// 2 × hidden
    w2: DMatrix<f64>,
    /// 1 × 2
    b2: DMatrix<f64>,
    final_loss: f64,
}

fn xavier(rng: &mut StdRng, rows: usize, cols: usize) -> DMatrix<f64> {
    let limit = (6.0 / (rows + cols) as f64).sqrt();
    DMatrix::from_fn(rows, cols, |_, _| rng.gen_range(-limit..limit))
}

/// Add a 1 × k bias row to every row of an n × k matrix.
fn add_bias(m: &mut DMatrix<f64>, bias: &DMatrix<f64>) {
    for i in 0..m.nrows() {
        for j in 0..m.ncols() {
            m[(i, j)] += bias[(0, j)];
        }
    }
}

fn column_sums(m: &DMatrix<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(1, m.ncols(), |_, j| m.column(j).sum())
}

/// Adam moment buffers for one parameter matrix.
struct Moments {
    m: DMatrix<f64>,
    v: DMatrix<f64>,
}

impl Moments {
    fn like(p: &DMatrix<f64>) -> Self {
        Self {
            m: DMatrix::zeros(p.nrows(), p.ncols()),
            v: DMatrix::zeros(p.nrows(), p.ncols()),
        }
    }

    fn step(&mut self, param: &mut DMatrix<f64>, grad: &DMatrix<f64>, lr: f64, t: i32) {
        let c1 = 1.0 - BETA1.powi(t);
        let c2 = 1.0 - BETA2.powi(t);
        for k in 0..param.len() {
            let g = grad[k];
            self.m[k] = BETA1 * self.m[k] + (1.0 - BETA1) * g;
            self.v[k] = BETA2 * self.v[k] + (1.0 - BETA2) * g * g;
            let m_hat = self.m[k] / c1;
            let v_hat = self.v[k] / c2;
            param[k] -= lr * m_hat / (v_hat.sqrt() + ADAM_EPS);
        }
    }
}

impl MlpModel {
    fn hidden(&self, z: &DMatrix<f64>) -> DMatrix<f64> {
        let mut a = z * self.w1.transpose();
        add_bias(&mut a, &self.b1);
        a.map(f64::tanh)
    }

    fn output(&self, h: &DMatrix<f64>) -> DMatrix<f64> {
        let mut o = h * self.w2.transpose();
        add_bias(&mut o, &self.b2);
        o
    }

    /// Mean squared error on standardized targets at the end of training.
    pub fn final_loss(&self) -> f64 {
        self.final_loss
    }
}

impl Regressor for MlpModel {
    fn fit(set: &TrainingSet, params: &ModelParams) -> Result<Self, TrainingFailure> {
        let (scaler, z) = design(set);
        let n = z.nrows();
        let hidden = params.mlp_hidden.max(1);

        let targets: Vec<Vec<f64>> = set.targets().iter().map(|t| t.to_vec()).collect();
        let target_scaler = StandardScaler::fit(&targets);
        let y = DMatrix::from_fn(n, 2, |i, j| target_scaler.transform(&targets[i])[j]);

        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut model = Self {
            scaler,
            target_scaler,
            w1: xavier(&mut rng, hidden, z.ncols()),
            b1: DMatrix::zeros(1, hidden),
            w2: xavier(&mut rng, 2, hidden),
            b2: DMatrix::zeros(1, 2),
            final_loss: f64::NAN,
        };

        let mut mw1 = Moments::like(&model.w1);
        let mut mb1 = Moments::like(&model.b1);
        let mut mw2 = Moments::like(&model.w2);
        let mut mb2 = Moments::like(&model.b2);
        let lr = params.mlp_learning_rate;
        let decay = params.mlp_weight_decay;
        let inv_n = 1.0 / n as f64;

        let mut loss = f64::NAN;
        for epoch in 1..=params.mlp_epochs.max(1) {
            let h = model.hidden(&z);
            let out = model.output(&h);
            let err = &out - &y;
            loss = err.norm_squared() * inv_n;
            if !loss.is_finite() {
                return Err(TrainingFailure::NonFinite);
            }

            let d_out = &err * inv_n;
            let g_w2 = d_out.transpose() * &h + &model.w2 * decay;
            let g_b2 = column_sums(&d_out);
            let d_hidden = (&d_out * &model.w2).component_mul(&h.map(|v| 1.0 - v * v));
            let g_w1 = d_hidden.transpose() * &z + &model.w1 * decay;
            let g_b1 = column_sums(&d_hidden);

            let t = i32::try_from(epoch).unwrap_or(i32::MAX);
            mw1.step(&mut model.w1, &g_w1, lr, t);
            mb1.step(&mut model.b1, &g_b1, lr, t);
            mw2.step(&mut model.w2, &g_w2, lr, t);
            mb2.step(&mut model.b2, &g_b2, lr, t);
        }

        debug!(hidden, epochs = params.mlp_epochs, loss, "MLP trained");
        model.final_loss = loss;
        Ok(model)
    }

    fn predict_row(&self, row: &[f64]) -> [f64; 2] {
        let z = DMatrix::from_row_slice(1, row.len(), &self.scaler.transform(row));
        let out = self.output(&self.hidden(&z));
        [
            self.target_scaler.inverse_column(0, out[(0, 0)]),
            self.target_scaler.inverse_column(1, out[(0, 1)]),
        ]
    }
}
