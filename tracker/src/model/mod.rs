//! Regression models: feature vector → raw screen coordinate.
//!
//! The variant set is closed (`ModelKind`) and chosen once from
//! configuration. Every variant implements `Regressor`; `TrainedModel`
//! wraps the fitted parameters together with the variant tag and the screen
//! it was calibrated against, and is what gets persisted.

pub mod linear;
pub mod mlp;
pub mod scaler;
pub mod svr;

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::TrainingFailure;
use crate::features::{FeatureSample, FeatureVector};
use crate::screen::{GazePoint, ScreenSize};

pub use linear::LinearModel;
pub use mlp::MlpModel;
pub use svr::SvrModel;

/// Fewest samples any variant will fit on.
pub const MIN_TRAINING_SAMPLES: usize = 2;

// ── Variant selection ──────────────────────────────────────

/// Which regression variant to fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
    /// Linear with L2 penalty. Cheapest to fit and evaluate.
    #[default]
    Ridge,
    /// Linear with mixed L1/L2 penalty.
    ElasticNet,
    /// RBF-kernel epsilon support-vector regression.
    Svr,
    /// Single-hidden-layer feed-forward network.
    Mlp,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ridge => "ridge",
            Self::ElasticNet => "elastic-net",
            Self::Svr => "svr",
            Self::Mlp => "mlp",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ridge" => Some(Self::Ridge),
            "elastic-net" | "elastic_net" | "elasticnet" => Some(Self::ElasticNet),
            "svr" => Some(Self::Svr),
            "mlp" => Some(Self::Mlp),
            _ => None,
        }
    }
}

/// Hyperparameters for all variants. Only the fields of the selected
/// variant are read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParams {
    /// L2 penalty for ridge.
    pub ridge_alpha: f64,
    /// Overall penalty strength for elastic net.
    pub elastic_alpha: f64,
    /// L1 share of the elastic-net penalty (0 = ridge, 1 = lasso).
    pub l1_ratio: f64,
    /// Iteration cap for coordinate-descent solvers.
    pub max_iter: usize,
    /// Convergence tolerance on the largest coefficient change.
    pub tol: f64,
    /// SVR box constraint.
    pub svr_c: f64,
    /// SVR insensitive-tube half width, in standardized target units.
    pub svr_epsilon: f64,
    /// RBF width; `None` uses 1 / feature count.
    pub svr_gamma: Option<f64>,
    pub mlp_hidden: usize,
    pub mlp_epochs: usize,
    pub mlp_learning_rate: f64,
    /// L2 weight decay for the network.
    pub mlp_weight_decay: f64,
    /// Seed for network initialization.
    pub seed: u64,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            ridge_alpha: 1.0,
            elastic_alpha: 1.0,
            l1_ratio: 0.5,
            max_iter: 1000,
            tol: 1e-6,
            svr_c: 10.0,
            svr_epsilon: 0.05,
            svr_gamma: None,
            mlp_hidden: 16,
            mlp_epochs: 800,
            mlp_learning_rate: 0.01,
            mlp_weight_decay: 1e-4,
            seed: 42,
        }
    }
}

/// `[model]` section: which variant and its hyperparameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub kind: ModelKind,
    pub params: ModelParams,
}

// ── Training data ──────────────────────────────────────────

/// Validated (features, target) pairs.
#[derive(Debug, Clone)]
pub struct TrainingSet {
    rows: Vec<Vec<f64>>,
    targets: Vec<[f64; 2]>,
}

impl TrainingSet {
    pub fn new(rows: Vec<Vec<f64>>, targets: Vec<[f64; 2]>) -> Result<Self, TrainingFailure> {
        if rows.len() != targets.len() {
            return Err(TrainingFailure::DimensionMismatch {
                expected: rows.len(),
                got: targets.len(),
            });
        }
        if rows.len() < MIN_TRAINING_SAMPLES {
            return Err(TrainingFailure::TooFewSamples {
                got: rows.len(),
                need: MIN_TRAINING_SAMPLES,
            });
        }
        let dim = rows[0].len();
        if dim == 0 {
            return Err(TrainingFailure::DimensionMismatch {
                expected: 1,
                got: 0,
            });
        }
        if let Some(bad) = rows.iter().find(|r| r.len() != dim) {
            return Err(TrainingFailure::DimensionMismatch {
                expected: dim,
                got: bad.len(),
            });
        }
        let finite = rows.iter().flatten().all(|v| v.is_finite())
            && targets.iter().flatten().all(|v| v.is_finite());
        if !finite {
            return Err(TrainingFailure::NonFinite);
        }
        Ok(Self { rows, targets })
    }

    /// Flatten calibration samples into design rows. Head pose is included.
    pub fn from_samples<'a, I>(samples: I) -> Result<Self, TrainingFailure>
    where
        I: IntoIterator<Item = &'a FeatureSample>,
    {
        let (rows, targets) = samples
            .into_iter()
            .map(|s| (s.features.as_row(), [s.target.x, s.target.y]))
            .unzip();
        Self::new(rows, targets)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.rows[0].len()
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn targets(&self) -> &[[f64; 2]] {
        &self.targets
    }

    /// Target column `axis` (0 = x, 1 = y).
    pub fn target_column(&self, axis: usize) -> Vec<f64> {
        self.targets.iter().map(|t| t[axis]).collect()
    }
}

// ── Common contract ────────────────────────────────────────

/// Shared fit/predict contract of every variant.
pub trait Regressor: Sized {
    fn fit(set: &TrainingSet, params: &ModelParams) -> Result<Self, TrainingFailure>;

    /// Pure function of the fitted parameters. `row` has the training width.
    fn predict_row(&self, row: &[f64]) -> [f64; 2];
}

/// Fitted parameters, tagged by variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "kebab-case")]
pub enum FittedModel {
    Ridge(LinearModel),
    ElasticNet(LinearModel),
    Svr(SvrModel),
    Mlp(MlpModel),
}

impl FittedModel {
    pub fn fit(
        kind: ModelKind,
        set: &TrainingSet,
        params: &ModelParams,
    ) -> Result<Self, TrainingFailure> {
        Ok(match kind {
            ModelKind::Ridge => Self::Ridge(LinearModel::fit_ridge(set, params.ridge_alpha)?),
            ModelKind::ElasticNet => Self::ElasticNet(LinearModel::fit_elastic_net(set, params)?),
            ModelKind::Svr => Self::Svr(SvrModel::fit(set, params)?),
            ModelKind::Mlp => Self::Mlp(MlpModel::fit(set, params)?),
        })
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            Self::Ridge(_) => ModelKind::Ridge,
            Self::ElasticNet(_) => ModelKind::ElasticNet,
            Self::Svr(_) => ModelKind::Svr,
            Self::Mlp(_) => ModelKind::Mlp,
        }
    }

    fn predict_row(&self, row: &[f64]) -> [f64; 2] {
        match self {
            Self::Ridge(m) | Self::ElasticNet(m) => m.predict_row(row),
            Self::Svr(m) => m.predict_row(row),
            Self::Mlp(m) => m.predict_row(row),
        }
    }
}

// ── Trained model ──────────────────────────────────────────

/// A fitted model for one user, replaced wholesale on recalibration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    feature_dim: usize,
    screen: ScreenSize,
    sample_count: usize,
    /// Root-mean-square training error in pixels.
    training_rmse: f64,
    fitted: FittedModel,
}

impl TrainedModel {
    /// Fit `kind` on `set`.
    pub fn train(
        kind: ModelKind,
        set: &TrainingSet,
        params: &ModelParams,
        screen: ScreenSize,
    ) -> Result<Self, TrainingFailure> {
        let fitted = FittedModel::fit(kind, set, params)?;

        let mut sq = 0.0;
        for (row, target) in set.rows().iter().zip(set.targets()) {
            let [px, py] = fitted.predict_row(row);
            if !px.is_finite() || !py.is_finite() {
                return Err(TrainingFailure::NonFinite);
            }
            sq += (px - target[0]).powi(2) + (py - target[1]).powi(2);
        }
        let training_rmse = (sq / set.len() as f64).sqrt();

        info!(
            model = kind.as_str(),
            samples = set.len(),
            dim = set.dim(),
            rmse_px = training_rmse,
            "Regression model trained"
        );

        Ok(Self {
            feature_dim: set.dim(),
            screen,
            sample_count: set.len(),
            training_rmse,
            fitted,
        })
    }

    pub fn kind(&self) -> ModelKind {
        self.fitted.kind()
    }

    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    pub fn screen(&self) -> ScreenSize {
        self.screen
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn training_rmse(&self) -> f64 {
        self.training_rmse
    }

    /// Raw screen estimate, or `None` when the vector does not match the
    /// trained feature width or is not finite.
    pub fn predict(&self, features: &FeatureVector) -> Option<GazePoint> {
        if features.len() != self.feature_dim || !features.is_finite() {
            return None;
        }
        let [x, y] = self.fitted.predict_row(&features.as_row());
        let point = GazePoint::new(x, y);
        point.is_finite().then_some(point)
    }

    /// Write the model as JSON.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("serializing model")?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), model = self.kind().as_str(), "Model saved");
        Ok(())
    }

    /// Read a model written by `save`. Screen compatibility is not checked.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let model: Self = serde_json::from_str(&json)
            .with_context(|| format!("parsing model {}", path.display()))?;
        info!(
            path = %path.display(),
            model = model.kind().as_str(),
            screen = %model.screen,
            "Model loaded"
        );
        Ok(model)
    }
}
