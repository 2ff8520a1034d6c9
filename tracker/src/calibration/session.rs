//! Calibration session state machine.
//!
//! ```text
//! Idle → Presenting(i) → Capturing(i) → { Presenting(i+1) | Training }
//!      → Training → [Tuning] → Completed
//! ```
//!
//! `Error(kind)` is reachable from every state. A session is driven by a
//! single owner through `&mut self`.

use serde_json::json;
use tracing::{debug, info, warn};

use super::layout::{self, CalibrationPoint, PointLayout};
use super::{CalibrationConfig, CalibrationOutcome, CalibrationState, SampleOutcome};
use crate::error::{CalibrationError, CalibrationResult, ErrorKind};
use crate::features::{FeatureSample, FeatureVector};
use crate::filter::{FilterKind, KalmanTuning};
use crate::model::{ModelConfig, ModelKind, TrainedModel, TrainingSet};
use crate::screen::{GazePoint, ScreenSize};

pub struct CalibrationSession {
    config: CalibrationConfig,
    model: ModelConfig,
    filter: FilterKind,
    state: CalibrationState,
    screen: ScreenSize,
    points: Vec<CalibrationPoint>,
    buffers: Vec<Vec<FeatureSample>>,
    /// Failed attempts per point.
    failures: Vec<u32>,
    /// Row width fixed by the first accepted sample.
    feature_dim: Option<usize>,
    trained: Option<TrainedModel>,
    tuning_points: Vec<CalibrationPoint>,
    tuning_buffers: Vec<Vec<FeatureVector>>,
    tuning: Option<KalmanTuning>,
    last_error: Option<CalibrationError>,
}

impl CalibrationSession {
    pub fn new(config: CalibrationConfig, model: ModelConfig, filter: FilterKind) -> Self {
        Self {
            config,
            model,
            filter,
            state: CalibrationState::Idle,
            screen: ScreenSize::default(),
            points: Vec::new(),
            buffers: Vec::new(),
            failures: Vec::new(),
            feature_dim: None,
            trained: None,
            tuning_points: Vec::new(),
            tuning_buffers: Vec::new(),
            tuning: None,
            last_error: None,
        }
    }

    // ── Accessors ──────────────────────────────────────────

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    pub fn screen(&self) -> ScreenSize {
        self.screen
    }

    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }

    /// The target the user should be looking at, if any.
    pub fn current_point(&self) -> Option<&CalibrationPoint> {
        match self.state {
            CalibrationState::Presenting { point } | CalibrationState::Capturing { point } => {
                self.points.get(point)
            }
            CalibrationState::Tuning { point } => self.tuning_points.get(point),
            _ => None,
        }
    }

    /// Samples buffered for point `index`.
    pub fn samples_at(&self, index: usize) -> usize {
        self.buffers.get(index).map_or(0, Vec::len)
    }

    /// Fraction of calibration points finished, in [0, 1].
    pub fn progress(&self) -> f64 {
        match self.state {
            CalibrationState::Presenting { point } | CalibrationState::Capturing { point } => {
                point as f64 / self.points.len().max(1) as f64
            }
            CalibrationState::Training
            | CalibrationState::Tuning { .. }
            | CalibrationState::Completed => 1.0,
            CalibrationState::Idle | CalibrationState::Error { .. } => 0.0,
        }
    }

    pub fn last_error(&self) -> Option<&CalibrationError> {
        self.last_error.as_ref()
    }

    /// Snapshot for a calibration UI.
    pub fn status_json(&self) -> serde_json::Value {
        let current = self.current_point();
        let samples = current.map(|p| match self.state {
            CalibrationState::Tuning { .. } => self.tuning_buffers.get(p.index).map_or(0, Vec::len),
            _ => self.samples_at(p.index),
        });
        json!({
            "status": self.state,
            "progress": self.progress(),
            "total_points": self.points.len(),
            "current_point": current,
            "samples": samples,
            "model": self.model.kind.as_str(),
            "filter": self.filter.as_str(),
            "error": self.last_error.as_ref().map(|e| e.to_string()),
        })
    }

    // ── Transitions ────────────────────────────────────────

    /// Record `err`. Terminal errors move the session to `Error`; buffers are
    /// dropped unless training failed, so a caller can retry another variant.
    /// A session parked in `Error(TrainingFailed)` keeps its state and
    /// samples whatever else is called on it.
    fn fail(&mut self, err: CalibrationError) -> CalibrationError {
        if self.awaiting_retrain() {
            debug!(error = %err, "Rejected while awaiting retraining");
        } else if err.is_terminal() {
            warn!(state = %self.state, error = %err, "Calibration failed");
            self.state = CalibrationState::Error { kind: err.kind() };
            if err.kind() != ErrorKind::TrainingFailed {
                self.clear_buffers();
            }
        } else {
            debug!(error = %err, "Calibration input rejected");
        }
        self.last_error = Some(err.clone());
        err
    }

    fn awaiting_retrain(&self) -> bool {
        self.state
            == CalibrationState::Error {
                kind: ErrorKind::TrainingFailed,
            }
    }

    fn invalid(&mut self, op: &'static str) -> CalibrationError {
        let err = CalibrationError::InvalidState {
            op,
            state: self.state.to_string(),
        };
        self.fail(err)
    }

    fn clear_buffers(&mut self) {
        self.buffers.clear();
        self.failures.clear();
        self.feature_dim = None;
        self.trained = None;
        self.tuning_points.clear();
        self.tuning_buffers.clear();
        self.tuning = None;
    }

    /// Begin a new session. Any session in flight is discarded.
    pub fn start(
        &mut self,
        layout: &PointLayout,
        screen: ScreenSize,
    ) -> CalibrationResult<CalibrationState> {
        if self.state.is_active() {
            warn!(state = %self.state, "Discarding active calibration session");
        }
        self.clear_buffers();
        self.last_error = None;
        self.points.clear();
        self.screen = screen;

        let points = match layout.points(screen, self.config.margin_ratio) {
            Ok(points) => points,
            Err(err) => return Err(self.fail(err)),
        };
        self.buffers = vec![Vec::new(); points.len()];
        self.failures = vec![0; points.len()];
        self.points = points;
        self.state = CalibrationState::Presenting { point: 0 };
        info!(
            layout = layout.as_str(),
            points = self.points.len(),
            screen = %screen,
            model = self.model.kind.as_str(),
            "Calibration started"
        );
        Ok(self.state)
    }

    /// `Presenting(i) → Capturing(i)`. Clears whatever a failed attempt left.
    pub fn begin_capture(&mut self) -> CalibrationResult<CalibrationState> {
        let CalibrationState::Presenting { point } = self.state else {
            return Err(self.invalid("begin_capture"));
        };
        self.buffers[point].clear();
        self.state = CalibrationState::Capturing { point };
        debug!(point, "Capture window opened");
        Ok(self.state)
    }

    fn check_dim(&mut self, features: &FeatureVector) -> CalibrationResult<()> {
        if let Some(expected) = self.feature_dim {
            if expected != features.len() {
                return Err(self.fail(CalibrationError::FeatureDimensionMismatch {
                    expected,
                    got: features.len(),
                }));
            }
        }
        Ok(())
    }

    /// Buffer one frame for the current point. Frames past the cap are
    /// dropped without error.
    pub fn submit_sample(&mut self, features: FeatureVector) -> CalibrationResult<SampleOutcome> {
        let CalibrationState::Capturing { point } = self.state else {
            return Err(self.invalid("submit_sample"));
        };
        self.check_dim(&features)?;
        if !features.is_finite() || self.buffers[point].len() >= self.config.max_samples_per_point {
            return Ok(SampleOutcome::Dropped);
        }
        self.feature_dim.get_or_insert(features.len());
        let target = self.points[point].target;
        let buffer = &mut self.buffers[point];
        buffer.push(FeatureSample {
            features,
            target,
            point,
        });
        Ok(SampleOutcome::Accepted {
            count: buffer.len(),
        })
    }

    /// Close the capture window for the current point (or tuning point).
    pub fn advance(&mut self) -> CalibrationResult<CalibrationState> {
        if let CalibrationState::Tuning { point } = self.state {
            if point < self.tuning_points.len() {
                self.state = CalibrationState::Tuning { point: point + 1 };
            }
            return Ok(self.state);
        }

        let CalibrationState::Capturing { point } = self.state else {
            return Err(self.invalid("advance"));
        };
        let got = self.buffers[point].len();
        let need = self.config.min_samples_per_point;

        if got < need {
            self.failures[point] += 1;
            let attempts = self.failures[point];
            if attempts > self.config.max_point_retries {
                return Err(self.fail(CalibrationError::InsufficientSamples {
                    point,
                    got,
                    need,
                    attempts,
                }));
            }
            warn!(point, got, need, attempt = attempts, "Too few samples, retrying point");
            self.buffers[point].clear();
            self.state = CalibrationState::Presenting { point };
            return Ok(self.state);
        }

        self.state = if point + 1 < self.points.len() {
            CalibrationState::Presenting { point: point + 1 }
        } else {
            CalibrationState::Training
        };
        debug!(point, samples = got, next = %self.state, "Point complete");
        Ok(self.state)
    }

    /// Fit the configured variant.
    pub fn train(&mut self) -> CalibrationResult<CalibrationState> {
        let kind = self.model.kind;
        self.train_with(kind)
    }

    /// Fit `kind` on the buffered samples. Also accepted after a training
    /// failure, refitting the retained samples with another variant.
    pub fn train_with(&mut self, kind: ModelKind) -> CalibrationResult<CalibrationState> {
        if self.awaiting_retrain() {
            info!(model = kind.as_str(), "Retrying training");
            self.state = CalibrationState::Training;
        }
        if self.state != CalibrationState::Training {
            return Err(self.invalid("train"));
        }
        let need = self.config.min_samples_per_point;
        if let Some(point) = self.buffers.iter().position(|b| b.len() < need) {
            let err = CalibrationError::InsufficientSamples {
                point,
                got: self.buffers[point].len(),
                need,
                attempts: self.failures[point],
            };
            return Err(self.fail(err));
        }

        info!(model = kind.as_str(), "Training gaze model");
        let fitted = TrainingSet::from_samples(self.buffers.iter().flatten())
            .and_then(|set| TrainedModel::train(kind, &set, &self.model.params, self.screen));
        let model = match fitted {
            Ok(model) => model,
            Err(failure) => return Err(self.fail(failure.into())),
        };
        self.trained = Some(model);

        if self.filter.is_variance_sensitive() && self.config.tuning_points > 0 {
            self.tuning_points = layout::tuning_points(self.screen, self.config.tuning_points);
            self.tuning_buffers = vec![Vec::new(); self.tuning_points.len()];
            self.state = CalibrationState::Tuning { point: 0 };
            info!(points = self.tuning_points.len(), "Filter tuning phase");
        } else {
            self.state = CalibrationState::Completed;
            info!("Calibration completed");
        }
        Ok(self.state)
    }

    /// After a training failure, fit again on the retained samples.
    pub fn retry_training(&mut self, kind: ModelKind) -> CalibrationResult<CalibrationState> {
        if !self.awaiting_retrain() {
            return Err(self.invalid("retry_training"));
        }
        self.train_with(kind)
    }

    /// Buffer one frame for the current tuning point.
    pub fn submit_tuning_sample(
        &mut self,
        features: FeatureVector,
    ) -> CalibrationResult<SampleOutcome> {
        let point = match self.state {
            CalibrationState::Tuning { point } if point < self.tuning_points.len() => point,
            _ => return Err(self.invalid("submit_tuning_sample")),
        };
        self.check_dim(&features)?;
        let buffer = &mut self.tuning_buffers[point];
        if !features.is_finite() || buffer.len() >= self.config.max_samples_per_point {
            return Ok(SampleOutcome::Dropped);
        }
        buffer.push(features);
        Ok(SampleOutcome::Accepted {
            count: buffer.len(),
        })
    }

    /// Per-axis variance of the new model's predictions around each tuning
    /// point's mean, averaged over points with at least two samples.
    fn measure_variance(&self, model: &TrainedModel) -> (f64, f64, usize) {
        let mut sum = (0.0, 0.0);
        let mut used = 0;
        for buffer in &self.tuning_buffers {
            let preds: Vec<GazePoint> = buffer.iter().filter_map(|f| model.predict(f)).collect();
            if preds.len() < 2 {
                continue;
            }
            let n = preds.len() as f64;
            let mx = preds.iter().map(|p| p.x).sum::<f64>() / n;
            let my = preds.iter().map(|p| p.y).sum::<f64>() / n;
            sum.0 += preds.iter().map(|p| (p.x - mx).powi(2)).sum::<f64>() / n;
            sum.1 += preds.iter().map(|p| (p.y - my).powi(2)).sum::<f64>() / n;
            used += 1;
        }
        if used == 0 {
            return (0.0, 0.0, 0);
        }
        (sum.0 / used as f64, sum.1 / used as f64, used)
    }

    /// Derive Kalman measurement variance from the tuning samples.
    pub fn tune(&mut self) -> CalibrationResult<KalmanTuning> {
        if !matches!(self.state, CalibrationState::Tuning { .. }) {
            return Err(self.invalid("tune"));
        }
        let Some(model) = self.trained.as_ref() else {
            return Err(self.invalid("tune"));
        };
        let (vx, vy, used) = self.measure_variance(model);
        let tuning = match KalmanTuning::new(vx, vy) {
            Ok(tuning) => tuning,
            Err(err) => return Err(self.fail(err.into())),
        };
        info!(variance_x = vx, variance_y = vy, points = used, "Kalman filter tuned");
        self.tuning = Some(tuning);
        self.state = CalibrationState::Completed;
        Ok(tuning)
    }

    /// Leave the tuning phase with configured filter parameters.
    pub fn skip_tuning(&mut self) -> CalibrationResult<CalibrationState> {
        if !matches!(self.state, CalibrationState::Tuning { .. }) {
            return Err(self.invalid("skip_tuning"));
        }
        self.tuning = None;
        self.state = CalibrationState::Completed;
        info!("Filter tuning skipped");
        Ok(self.state)
    }

    /// Hand over the trained model and return to `Idle`.
    pub fn finish(&mut self) -> CalibrationResult<CalibrationOutcome> {
        if self.state != CalibrationState::Completed {
            return Err(self.invalid("finish"));
        }
        let Some(model) = self.trained.take() else {
            return Err(self.invalid("finish"));
        };
        let outcome = CalibrationOutcome {
            model,
            tuning: self.tuning.take(),
        };
        self.clear_buffers();
        self.points.clear();
        self.state = CalibrationState::Idle;
        Ok(outcome)
    }

    /// Drop everything and return to `Idle`. Safe from any state.
    pub fn abort(&mut self) -> CalibrationState {
        if self.state != CalibrationState::Idle {
            info!(state = %self.state, "Calibration aborted");
        }
        self.clear_buffers();
        self.points.clear();
        self.last_error = None;
        self.state = CalibrationState::Idle;
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrainingFailure;
    use crate::features::HeadPose;

    /// Features linear in the target with a small per-sample wobble.
    fn features_for(target: GazePoint, k: usize) -> FeatureVector {
        let wobble = (k % 3) as f64 * 0.002;
        FeatureVector::new(
            vec![target.x / 1920.0 + wobble, target.y / 1080.0 - wobble, 0.3],
            HeadPose::new(0.01 * wobble, 0.0, 0.0),
        )
    }

    fn session(filter: FilterKind) -> CalibrationSession {
        CalibrationSession::new(CalibrationConfig::default(), ModelConfig::default(), filter)
    }

    fn capture(s: &mut CalibrationSession, n: usize) {
        s.begin_capture().unwrap();
        let target = s.current_point().unwrap().target;
        for k in 0..n {
            s.submit_sample(features_for(target, k)).unwrap();
        }
    }

    fn run_points(s: &mut CalibrationSession) {
        while let CalibrationState::Presenting { .. } = s.state() {
            capture(s, 4);
            s.advance().unwrap();
        }
    }

    #[test]
    fn test_start_presents_first_point() {
        let mut s = session(FilterKind::None);
        let state = s.start(&PointLayout::Five, ScreenSize::default()).unwrap();
        assert_eq!(state, CalibrationState::Presenting { point: 0 });
        assert_eq!(s.points().len(), 5);
        assert_eq!(s.current_point().unwrap().index, 0);
        assert_eq!(s.progress(), 0.0);
    }

    #[test]
    fn test_invalid_layout_moves_to_error() {
        let mut s = session(FilterKind::None);
        let err = s
            .start(&PointLayout::Custom(vec![GazePoint::new(1.0, 1.0)]), ScreenSize::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidLayout);
        assert_eq!(
            s.state(),
            CalibrationState::Error {
                kind: ErrorKind::InvalidLayout
            }
        );
    }

    #[test]
    fn test_submit_outside_capture_is_invalid_state() {
        let mut s = session(FilterKind::None);
        s.start(&PointLayout::Five, ScreenSize::default()).unwrap();
        let err = s.submit_sample(features_for(GazePoint::new(0.0, 0.0), 0)).unwrap_err();
        assert!(matches!(err, CalibrationError::InvalidState { op: "submit_sample", .. }));
        assert_eq!(
            s.state(),
            CalibrationState::Error {
                kind: ErrorKind::InvalidState
            }
        );
    }

    #[test]
    fn test_samples_past_cap_are_dropped() {
        let config = CalibrationConfig {
            max_samples_per_point: 4,
            ..CalibrationConfig::default()
        };
        let mut s = CalibrationSession::new(config, ModelConfig::default(), FilterKind::None);
        s.start(&PointLayout::Five, ScreenSize::default()).unwrap();
        s.begin_capture().unwrap();
        let target = s.current_point().unwrap().target;
        let outcomes: Vec<SampleOutcome> = (0..6)
            .map(|k| s.submit_sample(features_for(target, k)).unwrap())
            .collect();
        assert_eq!(outcomes[3], SampleOutcome::Accepted { count: 4 });
        assert_eq!(outcomes[4], SampleOutcome::Dropped);
        assert_eq!(s.samples_at(0), 4);
    }

    #[test]
    fn test_dimension_mismatch_is_not_terminal() {
        let mut s = session(FilterKind::None);
        s.start(&PointLayout::Five, ScreenSize::default()).unwrap();
        s.begin_capture().unwrap();
        let target = s.current_point().unwrap().target;
        s.submit_sample(features_for(target, 0)).unwrap();
        let short = FeatureVector::new(vec![0.1], HeadPose::default());
        let err = s.submit_sample(short).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FeatureDimensionMismatch);
        assert_eq!(s.state(), CalibrationState::Capturing { point: 0 });
        assert_eq!(s.samples_at(0), 1);
    }

    #[test]
    fn test_short_point_is_retried_then_fails() {
        let mut s = session(FilterKind::None);
        s.start(&PointLayout::Five, ScreenSize::default()).unwrap();
        for attempt in 1..=2 {
            capture(&mut s, 2);
            assert_eq!(s.advance().unwrap(), CalibrationState::Presenting { point: 0 }, "attempt {attempt}");
            assert_eq!(s.samples_at(0), 0);
        }
        capture(&mut s, 2);
        let err = s.advance().unwrap_err();
        assert_eq!(
            err,
            CalibrationError::InsufficientSamples {
                point: 0,
                got: 2,
                need: 3,
                attempts: 3
            }
        );
        assert_eq!(
            s.state(),
            CalibrationState::Error {
                kind: ErrorKind::InsufficientSamples
            }
        );
        assert_eq!(s.samples_at(0), 0);
    }

    #[test]
    fn test_retry_recovers_point() {
        let mut s = session(FilterKind::None);
        s.start(&PointLayout::Five, ScreenSize::default()).unwrap();
        capture(&mut s, 1);
        s.advance().unwrap();
        capture(&mut s, 3);
        assert_eq!(s.advance().unwrap(), CalibrationState::Presenting { point: 1 });
        assert!((s.progress() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_full_session_without_tuning() {
        let mut s = session(FilterKind::None);
        s.start(&PointLayout::Five, ScreenSize::default()).unwrap();
        run_points(&mut s);
        assert_eq!(s.state(), CalibrationState::Training);
        assert_eq!(s.train().unwrap(), CalibrationState::Completed);
        let outcome = s.finish().unwrap();
        assert_eq!(outcome.model.kind(), ModelKind::Ridge);
        assert_eq!(outcome.model.sample_count(), 20);
        assert!(outcome.tuning.is_none());
        assert_eq!(s.state(), CalibrationState::Idle);
    }

    #[test]
    fn test_kalman_session_tunes() {
        let mut s = session(FilterKind::Kalman);
        s.start(&PointLayout::Five, ScreenSize::default()).unwrap();
        run_points(&mut s);
        assert_eq!(s.train().unwrap(), CalibrationState::Tuning { point: 0 });
        while let Some(p) = s.current_point().copied() {
            for k in 0..3 {
                s.submit_tuning_sample(features_for(p.target, k)).unwrap();
            }
            s.advance().unwrap();
        }
        assert_eq!(s.state(), CalibrationState::Tuning { point: 3 });
        let tuning = s.tune().unwrap();
        assert!(tuning.variance_x() > 0.0);
        assert!(tuning.variance_y() > 0.0);
        let outcome = s.finish().unwrap();
        assert_eq!(outcome.tuning, Some(tuning));
    }

    #[test]
    fn test_tuning_without_spread_is_degenerate() {
        let mut s = session(FilterKind::Kalman);
        s.start(&PointLayout::Five, ScreenSize::default()).unwrap();
        run_points(&mut s);
        s.train().unwrap();
        // one sample per point gives no variance estimate at all
        while let Some(p) = s.current_point().copied() {
            s.submit_tuning_sample(features_for(p.target, 0)).unwrap();
            s.advance().unwrap();
        }
        let err = s.tune().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DegenerateFilterConfig);
        assert_eq!(
            s.state(),
            CalibrationState::Error {
                kind: ErrorKind::DegenerateFilterConfig
            }
        );
    }

    #[test]
    fn test_skip_tuning() {
        let mut s = session(FilterKind::Kalman);
        s.start(&PointLayout::Five, ScreenSize::default()).unwrap();
        run_points(&mut s);
        s.train().unwrap();
        assert_eq!(s.skip_tuning().unwrap(), CalibrationState::Completed);
        assert!(s.finish().unwrap().tuning.is_none());
    }

    #[test]
    fn test_training_failure_keeps_samples_for_retry() {
        // identical features at every point: ridge without penalty is singular
        let model = ModelConfig {
            kind: ModelKind::Ridge,
            params: crate::model::ModelParams {
                ridge_alpha: 0.0,
                ..Default::default()
            },
        };
        let mut s = CalibrationSession::new(CalibrationConfig::default(), model, FilterKind::None);
        s.start(&PointLayout::Five, ScreenSize::default()).unwrap();
        while let CalibrationState::Presenting { .. } = s.state() {
            s.begin_capture().unwrap();
            for _ in 0..3 {
                let row = FeatureVector::new(vec![0.5, 0.5], HeadPose::default());
                s.submit_sample(row).unwrap();
            }
            s.advance().unwrap();
        }
        let err = s.train().unwrap_err();
        assert_eq!(err, CalibrationError::TrainingFailed(TrainingFailure::SingularMatrix));
        assert_eq!(s.samples_at(4), 3);

        // a kernel model fits the same samples
        assert_eq!(s.retry_training(ModelKind::Svr).unwrap(), CalibrationState::Completed);
        assert_eq!(s.finish().unwrap().model.kind(), ModelKind::Svr);
    }

    #[test]
    fn test_train_with_other_variant_after_failure() {
        let model = ModelConfig {
            kind: ModelKind::Ridge,
            params: crate::model::ModelParams {
                ridge_alpha: 0.0,
                ..Default::default()
            },
        };
        let mut s = CalibrationSession::new(CalibrationConfig::default(), model, FilterKind::None);
        s.start(&PointLayout::Five, ScreenSize::default()).unwrap();
        while let CalibrationState::Presenting { .. } = s.state() {
            s.begin_capture().unwrap();
            for _ in 0..3 {
                let row = FeatureVector::new(vec![0.5, 0.5], HeadPose::default());
                s.submit_sample(row).unwrap();
            }
            s.advance().unwrap();
        }
        assert!(s.train().is_err());
        let failed = CalibrationState::Error {
            kind: ErrorKind::TrainingFailed,
        };
        assert_eq!(s.state(), failed);

        // stray calls are rejected without losing the samples
        let late = FeatureVector::new(vec![0.5, 0.5], HeadPose::default());
        assert!(s.submit_sample(late).is_err());
        assert!(s.begin_capture().is_err());
        assert_eq!(s.state(), failed);
        assert_eq!(s.samples_at(0), 3);

        assert_eq!(s.train_with(ModelKind::Svr).unwrap(), CalibrationState::Completed);
        let outcome = s.finish().unwrap();
        assert_eq!(outcome.model.kind(), ModelKind::Svr);
        assert_eq!(outcome.model.sample_count(), 15);
    }

    #[test]
    fn test_abort_discards_everything() {
        let mut s = session(FilterKind::None);
        s.start(&PointLayout::Nine, ScreenSize::default()).unwrap();
        capture(&mut s, 5);
        assert_eq!(s.abort(), CalibrationState::Idle);
        assert_eq!(s.samples_at(0), 0);
        assert!(s.current_point().is_none());
        // idempotent
        assert_eq!(s.abort(), CalibrationState::Idle);
    }

    #[test]
    fn test_status_json() {
        let mut s = session(FilterKind::None);
        s.start(&PointLayout::Five, ScreenSize::default()).unwrap();
        capture(&mut s, 2);
        let status = s.status_json();
        assert_eq!(status["status"]["state"], "capturing");
        assert_eq!(status["samples"], 2);
        assert_eq!(status["total_points"], 5);
        assert_eq!(status["current_point"]["target"]["x"], 960.0);
        assert!(status["error"].is_null());
    }
}
