//! Real-time gaze loop: source → model → filter → interaction → event.
//!
//! One `GazeLoop` per user. It owns its model, filter and tracker; nothing
//! is shared. Missing data never surfaces as an error, it degrades the
//! output to `frozen = true`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::feature_source::{FeatureFrame, FeatureSource};
use crate::filter::{FilterKind, KalmanTuning, SmoothingFilter, Smoother};
use crate::health::WatchdogEvent;
use crate::interaction::{InteractionConfig, InteractionInput, InteractionTracker, TargetRegion};
use crate::model::TrainedModel;
use crate::screen::{GazePoint, ScreenSize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GazeLoopConfig {
    /// Cycle rate the loop paces itself to.
    pub target_fps: f64,
}

impl Default for GazeLoopConfig {
    fn default() -> Self {
        Self { target_fps: 60.0 }
    }
}

impl GazeLoopConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps.max(1.0))
    }
}

/// Snapshot emitted once per cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GazeUpdateEvent {
    pub x: f64,
    pub y: f64,
    /// Unsmoothed model output, when there was one this cycle.
    pub raw_x: Option<f64>,
    pub raw_y: Option<f64>,
    /// Blink flag as reported by the source, even without a face.
    pub blink: bool,
    /// Consumers must not move a pointer with x/y while this is set.
    pub frozen: bool,
    pub prolonged_blink: bool,
    pub dwell_progress: f64,
    pub dwell_complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dwell_target: Option<u32>,
    pub face_detected: bool,
    pub calibrated: bool,
    pub timestamp_ms: i64,
}

/// Totals over one `run`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunSummary {
    pub frames: u64,
    pub frozen_frames: u64,
    pub dwell_clicks: u64,
    pub blink_clicks: u64,
    /// Cycle rate over the last full second of stream time; 0 if the run
    /// was shorter than that.
    pub rate_hz: f64,
    /// Share of frames with a face over the same window.
    pub face_ratio: f64,
}

pub struct GazeLoop {
    clock: Arc<dyn Clock>,
    screen: ScreenSize,
    config: GazeLoopConfig,
    model: Option<TrainedModel>,
    filter: Smoother,
    tracker: InteractionTracker,
    last_tick: Option<Instant>,
    warned_width: bool,
}

impl GazeLoop {
    /// A loop with no model yet. Output stays frozen at screen center until
    /// a model is installed.
    pub fn new(
        screen: ScreenSize,
        config: GazeLoopConfig,
        mut filter: Smoother,
        interaction: InteractionConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        filter.reset();
        info!(
            screen = %screen,
            filter = filter.kind().as_str(),
            fps = config.target_fps,
            "Gaze loop created"
        );
        Self {
            clock,
            screen,
            config,
            model: None,
            filter,
            tracker: InteractionTracker::new(interaction, screen.center()),
            last_tick: None,
            warned_width: false,
        }
    }

    /// Builder form of `replace_model`.
    pub fn with_model(mut self, model: TrainedModel, tuning: Option<KalmanTuning>) -> Self {
        self.replace_model(model, tuning);
        self
    }

    /// Install a freshly calibrated model. Filter and tracker start over.
    pub fn replace_model(&mut self, model: TrainedModel, tuning: Option<KalmanTuning>) {
        if model.screen() != self.screen {
            warn!(
                model_screen = %model.screen(),
                screen = %self.screen,
                "Model was calibrated on a different screen"
            );
        }
        if let Some(tuning) = tuning {
            if self.filter.apply_tuning(tuning) {
                debug!(
                    variance_x = tuning.variance_x(),
                    variance_y = tuning.variance_y(),
                    "Applied filter tuning"
                );
            }
        }
        info!(model = model.kind().as_str(), dim = model.feature_dim(), "Gaze model installed");
        self.model = Some(model);
        self.warned_width = false;
        self.restart();
    }

    /// Forget filter, interaction and timing state. Safe to call any time.
    pub fn restart(&mut self) {
        self.filter.reset();
        self.tracker.reset();
        self.last_tick = None;
    }

    pub fn is_calibrated(&self) -> bool {
        self.model.is_some()
    }

    pub fn model(&self) -> Option<&TrainedModel> {
        self.model.as_ref()
    }

    pub fn filter_kind(&self) -> FilterKind {
        self.filter.kind()
    }

    pub fn tracker(&self) -> &InteractionTracker {
        &self.tracker
    }

    pub fn set_targets(&mut self, targets: Vec<TargetRegion>) {
        self.tracker.set_targets(targets);
    }

    fn predict(&mut self, frame: &FeatureFrame) -> Option<GazePoint> {
        let model = self.model.as_ref()?;
        let features = frame.usable_features()?;
        let point = model.predict(features);
        if point.is_none() && !self.warned_width {
            warn!(
                got = features.len(),
                expected = model.feature_dim(),
                "Feature vector does not fit the model; holding position"
            );
            self.warned_width = true;
        }
        point
    }

    /// One cycle. `None` means no frame arrived in time.
    pub fn cycle(&mut self, frame: Option<FeatureFrame>) -> GazeUpdateEvent {
        let now = self.clock.now();
        let dt_ms = self
            .last_tick
            .map(|prev| now.saturating_duration_since(prev).as_nanos() as f64 / 1e6)
            .unwrap_or(0.0);
        self.last_tick = Some(now);

        let frame = frame.unwrap_or_else(FeatureFrame::no_face);
        let face_detected = frame.face_detected;
        let blink = face_detected && frame.blink;

        // the filter only sees real observations
        let raw = if blink { None } else { self.predict(&frame) };
        let smoothed = raw.map(|p| self.filter.step(p));

        let out = self.tracker.update(InteractionInput {
            point: smoothed.unwrap_or(GazePoint::new(f64::NAN, f64::NAN)),
            blink,
            face_detected,
            dt_ms,
            calibrated: self.model.is_some(),
        });
        if out.watchdog == WatchdogEvent::Lost {
            debug!("Resetting filter after tracking gap");
            self.filter.reset();
        }

        GazeUpdateEvent {
            x: out.point.x,
            y: out.point.y,
            raw_x: raw.map(|p| p.x),
            raw_y: raw.map(|p| p.y),
            blink: frame.blink,
            frozen: out.frozen,
            prolonged_blink: out.prolonged_blink,
            dwell_progress: out.dwell_progress,
            dwell_complete: out.dwell_complete,
            dwell_target: out.dwell_target,
            face_detected,
            calibrated: self.model.is_some(),
            timestamp_ms: self.clock.unix_millis(),
        }
    }

    /// Drive the loop until the source is exhausted or `max_frames` cycles
    /// have run, pacing each cycle to the configured frame interval.
    pub fn run<F>(
        &mut self,
        source: &mut dyn FeatureSource,
        max_frames: Option<u64>,
        mut emit: F,
    ) -> RunSummary
    where
        F: FnMut(&GazeUpdateEvent),
    {
        let interval = self.config.frame_interval();
        let mut summary = RunSummary::default();
        let mut warned_rate = false;
        while max_frames.map_or(true, |max| summary.frames < max) && !source.is_exhausted() {
            let started = self.clock.now();
            let event = self.cycle(source.poll());
            emit(&event);

            summary.frames += 1;
            summary.frozen_frames += u64::from(event.frozen);
            summary.dwell_clicks += u64::from(event.dwell_complete);
            summary.blink_clicks += u64::from(event.prolonged_blink);

            let health = self.tracker.health();
            if !warned_rate && health.rate_low(self.config.target_fps) {
                warn!(
                    actual_hz = health.actual_rate_hz,
                    target_hz = self.config.target_fps,
                    "Frame rate below target"
                );
                warned_rate = true;
            }

            let spent = self.clock.now().saturating_duration_since(started);
            if let Some(rest) = interval.checked_sub(spent) {
                self.clock.sleep(rest);
            }
        }
        let health = self.tracker.health();
        summary.rate_hz = health.actual_rate_hz;
        summary.face_ratio = health.face_ratio;
        info!(
            frames = summary.frames,
            frozen = summary.frozen_frames,
            dwell_clicks = summary.dwell_clicks,
            blink_clicks = summary.blink_clicks,
            rate_hz = summary.rate_hz,
            face_ratio = summary.face_ratio,
            "Gaze loop finished"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::features::{FeatureVector, HeadPose};
    use crate::feature_source::ScriptedFeatureSource;
    use crate::filter::FilterParams;
    use crate::model::{ModelKind, ModelParams, TrainingSet};

    /// Two ratios that encode the target directly.
    fn features(x: f64, y: f64) -> FeatureVector {
        FeatureVector::new(vec![x / 1000.0, y / 1000.0], HeadPose::default())
    }

    fn model() -> TrainedModel {
        let mut rows = Vec::new();
        let mut targets = Vec::new();
        for i in 0..4 {
            for j in 0..4 {
                let (x, y) = (100.0 + 500.0 * i as f64, 100.0 + 300.0 * j as f64);
                rows.push(features(x, y).as_row());
                targets.push([x, y]);
            }
        }
        let set = TrainingSet::new(rows, targets).unwrap();
        let params = ModelParams {
            ridge_alpha: 1e-6,
            ..ModelParams::default()
        };
        TrainedModel::train(ModelKind::Ridge, &set, &params, ScreenSize::default()).unwrap()
    }

    fn gaze_loop(filter: FilterKind, clock: Arc<TestClock>) -> GazeLoop {
        let smoother = Smoother::build(filter, &FilterParams::default()).unwrap();
        GazeLoop::new(
            ScreenSize::default(),
            GazeLoopConfig { target_fps: 10.0 },
            smoother,
            InteractionConfig::default(),
            clock,
        )
    }

    #[test]
    fn test_uncalibrated_loop_is_frozen_at_center() {
        let clock = Arc::new(TestClock::new());
        let mut gl = gaze_loop(FilterKind::None, clock);
        let ev = gl.cycle(Some(FeatureFrame::face(features(100.0, 100.0), false)));
        assert!(ev.frozen);
        assert!(!ev.calibrated);
        assert_eq!((ev.x, ev.y), (960.0, 540.0));
        assert!(ev.raw_x.is_none());
    }

    #[test]
    fn test_calibrated_passthrough_follows_gaze() {
        let clock = Arc::new(TestClock::new());
        let mut gl = gaze_loop(FilterKind::None, clock).with_model(model(), None);
        let ev = gl.cycle(Some(FeatureFrame::face(features(600.0, 400.0), false)));
        assert!(!ev.frozen);
        assert!(ev.calibrated);
        assert!((ev.x - 600.0).abs() < 1.0, "{ev:?}");
        assert!((ev.y - 400.0).abs() < 1.0, "{ev:?}");
        assert_eq!(ev.raw_x, Some(ev.x));
    }

    #[test]
    fn test_missing_frame_freezes() {
        let clock = Arc::new(TestClock::new());
        let mut gl = gaze_loop(FilterKind::None, clock.clone()).with_model(model(), None);
        let live = gl.cycle(Some(FeatureFrame::face(features(600.0, 400.0), false)));
        clock.advance_ms(100);
        let gap = gl.cycle(None);
        assert!(gap.frozen);
        assert!(!gap.face_detected);
        assert_eq!((gap.x, gap.y), (live.x, live.y));
        clock.advance_ms(100);
        let blink = gl.cycle(Some(FeatureFrame::face(features(10.0, 10.0), true)));
        assert!(blink.frozen && blink.blink);
        assert_eq!((blink.x, blink.y), (live.x, live.y));
    }

    #[test]
    fn test_wrong_feature_width_holds_position() {
        let clock = Arc::new(TestClock::new());
        let mut gl = gaze_loop(FilterKind::None, clock).with_model(model(), None);
        let short = FeatureVector::new(vec![0.1], HeadPose::default());
        let ev = gl.cycle(Some(FeatureFrame::face(short, false)));
        assert!(ev.frozen);
        assert!(ev.face_detected);
    }

    #[test]
    fn test_run_paces_with_virtual_clock() {
        let clock = Arc::new(TestClock::new());
        let mut gl = gaze_loop(FilterKind::Kalman, clock.clone()).with_model(model(), None);
        let frames = (0..25)
            .map(|_| FeatureFrame::face(features(800.0, 500.0), false))
            .collect();
        let mut source = ScriptedFeatureSource::from_frames(frames);
        let start = clock.now();
        let mut events = Vec::new();
        let summary = gl.run(&mut source, None, |ev| events.push(ev.clone()));

        assert_eq!(summary.frames, 25);
        assert_eq!(clock.now() - start, Duration::from_millis(2500));
        // 100 ms per frame, so frame 20 completes the 2 s dwell
        assert_eq!(summary.dwell_clicks, 1);
        assert!(events[20].dwell_complete);
        assert!(events.windows(2).all(|w| w[1].timestamp_ms - w[0].timestamp_ms == 100));
        assert_eq!(summary.rate_hz, 10.0);
        assert_eq!(summary.face_ratio, 1.0);
    }

    #[test]
    fn test_run_respects_max_frames() {
        let clock = Arc::new(TestClock::new());
        let mut gl = gaze_loop(FilterKind::Ema, clock);
        let mut source = ScriptedFeatureSource::new(vec![None; 10]);
        let summary = gl.run(&mut source, Some(4), |_| {});
        assert_eq!(summary.frames, 4);
        assert_eq!(summary.frozen_frames, 4);
        assert_eq!(source.remaining(), 6);
    }

    #[test]
    fn test_replace_model_restarts_interaction() {
        let clock = Arc::new(TestClock::new());
        let mut gl = gaze_loop(FilterKind::None, clock.clone()).with_model(model(), None);
        for _ in 0..5 {
            gl.cycle(Some(FeatureFrame::face(features(800.0, 500.0), false)));
            clock.advance_ms(100);
        }
        assert!(gl.tracker().dwell_phase() != crate::interaction::DwellPhase::Idle);
        gl.replace_model(model(), None);
        assert_eq!(gl.tracker().dwell_phase(), crate::interaction::DwellPhase::Idle);
    }

    #[test]
    fn test_uncalibrated_long_blink_never_clicks() {
        let clock = Arc::new(TestClock::new());
        let mut gl = gaze_loop(FilterKind::None, clock);
        let frames = (0..12)
            .map(|_| FeatureFrame::face(features(600.0, 400.0), true))
            .collect();
        let mut source = ScriptedFeatureSource::from_frames(frames);
        let mut events = Vec::new();
        let summary = gl.run(&mut source, None, |ev| events.push(ev.clone()));

        // 1.2 s of closed eyes, well past the prolonged blink threshold
        assert_eq!(summary.blink_clicks, 0);
        assert_eq!(summary.frozen_frames, 12);
        for ev in &events {
            assert!(ev.frozen && ev.blink && !ev.calibrated);
            assert!(!ev.prolonged_blink && !ev.dwell_complete);
        }
    }

    #[test]
    fn test_watchdog_resets_kalman_filter() {
        let clock = Arc::new(TestClock::new());
        let mut gl = gaze_loop(FilterKind::Kalman, clock.clone()).with_model(model(), None);
        for _ in 0..5 {
            gl.cycle(Some(FeatureFrame::face(features(600.0, 400.0), false)));
            clock.advance_ms(100);
        }
        let lagging = gl.cycle(Some(FeatureFrame::face(features(1200.0, 800.0), false)));
        assert!(!lagging.frozen);
        assert!((lagging.x - lagging.raw_x.unwrap()).abs() > 1.0, "{lagging:?}");

        let watchdog = InteractionConfig::default().no_face_watchdog_frames;
        for _ in 0..=watchdog {
            clock.advance_ms(100);
            assert!(gl.cycle(None).frozen);
        }
        assert!(gl.tracker().health().tracking_lost);

        // the first observation after the gap is not pulled toward stale state
        clock.advance_ms(100);
        let back = gl.cycle(Some(FeatureFrame::face(features(300.0, 900.0), false)));
        assert!(!back.frozen);
        assert_eq!(back.raw_x, Some(back.x));
        assert_eq!(back.raw_y, Some(back.y));
    }

    #[test]
    fn test_restart_resets_kalman_filter() {
        let clock = Arc::new(TestClock::new());
        let mut gl = gaze_loop(FilterKind::Kalman, clock.clone()).with_model(model(), None);
        for _ in 0..5 {
            gl.cycle(Some(FeatureFrame::face(features(600.0, 400.0), false)));
            clock.advance_ms(100);
        }
        gl.restart();
        let ev = gl.cycle(Some(FeatureFrame::face(features(1200.0, 800.0), false)));
        assert!(!ev.frozen);
        assert_eq!(ev.raw_x, Some(ev.x));
        assert_eq!(ev.raw_y, Some(ev.y));
        assert!((ev.x - 1200.0).abs() < 1.0, "{ev:?}");
    }

    #[test]
    fn test_event_reports_source_blink_without_face() {
        let clock = Arc::new(TestClock::new());
        let mut gl = gaze_loop(FilterKind::None, clock).with_model(model(), None);
        let frame = FeatureFrame {
            blink: true,
            ..FeatureFrame::no_face()
        };
        let ev = gl.cycle(Some(frame));
        assert!(ev.blink);
        assert!(!ev.face_detected && ev.frozen && !ev.prolonged_blink);
        assert_eq!(gl.tracker().blink_phase(), crate::interaction::BlinkPhase::Open);
    }

    #[test]
    fn test_event_json_shape() {
        let clock = Arc::new(TestClock::new());
        let mut gl = gaze_loop(FilterKind::None, clock);
        let ev = gl.cycle(None);
        let json = serde_json::to_value(&ev).unwrap();
        for key in ["x", "y", "blink", "frozen", "prolonged_blink", "dwell_progress", "dwell_complete"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert!(json.get("dwell_target").is_none());
    }
}
