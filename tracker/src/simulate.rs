//! Synthetic feature streams for development without a camera.
//!
//! `SimulatedUser` turns a screen target into the feature vector a tracked
//! face would plausibly produce while looking at it. `SimulatedFeatureSource`
//! drives a user around the screen and plays the part of the landmark
//! extractor for the gaze loop.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::calibration::{CalibrationOutcome, CalibrationSession, CalibrationState, PointLayout};
use crate::error::CalibrationResult;
use crate::feature_source::{FeatureFrame, FeatureSource};
use crate::features::{FeatureVector, HeadPose};
use crate::screen::{GazePoint, ScreenSize};

// ── Modes ───────────────────────────────────────────────────

/// How the simulated gaze moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SimulatedGazeMode {
    /// Cycle through fixed targets, holding each for a while.
    #[default]
    Pattern,
    /// Small drifts with occasional saccade-like jumps.
    RandomWalk,
}

impl SimulatedGazeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pattern => "pattern",
            Self::RandomWalk => "random-walk",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pattern" => Some(Self::Pattern),
            "random-walk" => Some(Self::RandomWalk),
            _ => None,
        }
    }
}

// ── Simulated user ──────────────────────────────────────────

/// Maps gaze targets to noisy features.
pub struct SimulatedUser {
    screen: ScreenSize,
    /// Uniform noise amplitude added to each ratio.
    noise: f64,
    /// Head pose jitter amplitude in radians.
    pose_jitter: f64,
    rng: StdRng,
}

impl SimulatedUser {
    /// Number of ratio features produced (pose comes on top).
    pub const RATIO_COUNT: usize = 4;

    pub fn new(screen: ScreenSize, seed: u64) -> Self {
        Self {
            screen,
            noise: 0.002,
            pose_jitter: 0.02,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise = noise.max(0.0);
        self
    }

    pub fn screen(&self) -> ScreenSize {
        self.screen
    }

    fn jitter(&mut self, amplitude: f64) -> f64 {
        if amplitude > 0.0 {
            self.rng.gen_range(-amplitude..=amplitude)
        } else {
            0.0
        }
    }

    /// Features for a face looking at `target`.
    pub fn features_for(&mut self, target: GazePoint) -> FeatureVector {
        let u = target.x / self.screen.width.max(1) as f64;
        let v = target.y / self.screen.height.max(1) as f64;
        let pose = HeadPose::new(
            (u - 0.5) * 0.14 + self.jitter(self.pose_jitter),
            (v - 0.5) * 0.10 + self.jitter(self.pose_jitter),
            self.jitter(self.pose_jitter * 0.5),
        );
        // iris offsets shrink a little as the head turns toward the target
        let ratios = vec![
            0.30 + 0.40 * u - 0.2 * pose.yaw + self.jitter(self.noise),
            0.35 + 0.30 * v - 0.2 * pose.pitch + self.jitter(self.noise),
            0.50 - 0.20 * u + 0.10 * v + self.jitter(self.noise),
            0.28 + 0.05 * u + 0.12 * v + self.jitter(self.noise),
        ];
        FeatureVector::new(ratios, pose)
    }
}

// ── Simulated source ────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub mode: SimulatedGazeMode,
    /// Frames each pattern target is held.
    pub hold_frames: u32,
    /// A blink starts every this many frames; 0 disables blinking.
    pub blink_every: u32,
    pub blink_frames: u32,
    /// Probability a frame is dropped entirely.
    pub drop_rate: f64,
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            mode: SimulatedGazeMode::Pattern,
            hold_frames: 150,
            blink_every: 240,
            blink_frames: 8,
            drop_rate: 0.0,
            seed: 7,
        }
    }
}

/// Endless synthetic stream.
pub struct SimulatedFeatureSource {
    user: SimulatedUser,
    config: SimulationConfig,
    targets: Vec<GazePoint>,
    position: GazePoint,
    frame: u64,
    rng: StdRng,
}

impl SimulatedFeatureSource {
    pub fn new(screen: ScreenSize, config: SimulationConfig) -> Self {
        let (w, h) = (screen.width as f64, screen.height as f64);
        let targets = vec![
            GazePoint::new(w * 0.2, h * 0.2),
            GazePoint::new(w * 0.8, h * 0.2),
            GazePoint::new(w * 0.5, h * 0.5),
            GazePoint::new(w * 0.2, h * 0.8),
            GazePoint::new(w * 0.8, h * 0.8),
        ];
        Self {
            user: SimulatedUser::new(screen, config.seed),
            rng: StdRng::seed_from_u64(config.seed.wrapping_add(1)),
            position: screen.center(),
            targets,
            config,
            frame: 0,
        }
    }

    /// Where the simulated user is looking right now.
    pub fn position(&self) -> GazePoint {
        self.position
    }

    fn advance_position(&mut self) {
        match self.config.mode {
            SimulatedGazeMode::Pattern => {
                let hold = u64::from(self.config.hold_frames.max(1));
                let idx = (self.frame / hold) as usize % self.targets.len();
                self.position = self.targets[idx];
            }
            SimulatedGazeMode::RandomWalk => {
                let screen = self.user.screen();
                let (w, h) = (screen.width as f64, screen.height as f64);
                if self.rng.gen_bool(0.02) {
                    self.position =
                        GazePoint::new(self.rng.gen_range(0.0..w), self.rng.gen_range(0.0..h));
                } else {
                    let x = self.position.x + self.rng.gen_range(-6.0..=6.0);
                    let y = self.position.y + self.rng.gen_range(-6.0..=6.0);
                    self.position = GazePoint::new(x.clamp(0.0, w), y.clamp(0.0, h));
                }
            }
        }
    }

    fn blinking(&self) -> bool {
        let every = u64::from(self.config.blink_every);
        every > 0 && self.frame % every >= every - u64::from(self.config.blink_frames).min(every)
    }
}

impl FeatureSource for SimulatedFeatureSource {
    fn poll(&mut self) -> Option<FeatureFrame> {
        self.advance_position();
        let blink = self.blinking();
        self.frame += 1;

        if self.config.drop_rate > 0.0 && self.rng.gen_bool(self.config.drop_rate.min(1.0)) {
            return None;
        }
        let features = self.user.features_for(self.position);
        Some(FeatureFrame::face(features, blink))
    }

    fn is_exhausted(&self) -> bool {
        false
    }
}

// ── Scripted calibration ────────────────────────────────────

/// Walk `session` through a full calibration with `user` fixating each
/// target for `samples_per_point` frames, tuning included when the session
/// asks for it.
pub fn run_calibration(
    session: &mut CalibrationSession,
    user: &mut SimulatedUser,
    layout: &PointLayout,
    samples_per_point: usize,
) -> CalibrationResult<CalibrationOutcome> {
    session.start(layout, user.screen())?;
    while let CalibrationState::Presenting { .. } = session.state() {
        session.begin_capture()?;
        let Some(target) = session.current_point().map(|p| p.target) else {
            break;
        };
        for _ in 0..samples_per_point {
            session.submit_sample(user.features_for(target))?;
        }
        session.advance()?;
    }

    session.train()?;
    while let CalibrationState::Tuning { .. } = session.state() {
        match session.current_point().map(|p| p.target) {
            Some(target) => {
                for _ in 0..samples_per_point {
                    session.submit_tuning_sample(user.features_for(target))?;
                }
                session.advance()?;
            }
            None => {
                session.tune()?;
            }
        }
    }
    session.finish()
}
