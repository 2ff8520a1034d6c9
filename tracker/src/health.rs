//! Face-tracking health: the no-face watchdog plus observed frame rate.
//!
//! The watchdog counts frames, not wall-clock time, so it behaves the same
//! on slow hardware.

use tracing::{info, warn};

/// Watchdog edge produced by an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogEvent {
    None,
    /// Consecutive no-face frames just exceeded the threshold.
    Lost,
    /// A face returned after tracking was lost.
    Recovered,
}

#[derive(Debug, Clone)]
pub struct TrackingHealth {
    /// No-face frames tolerated before tracking counts as lost.
    pub watchdog_frames: u32,
    /// Consecutive frames without a face.
    pub consecutive_lost_frames: u32,
    pub tracking_lost: bool,
    /// Frames per second over the last full second.
    pub actual_rate_hz: f64,
    /// Fraction of frames with a face over the last full second.
    pub face_ratio: f64,

    frames_this_second: u32,
    faces_this_second: u32,
    window_start_ms: f64,
}

impl TrackingHealth {
    pub fn new(watchdog_frames: u32) -> Self {
        Self {
            watchdog_frames,
            consecutive_lost_frames: 0,
            tracking_lost: false,
            actual_rate_hz: 0.0,
            face_ratio: 0.0,
            frames_this_second: 0,
            faces_this_second: 0,
            window_start_ms: 0.0,
        }
    }

    /// Record one frame at stream time `now_ms`.
    pub fn update(&mut self, face_detected: bool, now_ms: f64) -> WatchdogEvent {
        let mut event = WatchdogEvent::None;
        if face_detected {
            if self.tracking_lost {
                info!(
                    lost_frames = self.consecutive_lost_frames,
                    "Face tracking recovered"
                );
                event = WatchdogEvent::Recovered;
            }
            self.consecutive_lost_frames = 0;
            self.tracking_lost = false;
            self.faces_this_second += 1;
        } else {
            self.consecutive_lost_frames = self.consecutive_lost_frames.saturating_add(1);
            if !self.tracking_lost && self.consecutive_lost_frames > self.watchdog_frames {
                self.tracking_lost = true;
                warn!(
                    frames = self.consecutive_lost_frames,
                    "No face beyond watchdog; output degraded"
                );
                event = WatchdogEvent::Lost;
            }
        }

        self.frames_this_second += 1;
        if now_ms - self.window_start_ms >= 1000.0 {
            let elapsed_s = (now_ms - self.window_start_ms) / 1000.0;
            self.actual_rate_hz = self.frames_this_second as f64 / elapsed_s;
            self.face_ratio = self.faces_this_second as f64 / self.frames_this_second as f64;
            self.frames_this_second = 0;
            self.faces_this_second = 0;
            self.window_start_ms = now_ms;
        }
        event
    }

    /// Whether the observed rate is below 80% of `expected_hz`.
    pub fn rate_low(&self, expected_hz: f64) -> bool {
        self.actual_rate_hz > 0.0 && self.actual_rate_hz < expected_hz * 0.8
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.watchdog_frames);
    }
}
