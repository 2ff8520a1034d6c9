//! Interaction state tracker: turns the smoothed gaze stream into
//! freeze, dwell-complete and prolonged-blink events.
//!
//! Blink and dwell are explicit state machines advanced once per cycle.
//! Either trigger starts a lock-out during which neither may fire again.
//! Dwell time pauses while the output is frozen and resets when the gaze
//! leaves the hover region.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::health::{TrackingHealth, WatchdogEvent};
use crate::screen::GazePoint;

// ── Config ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    /// Continuous closure that counts as a click.
    pub prolonged_blink_ms: f64,
    /// Hover time that counts as a click.
    pub dwell_ms: f64,
    /// Anchor radius used when no target regions are registered.
    pub dwell_radius_px: f64,
    /// Quiet period after any trigger.
    pub lockout_ms: f64,
    /// No-face frames tolerated before output degrades.
    pub no_face_watchdog_frames: u32,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            prolonged_blink_ms: 700.0,
            dwell_ms: 2000.0,
            dwell_radius_px: 80.0,
            lockout_ms: 1500.0,
            no_face_watchdog_frames: 30,
        }
    }
}

// ── Target regions ──────────────────────────────────────────

/// Axis-aligned screen rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Edges inclusive.
    pub fn contains(&self, p: GazePoint) -> bool {
        p.x >= self.x && p.x <= self.x + self.w && p.y >= self.y && p.y <= self.y + self.h
    }
}

/// A clickable area registered by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetRegion {
    pub id: u32,
    pub rect: Rect,
}

/// What the gaze is hovering over.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HoverRegion {
    Target(u32),
    /// Circle of `dwell_radius_px` around where the dwell started.
    Anchor(GazePoint),
}

// ── State machines ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BlinkPhase {
    Open,
    /// `consumed` is set once the prolonged threshold has been crossed in
    /// this closure, whether or not it fired.
    Closed { elapsed_ms: f64, consumed: bool },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DwellPhase {
    Idle,
    Dwelling { region: HoverRegion, elapsed_ms: f64 },
}

// ── Per-cycle I/O ───────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct InteractionInput {
    /// Smoothed estimate. Ignored while frozen.
    pub point: GazePoint,
    pub blink: bool,
    pub face_detected: bool,
    /// A model is installed. Without one the output stays frozen and no
    /// trigger fires.
    pub calibrated: bool,
    /// Time since the previous cycle.
    pub dt_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InteractionOutput {
    /// Live coordinate, or the last known-good one while frozen.
    pub point: GazePoint,
    pub frozen: bool,
    /// No-face watchdog tripped.
    pub degraded: bool,
    pub prolonged_blink: bool,
    /// In [0, 1].
    pub dwell_progress: f64,
    pub dwell_complete: bool,
    /// Region the completed dwell was on.
    pub dwell_target: Option<u32>,
    pub lockout_active: bool,
    /// Watchdog edge this cycle, for filter resets upstream.
    pub watchdog: WatchdogEvent,
}

// ── Tracker ─────────────────────────────────────────────────

pub struct InteractionTracker {
    config: InteractionConfig,
    targets: Vec<TargetRegion>,
    blink: BlinkPhase,
    dwell: DwellPhase,
    lockout_remaining_ms: f64,
    last_good: GazePoint,
    health: TrackingHealth,
    stream_ms: f64,
}

impl InteractionTracker {
    /// `initial` is held until the first unfrozen cycle.
    pub fn new(config: InteractionConfig, initial: GazePoint) -> Self {
        let health = TrackingHealth::new(config.no_face_watchdog_frames);
        Self {
            config,
            targets: Vec::new(),
            blink: BlinkPhase::Open,
            dwell: DwellPhase::Idle,
            lockout_remaining_ms: 0.0,
            last_good: initial,
            health,
            stream_ms: 0.0,
        }
    }

    pub fn config(&self) -> &InteractionConfig {
        &self.config
    }

    pub fn blink_phase(&self) -> BlinkPhase {
        self.blink
    }

    pub fn dwell_phase(&self) -> DwellPhase {
        self.dwell
    }

    pub fn health(&self) -> &TrackingHealth {
        &self.health
    }

    pub fn last_good(&self) -> GazePoint {
        self.last_good
    }

    pub fn lockout_remaining_ms(&self) -> f64 {
        self.lockout_remaining_ms
    }

    /// Replace the registered targets. A dwell on a removed target ends.
    pub fn set_targets(&mut self, targets: Vec<TargetRegion>) {
        if let DwellPhase::Dwelling {
            region: HoverRegion::Target(id),
            ..
        } = self.dwell
        {
            if !targets.iter().any(|t| t.id == id) {
                self.dwell = DwellPhase::Idle;
            }
        }
        // anchors and targets don't mix
        if !targets.is_empty() {
            if let DwellPhase::Dwelling {
                region: HoverRegion::Anchor(_),
                ..
            } = self.dwell
            {
                self.dwell = DwellPhase::Idle;
            }
        }
        self.targets = targets;
    }

    /// Clear blink, dwell, lock-out and watchdog state. The held position
    /// is kept.
    pub fn reset(&mut self) {
        self.blink = BlinkPhase::Open;
        self.dwell = DwellPhase::Idle;
        self.lockout_remaining_ms = 0.0;
        self.health.reset();
        self.stream_ms = 0.0;
    }

    fn region_at(&self, point: GazePoint) -> Option<HoverRegion> {
        if !self.targets.is_empty() {
            return self
                .targets
                .iter()
                .find(|t| t.rect.contains(point))
                .map(|t| HoverRegion::Target(t.id));
        }
        match self.dwell {
            DwellPhase::Dwelling {
                region: HoverRegion::Anchor(anchor),
                ..
            } if anchor.distance_to(point) <= self.config.dwell_radius_px => {
                Some(HoverRegion::Anchor(anchor))
            }
            _ => Some(HoverRegion::Anchor(point)),
        }
    }

    fn start_lockout(&mut self) {
        self.lockout_remaining_ms = self.config.lockout_ms;
    }

    /// Advance the blink machine. Returns true when a prolonged blink fires.
    fn step_blink(&mut self, blink: bool, dt_ms: f64, lockout: bool) -> bool {
        match (self.blink, blink) {
            (BlinkPhase::Open, false) => false,
            (BlinkPhase::Open, true) => {
                self.blink = BlinkPhase::Closed {
                    elapsed_ms: 0.0,
                    consumed: false,
                };
                false
            }
            (BlinkPhase::Closed { .. }, false) => {
                self.blink = BlinkPhase::Open;
                false
            }
            (BlinkPhase::Closed { elapsed_ms, consumed }, true) => {
                let elapsed_ms = elapsed_ms + dt_ms;
                let crossed = !consumed && elapsed_ms >= self.config.prolonged_blink_ms;
                self.blink = BlinkPhase::Closed {
                    elapsed_ms,
                    consumed: consumed || crossed,
                };
                if crossed && lockout {
                    debug!(elapsed_ms, "Prolonged blink during lock-out ignored");
                }
                crossed && !lockout
            }
        }
    }

    /// Advance the dwell machine with a live point. Returns the completed
    /// region, if any.
    fn step_dwell(&mut self, point: GazePoint, dt_ms: f64, lockout: bool) -> Option<HoverRegion> {
        let Some(region) = self.region_at(point) else {
            self.dwell = DwellPhase::Idle;
            return None;
        };
        let elapsed_ms = match self.dwell {
            DwellPhase::Dwelling {
                region: current,
                elapsed_ms,
            } if current == region => {
                if lockout {
                    elapsed_ms
                } else {
                    elapsed_ms + dt_ms
                }
            }
            _ => 0.0,
        };
        if !lockout && elapsed_ms >= self.config.dwell_ms {
            self.dwell = DwellPhase::Dwelling {
                region,
                elapsed_ms: 0.0,
            };
            return Some(region);
        }
        self.dwell = DwellPhase::Dwelling { region, elapsed_ms };
        None
    }

    fn dwell_progress(&self) -> f64 {
        match self.dwell {
            DwellPhase::Idle => 0.0,
            DwellPhase::Dwelling { elapsed_ms, .. } => {
                if self.config.dwell_ms > 0.0 {
                    (elapsed_ms / self.config.dwell_ms).clamp(0.0, 1.0)
                } else {
                    0.0
                }
            }
        }
    }

    /// One cycle.
    pub fn update(&mut self, input: InteractionInput) -> InteractionOutput {
        let dt_ms = input.dt_ms.max(0.0);
        self.stream_ms += dt_ms;
        self.lockout_remaining_ms = (self.lockout_remaining_ms - dt_ms).max(0.0);
        let lockout = self.lockout_remaining_ms > 0.0;

        let watchdog = self.health.update(input.face_detected, self.stream_ms);
        let degraded = self.health.tracking_lost;
        let frozen = input.blink
            || !input.face_detected
            || !input.calibrated
            || !input.point.is_finite()
            || degraded;

        if !input.calibrated {
            self.blink = BlinkPhase::Open;
        }
        let mut prolonged_blink = false;
        if input.face_detected
            && input.calibrated
            && self.step_blink(input.blink, dt_ms, lockout)
        {
            prolonged_blink = true;
            info!("Prolonged blink click");
            self.start_lockout();
            if let DwellPhase::Dwelling { region, .. } = self.dwell {
                self.dwell = DwellPhase::Dwelling {
                    region,
                    elapsed_ms: 0.0,
                };
            }
        }

        let mut completed = None;
        if degraded {
            self.dwell = DwellPhase::Idle;
        } else if !frozen {
            self.last_good = input.point;
            completed = self.step_dwell(input.point, dt_ms, lockout);
            if let Some(region) = completed {
                info!(?region, "Dwell complete");
                self.start_lockout();
            }
        }

        InteractionOutput {
            point: self.last_good,
            frozen,
            degraded,
            prolonged_blink,
            dwell_progress: if completed.is_some() { 1.0 } else { self.dwell_progress() },
            dwell_complete: completed.is_some(),
            dwell_target: match completed {
                Some(HoverRegion::Target(id)) => Some(id),
                _ => None,
            },
            lockout_active: self.lockout_remaining_ms > 0.0,
            watchdog,
        }
    }
}
