//! Clock abstraction for the gaze loop.
//!
//! The loop derives per-cycle `dt` and event timestamps from a `Clock`.
//! Production uses `SystemClock`; tests drive `TestClock` by hand so dwell
//! and blink timing is deterministic.

use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime};

/// Time source for the gaze loop.
pub trait Clock: Send + Sync {
    /// Monotonic instant used for frame deltas.
    fn now(&self) -> Instant;

    /// Wall-clock milliseconds since UNIX epoch, stamped on emitted events.
    fn unix_millis(&self) -> i64;

    /// Wait out the rest of a frame interval. `TestClock` just advances,
    /// which makes trace replay run at virtual frame rate.
    fn sleep(&self, duration: Duration);
}

fn system_unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Real time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_millis(&self) -> i64 {
        system_unix_millis()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Manually advanced clock.
pub struct TestClock {
    inner: Mutex<(Instant, i64)>,
}

impl TestClock {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new((Instant::now(), system_unix_millis())),
        }
    }

    /// Advance both the monotonic and wall-clock readings.
    pub fn advance(&self, duration: Duration) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.0 += duration;
        guard.1 += duration.as_millis() as i64;
    }

    /// Convenience for frame-stepped tests.
    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).0
    }

    fn unix_millis(&self) -> i64 {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).1
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
