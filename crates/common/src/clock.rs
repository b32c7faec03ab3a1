//! Playback timing utilities.
//!
//! Preview hosts drive the playhead from a cooperative per-frame tick.
//! [`FrameClock`] converts monotonic tick timestamps into the per-frame
//! delta fed to the timeline, clamped so that a stalled frame (tab in the
//! background, debugger pause) never makes the playhead jump.

use std::time::Instant;

/// Upper bound for a single playback step, in seconds.
pub const MAX_FRAME_DELTA_SECS: f64 = 0.1;

/// Clamp a raw frame delta to `[0, MAX_FRAME_DELTA_SECS]`.
///
/// Non-finite input is treated as no progress.
pub fn clamp_frame_delta(delta_secs: f64) -> f64 {
    if !delta_secs.is_finite() {
        return 0.0;
    }
    delta_secs.clamp(0.0, MAX_FRAME_DELTA_SECS)
}

/// Converts tick timestamps into clamped per-frame deltas.
#[derive(Debug, Clone, Default)]
pub struct FrameClock {
    last_tick_ns: Option<u64>,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a tick at `now_ns` and return the clamped delta in seconds.
    /// The first tick after construction or [`FrameClock::reset`] yields 0.
    pub fn tick(&mut self, now_ns: u64) -> f64 {
        let delta = match self.last_tick_ns {
            None => 0.0,
            Some(last) => ns_to_secs(now_ns.saturating_sub(last)),
        };
        self.last_tick_ns = Some(now_ns);
        clamp_frame_delta(delta)
    }

    /// Forget the previous tick, e.g. when playback pauses.
    pub fn reset(&mut self) {
        self.last_tick_ns = None;
    }
}

/// A [`FrameClock`] anchored to a monotonic [`Instant`].
#[derive(Debug, Clone)]
pub struct MonotonicFrameClock {
    epoch: Instant,
    clock: FrameClock,
}

impl MonotonicFrameClock {
    /// Create a clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            clock: FrameClock::new(),
        }
    }

    /// Tick using the current monotonic time.
    pub fn tick(&mut self) -> f64 {
        let now_ns = self.epoch.elapsed().as_nanos() as u64;
        self.clock.tick(now_ns)
    }

    pub fn reset(&mut self) {
        self.clock.reset();
    }
}

/// Convert nanoseconds to seconds.
pub fn ns_to_secs(ns: u64) -> f64 {
    ns as f64 / 1_000_000_000.0
}

/// Convert seconds to nanoseconds. Negative input saturates to 0.
pub fn secs_to_ns(secs: f64) -> u64 {
    (secs.max(0.0) * 1_000_000_000.0) as u64
}
