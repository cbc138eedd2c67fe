//! Live sampling configuration
//!
//! [`SamplingControl`] is the monitor shared between the control thread and
//! the sampling engine. The interval and the shutdown request sit behind a
//! mutex paired with a condition variable: every change notifies, and the
//! engine re-derives its deadline from the current interval on every wake,
//! so a rate change lands on the wait already in progress. The collecting
//! flag is a plain atomic read once per tick.

use crate::error::{LoadFrameError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Shortest sampling interval (200 Hz)
pub const MIN_INTERVAL: Duration = Duration::from_millis(5);

/// Remaining waits shorter than this are skipped rather than slept
pub const MIN_DELAY: Duration = Duration::from_millis(5);

/// Interval used until the operator picks a rate (2 Hz)
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

/// Parse operator-entered rate text in Hz
pub fn parse_rate(text: &str) -> Result<f64> {
    let trimmed = text.trim();
    trimmed
        .parse::<f64>()
        .map_err(|_| LoadFrameError::InvalidRateInput(format!("'{}' is not a number", trimmed)))
}

/// Convert a rate in Hz to a sampling interval, clamped to [`MIN_INTERVAL`]
///
/// Zero, negative and non-finite rates are rejected.
pub fn interval_from_rate(rate_hz: f64) -> Result<Duration> {
    if !rate_hz.is_finite() || rate_hz <= 0.0 {
        return Err(LoadFrameError::InvalidRateInput(format!(
            "sample rate must be a positive number of Hz, got {}",
            rate_hz
        )));
    }
    let interval = Duration::try_from_secs_f64(1.0 / rate_hz).map_err(|_| {
        LoadFrameError::InvalidRateInput(format!("sample rate {} Hz is too slow", rate_hz))
    })?;
    Ok(interval.max(MIN_INTERVAL))
}

/// What the engine should do before its next tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Tick now; the value is the deadline to schedule the following tick from
    Tick(Instant),
    /// Sleep (interruptibly) for this long, then re-plan
    Sleep(Duration),
}

/// Plan the wait for the tick after `previous`, given the current interval
///
/// The deadline is `previous + interval`. A remaining wait under
/// [`MIN_DELAY`] is not slept. When the loop has fallen more than a whole
/// interval behind, the schedule restarts from `now` instead of firing a
/// burst of catch-up ticks.
pub fn plan_wait(previous: Instant, interval: Duration, now: Instant) -> Wait {
    let deadline = previous + interval;
    let remaining = deadline.saturating_duration_since(now);
    if remaining >= MIN_DELAY {
        return Wait::Sleep(remaining);
    }
    if now.saturating_duration_since(deadline) > interval {
        Wait::Tick(now)
    } else {
        Wait::Tick(deadline)
    }
}

#[derive(Debug)]
struct ControlState {
    interval: Duration,
    shutdown: bool,
}

/// Monitor guarding the sampling configuration of one engine
#[derive(Debug)]
pub struct SamplingControl {
    state: Mutex<ControlState>,
    wake: Condvar,
    collecting: AtomicBool,
}

impl Default for SamplingControl {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL, false)
    }
}

impl SamplingControl {
    /// Create a control block; `interval` is clamped to [`MIN_INTERVAL`]
    pub fn new(interval: Duration, collecting: bool) -> Self {
        Self {
            state: Mutex::new(ControlState {
                interval: interval.max(MIN_INTERVAL),
                shutdown: false,
            }),
            wake: Condvar::new(),
            collecting: AtomicBool::new(collecting),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current sampling interval
    pub fn interval(&self) -> Duration {
        self.lock().interval
    }

    /// Replace the interval and wake the engine, returning the applied value
    pub fn set_interval(&self, interval: Duration) -> Duration {
        let interval = interval.max(MIN_INTERVAL);
        self.lock().interval = interval;
        self.wake.notify_all();
        tracing::debug!("Sampling interval set to {:?}", interval);
        interval
    }

    /// Validate `rate_hz` and apply it; an invalid rate leaves the interval as is
    pub fn set_rate_hz(&self, rate_hz: f64) -> Result<Duration> {
        let interval = interval_from_rate(rate_hz)?;
        Ok(self.set_interval(interval))
    }

    /// Whether ticks are appended to the run buffer
    pub fn is_collecting(&self) -> bool {
        self.collecting.load(Ordering::Acquire)
    }

    /// Turn collection on or off, returning the previous state
    pub fn set_collecting(&self, collecting: bool) -> bool {
        self.collecting.swap(collecting, Ordering::AcqRel)
    }

    /// Flip collection, returning the new state
    pub fn toggle_collecting(&self) -> bool {
        !self.collecting.fetch_xor(true, Ordering::AcqRel)
    }

    /// Ask the engine to stop and wake it if it is waiting
    pub fn request_shutdown(&self) {
        self.lock().shutdown = true;
        self.wake.notify_all();
    }

    /// Whether a shutdown has been requested
    pub fn is_shutdown(&self) -> bool {
        self.lock().shutdown
    }

    /// Block until the tick after `previous` is due
    ///
    /// Returns the deadline of the tick that is now due, or `None` once a
    /// shutdown has been requested. Wakes on every notification and
    /// recomputes the deadline from the interval in effect at that moment.
    pub fn wait_next_tick(&self, previous: Instant) -> Option<Instant> {
        let mut state = self.lock();
        loop {
            if state.shutdown {
                return None;
            }
            match plan_wait(previous, state.interval, Instant::now()) {
                Wait::Tick(deadline) => return Some(deadline),
                Wait::Sleep(remaining) => {
                    let (guard, _) = self
                        .wake
                        .wait_timeout(state, remaining)
                        .unwrap_or_else(PoisonError::into_inner);
                    state = guard;
                }
            }
        }
    }
}
