//! Elapsed-time interval scheduling.
//!
//! Pure arithmetic over [`Duration`]: the capture loop polls far more often
//! than it captures, and the scheduler decides which polls qualify.

use std::time::Duration;

/// Decides whether "now" is a capture instant.
///
/// The next due time starts at zero, so the very first poll always
/// qualifies and a session always stores a frame at t=0. On every fire the
/// due time advances by the configured interval (additive, never reset to
/// the current elapsed time), so processing latency inside one tick does
/// not drift the whole schedule.
///
/// Safe to consult on every polling tick; a tick that does not qualify
/// leaves the scheduler untouched.
#[derive(Debug, Clone)]
pub struct IntervalScheduler {
    interval: Duration,
    next_due: Duration,
}

impl IntervalScheduler {
    /// Create a scheduler firing every `interval`, starting at t=0
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: Duration::ZERO,
        }
    }

    /// Returns true exactly when `elapsed` has reached the next due time,
    /// advancing the due time by one interval when it does.
    ///
    /// If polling stalled past several due times, subsequent calls keep
    /// returning true until the schedule catches up.
    pub fn should_capture(&mut self, elapsed: Duration) -> bool {
        if elapsed >= self.next_due {
            self.next_due += self.interval;
            true
        } else {
            false
        }
    }

    /// The elapsed time at which the next capture is due
    pub fn next_due(&self) -> Duration {
        self.next_due
    }
}
