//! Tick/timeout polling shared by the supervisor and the singleton helper.
//!
//! A poll runs a check on a fixed tick grid measured from the moment polling
//! starts, and gives up once the deadline passes. When a tick and the deadline
//! coincide the deadline wins. Ticks missed because a check ran long are
//! dropped rather than replayed.

use std::time::Duration;

use crate::clock::Clock;
use crate::error::Result;

/// Tick interval and overall bound of a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    /// Time between two checks.
    pub interval: Duration,
    /// Total time allowed before giving up.
    pub timeout: Duration,
}

impl PollSchedule {
    /// Creates a schedule.
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Result of one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Poll<T> {
    /// Polling is over with this value.
    Ready(T),
    /// Check again on the next tick.
    Pending,
}

/// Runs `check` on every tick until it is ready or the schedule times out.
///
/// Returns `Ok(None)` on timeout. Errors from `check` end polling at once.
pub fn poll_until<T, F>(clock: &dyn Clock, schedule: PollSchedule, mut check: F) -> Result<Option<T>>
where
    F: FnMut() -> Result<Poll<T>>,
{
    let start = clock.now();
    let deadline = start + schedule.timeout;
    let interval = schedule.interval.max(Duration::from_millis(1));
    let mut next_tick = start + interval;

    loop {
        let now = clock.now();
        if next_tick >= deadline {
            clock.sleep(deadline.saturating_duration_since(now));
            return Ok(None);
        }
        clock.sleep(next_tick.saturating_duration_since(now));

        if let Poll::Ready(value) = check()? {
            return Ok(Some(value));
        }

        let now = clock.now();
        while next_tick <= now {
            next_tick += interval;
        }
    }
}
