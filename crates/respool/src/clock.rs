//! Monotonic time source for wait deadlines.

use std::time::{Duration, Instant};

/// Stand-in expiry for waits too long to represent as an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(u32::MAX as u64);

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
#[must_use]
pub fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// A point in time after which a wait gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    started: Instant,
    at: Instant,
}

impl Deadline {
    /// Create a deadline `wait` from now.
    ///
    /// A `wait` that overflows the clock (such as `Duration::MAX`) expires
    /// roughly 136 years from now.
    #[must_use]
    pub fn after(wait: Duration) -> Self {
        let started = Instant::now();
        let at = started
            .checked_add(wait)
            .or_else(|| started.checked_add(FAR_FUTURE))
            .unwrap_or(started);
        Self { started, at }
    }

    /// The instant at which the deadline expires.
    #[must_use]
    pub fn instant(&self) -> Instant {
        self.at
    }

    /// Time left until expiry, zero once expired.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// Whether the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Time since the deadline was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}
