//! Pool error types.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during pool operations.
///
/// Contract violations (double release, returning into a torn-down pool,
/// tearing down a pool with outstanding handles) are not represented here:
/// the ownership model makes them impossible to write.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// No idle resource became available before the wait deadline.
    #[error("pool exhausted: no idle resource within {0:?}")]
    Exhausted(Duration),

    /// The bounded-retry creation routine did not produce a valid resource.
    #[error("could not create a valid resource after {attempts} attempt(s)")]
    CreationFailed {
        /// Number of creation attempts made.
        attempts: usize,
    },

    /// Pool is closed.
    #[error("pool is closed")]
    Closed,

    /// Pool configuration error.
    #[error("pool configuration error: {0}")]
    Configuration(String),

    /// The blocking task serving an async borrow was cancelled.
    #[error("blocking borrow task failed: {0}")]
    BlockingTask(String),
}

impl PoolError {
    /// Check if this error is transient and the operation may succeed on retry.
    ///
    /// Exhaustion clears as soon as another caller returns a resource, and a
    /// creation failure from `borrow()` leaves the pool usable.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Exhausted(_) | Self::CreationFailed { .. })
    }
}
