//! Scoped locking over invariant-carrying state.
//!
//! A [`Monitor`] pairs a `parking_lot` mutex with a condition variable. Every
//! [`MonitorGuard`] checks the protected state's invariants when the lock is
//! acquired and again right before it is released, including around waits.

use std::ops::{Deref, DerefMut};
use std::time::Instant;

use parking_lot::{Condvar, Mutex, MutexGuard};

/// State whose invariants must hold whenever nobody holds the lock.
pub(crate) trait Invariant {
    /// Check the invariants; `site` names the critical section for diagnostics.
    fn check(&self, site: &'static str);
}

/// Mutex plus condition variable guarding one piece of state.
pub(crate) struct Monitor<T> {
    state: Mutex<T>,
    available: Condvar,
}

impl<T: Invariant> Monitor<T> {
    pub(crate) fn new(state: T) -> Self {
        Self {
            state: Mutex::new(state),
            available: Condvar::new(),
        }
    }

    /// Acquire the lock. It is released when the guard goes out of scope.
    pub(crate) fn lock(&self, site: &'static str) -> MonitorGuard<'_, T> {
        let guard = self.state.lock();
        guard.check(site);
        MonitorGuard {
            guard,
            available: &self.available,
            site,
        }
    }

    /// Wake a single waiter.
    pub(crate) fn notify_one(&self) {
        self.available.notify_one();
    }

    /// Wake every waiter.
    pub(crate) fn notify_all(&self) {
        self.available.notify_all();
    }

    /// Unwrap the state without locking; requires exclusive access.
    pub(crate) fn get_mut(&mut self) -> &mut T {
        self.state.get_mut()
    }
}

/// Scoped lock over a [`Monitor`]'s state.
pub(crate) struct MonitorGuard<'a, T: Invariant> {
    guard: MutexGuard<'a, T>,
    available: &'a Condvar,
    site: &'static str,
}

impl<T: Invariant> MonitorGuard<'_, T> {
    /// Release the lock until notified or `deadline` passes, then reacquire it.
    ///
    /// Returns `true` if the wait timed out. Spurious wake-ups are possible,
    /// so callers re-check their condition in a loop.
    pub(crate) fn wait_until(&mut self, deadline: Instant) -> bool {
        self.guard.check(self.site);
        let timed_out = self
            .available
            .wait_until(&mut self.guard, deadline)
            .timed_out();
        self.guard.check(self.site);
        timed_out
    }
}

impl<T: Invariant> Deref for MonitorGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T: Invariant> DerefMut for MonitorGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T: Invariant> Drop for MonitorGuard<'_, T> {
    fn drop(&mut self) {
        // A policy hook may have panicked mid-section.
        if std::thread::panicking() {
            return;
        }
        self.guard.check(self.site);
    }
}
