//! Resource pool implementation.

use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::{self, Deadline};
use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::handle::{Handle, Release};
use crate::policy::Policy;
use crate::sync::{Invariant, Monitor};

/// A bounded pool of policy-managed resources.
///
/// The pool keeps up to `min_idle` resources ready ("heat"), lends them out
/// through [`PooledHandle`]s, takes them back when the handles are dropped,
/// and destroys idle resources beyond `max_idle` ("freeze"). `Pool` is a cheap
/// clone of a shared reference; every clone and every outstanding handle
/// refers to the same pool.
///
/// ```rust
/// use respool::{FnPolicy, Pool, PoolConfig};
///
/// let policy = FnPolicy::new(|| Some(Vec::<u8>::with_capacity(1024)))
///     .on_passivate(|buf: &mut Vec<u8>| buf.clear());
/// let pool = Pool::new(PoolConfig::new(4), policy)?;
///
/// let mut buf = pool.borrow()?;
/// buf.extend_from_slice(b"hello");
/// drop(buf); // returned to the pool, cleared
///
/// assert_eq!(pool.status().in_use, 0);
/// # Ok::<(), respool::PoolError>(())
/// ```
pub struct Pool<P: Policy> {
    inner: Arc<PoolInner<P>>,
}

/// A resource lent out by a [`Pool`]. Dropping it returns the resource.
pub type PooledHandle<P> = Handle<<P as Policy>::Resource, ReturnToPool<P>>;

/// Lifecycle state of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Initial resources are being created.
    Constructing,
    /// Serving borrows and returns.
    Ready,
    /// Closed while resources were still lent out; returns destroy them.
    Draining,
    /// Closed and holding no resources.
    Closed,
}

/// Status information about the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Number of idle resources available.
    pub idle: usize,
    /// Number of resources currently lent out.
    pub in_use: usize,
    /// Maximum number of resources, idle plus in use.
    pub capacity: usize,
    /// Lifecycle state.
    pub state: PoolState,
    /// Resources created over the pool's lifetime.
    pub created: u64,
    /// Resources destroyed over the pool's lifetime.
    pub destroyed: u64,
    /// Successful borrows.
    pub borrowed: u64,
    /// Resources returned by handles.
    pub returned: u64,
}

impl PoolStatus {
    /// Total number of live resources, idle plus in use.
    #[must_use]
    pub fn total(&self) -> usize {
        self.idle + self.in_use
    }
}

/// Release action of a [`PooledHandle`]: pushes the resource back to the
/// pool it was borrowed from.
pub struct ReturnToPool<P: Policy> {
    pool: Arc<PoolInner<P>>,
}

impl<P: Policy> ReturnToPool<P> {
    /// The pool this resource returns to.
    #[must_use]
    pub fn pool(&self) -> Pool<P> {
        Pool {
            inner: Arc::clone(&self.pool),
        }
    }
}

impl<P: Policy> Release<P::Resource> for ReturnToPool<P> {
    fn release(&mut self, resource: P::Resource) {
        self.pool.push(resource);
    }

    fn forget(&mut self) {
        self.pool.forget();
    }
}

impl<P: Policy> fmt::Debug for ReturnToPool<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReturnToPool").finish_non_exhaustive()
    }
}

impl<P: Policy> Handle<P::Resource, ReturnToPool<P>> {
    /// Detach the resource from the pool.
    ///
    /// The resource is not returned when the handle would have been dropped;
    /// the pool stops counting it as in use and the caller becomes
    /// responsible for closing it.
    pub fn detach(self) -> P::Resource {
        self.into_inner()
    }
}

struct Limits {
    capacity: usize,
    min_idle: usize,
    max_idle: usize,
}

/// Everything guarded by the pool lock.
struct Shared<R> {
    idle: VecDeque<R>,
    in_use: usize,
    state: PoolState,
    limits: Limits,
    created: u64,
    destroyed: u64,
    borrowed: u64,
    returned: u64,
}

impl<R> Shared<R> {
    fn new(config: &PoolConfig) -> Self {
        Self {
            idle: VecDeque::with_capacity(config.capacity),
            in_use: 0,
            state: PoolState::Constructing,
            limits: Limits {
                capacity: config.capacity,
                min_idle: config.min_idle,
                max_idle: config.max_idle,
            },
            created: 0,
            destroyed: 0,
            borrowed: 0,
            returned: 0,
        }
    }

    /// Capacity not taken by lent-out resources.
    fn free_capacity(&self) -> usize {
        self.limits.capacity.saturating_sub(self.in_use)
    }

    fn idle_window_ok(&self) -> bool {
        let idle = self.idle.len();
        (self.limits.min_idle <= idle && idle <= self.limits.max_idle)
            || self.free_capacity() < self.limits.min_idle
    }

    fn ensure_open(&self) -> Result<(), PoolError> {
        match self.state {
            PoolState::Ready => Ok(()),
            _ => Err(PoolError::Closed),
        }
    }

    fn status(&self) -> PoolStatus {
        PoolStatus {
            idle: self.idle.len(),
            in_use: self.in_use,
            capacity: self.limits.capacity,
            state: self.state,
            created: self.created,
            destroyed: self.destroyed,
            borrowed: self.borrowed,
            returned: self.returned,
        }
    }
}

impl<R> Invariant for Shared<R> {
    fn check(&self, site: &'static str) {
        let idle = self.idle.len();
        debug_assert!(
            self.in_use <= self.limits.capacity,
            "{site}: {} in use exceeds capacity {}",
            self.in_use,
            self.limits.capacity
        );
        debug_assert!(
            idle + self.in_use <= self.limits.capacity,
            "{site}: {idle} idle + {} in use exceeds capacity {}",
            self.in_use,
            self.limits.capacity
        );
        // The idle window is a sizing target, not a guarantee: a failed
        // replacement or a detach can leave it short until the next heat.
        if self.state == PoolState::Ready && !self.idle_window_ok() {
            tracing::debug!(
                site,
                idle,
                in_use = self.in_use,
                min_idle = self.limits.min_idle,
                max_idle = self.limits.max_idle,
                "idle count outside target window"
            );
        }
    }
}

struct PoolInner<P: Policy> {
    config: PoolConfig,
    policy: P,
    shared: Monitor<Shared<P::Resource>>,
}

impl<P: Policy> PoolInner<P> {
    /// Create a valid resource in at most `retry + 1` attempts.
    fn create(&self, shared: &mut Shared<P::Resource>) -> Result<P::Resource, PoolError> {
        let attempts = self.config.retry + 1;

        for attempt in 1..=attempts {
            let Some(resource) = self.policy.create() else {
                tracing::debug!(attempt, attempts, "resource creation returned nothing");
                continue;
            };
            shared.created += 1;

            let (resource, valid) =
                self.run_hook(shared, resource, |policy, resource| policy.validate(resource));
            if valid {
                return Ok(resource);
            }

            tracing::debug!(attempt, attempts, "freshly created resource is invalid");
            self.destroy(shared, resource);
        }

        tracing::warn!(attempts, "could not create a valid resource");
        Err(PoolError::CreationFailed { attempts })
    }

    fn destroy(&self, shared: &mut Shared<P::Resource>, resource: P::Resource) {
        self.policy.destroy(resource);
        shared.destroyed += 1;
    }

    /// Run a policy hook on a resource held by the pool. If the hook panics
    /// the resource is destroyed before the panic continues.
    fn run_hook<T>(
        &self,
        shared: &mut Shared<P::Resource>,
        mut resource: P::Resource,
        hook: impl FnOnce(&P, &mut P::Resource) -> T,
    ) -> (P::Resource, T) {
        match panic::catch_unwind(AssertUnwindSafe(|| hook(&self.policy, &mut resource))) {
            Ok(value) => (resource, value),
            Err(payload) => {
                tracing::warn!("policy hook panicked, destroying resource");
                self.destroy(shared, resource);
                panic::resume_unwind(payload)
            }
        }
    }

    /// Create idle resources toward `min_idle` without exceeding capacity.
    fn heat(&self, shared: &mut Shared<P::Resource>) -> Result<(), PoolError> {
        let idle = shared.idle.len();
        let lack = shared
            .limits
            .min_idle
            .saturating_sub(idle)
            .min(shared.free_capacity().saturating_sub(idle));

        if lack == 0 {
            return Ok(());
        }

        tracing::debug!(lack, idle, in_use = shared.in_use, "heating idle resources");
        for _ in 0..lack {
            let resource = self.create(shared)?;
            shared.idle.push_back(resource);
        }
        Ok(())
    }

    /// Destroy the oldest idle resources beyond `max_idle`.
    fn freeze(&self, shared: &mut Shared<P::Resource>) {
        let excess = shared.idle.len().saturating_sub(shared.limits.max_idle);
        if excess == 0 {
            return;
        }

        tracing::debug!(excess, "freezing excess idle resources");
        for _ in 0..excess {
            if let Some(resource) = shared.idle.pop_front() {
                self.destroy(shared, resource);
            }
        }
    }

    /// One non-blocking attempt at taking a resource out of the idle queue.
    fn try_take(&self, shared: &mut Shared<P::Resource>) -> Result<Option<P::Resource>, PoolError> {
        shared.ensure_open()?;

        if shared.idle.is_empty() && shared.in_use < shared.limits.capacity {
            // Nothing idle yet room to grow; happens with `min_idle = 0` or
            // after a failed replacement.
            let resource = self.create(shared)?;
            shared.idle.push_back(resource);
        }

        match shared.idle.pop_front() {
            Some(resource) => self.checkout(shared, resource).map(Some),
            None => Ok(None),
        }
    }

    /// Validate (or replace) and activate a resource leaving the idle queue.
    fn checkout(
        &self,
        shared: &mut Shared<P::Resource>,
        resource: P::Resource,
    ) -> Result<P::Resource, PoolError> {
        let (mut resource, valid) =
            self.run_hook(shared, resource, |policy, resource| policy.validate(resource));
        if !valid {
            tracing::debug!("idle resource failed validation, replacing it");
            self.destroy(shared, resource);
            resource = self.create(shared)?;
        }

        let (resource, ()) =
            self.run_hook(shared, resource, |policy, resource| policy.activate(resource));
        shared.in_use += 1;
        shared.borrowed += 1;

        match panic::catch_unwind(AssertUnwindSafe(|| self.heat(shared))) {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                tracing::warn!(%error, "could not heat idle resources after borrow");
            }
            Err(payload) => {
                // The borrow never completed: give the slot back.
                shared.in_use -= 1;
                shared.borrowed -= 1;
                tracing::warn!("policy hook panicked while heating, destroying borrowed resource");
                self.destroy(shared, resource);
                panic::resume_unwind(payload);
            }
        }

        Ok(resource)
    }

    fn push(&self, mut resource: P::Resource) {
        let passivated =
            panic::catch_unwind(AssertUnwindSafe(|| self.policy.passivate(&mut resource)));

        {
            let mut shared = self.shared.lock("push");
            debug_assert!(shared.in_use > 0, "resource returned to a pool with none lent out");
            shared.in_use = shared.in_use.saturating_sub(1);
            shared.returned += 1;

            let open = matches!(shared.state, PoolState::Constructing | PoolState::Ready);
            if open && passivated.is_ok() {
                shared.idle.push_back(resource);
                self.freeze(&mut shared);
                tracing::trace!(idle = shared.idle.len(), "resource returned to pool");
            } else {
                if passivated.is_err() {
                    tracing::warn!("passivate panicked, destroying returned resource");
                }
                self.destroy(&mut shared, resource);
                if shared.state == PoolState::Draining && shared.in_use == 0 {
                    shared.state = PoolState::Closed;
                    tracing::info!("resource pool drained");
                }
            }
        }

        self.shared.notify_one();

        if let Err(payload) = passivated {
            panic::resume_unwind(payload);
        }
    }

    fn forget(&self) {
        {
            let mut shared = self.shared.lock("detach");
            shared.in_use = shared.in_use.saturating_sub(1);
            if shared.state == PoolState::Draining && shared.in_use == 0 {
                shared.state = PoolState::Closed;
            }
            tracing::debug!(in_use = shared.in_use, "resource detached from pool");
        }

        // The freed slot lets a waiter create a fresh resource.
        self.shared.notify_one();
    }
}

impl<P: Policy> Drop for PoolInner<P> {
    fn drop(&mut self) {
        let PoolInner { policy, shared, .. } = self;
        let shared = shared.get_mut();

        debug_assert_eq!(shared.in_use, 0, "pool torn down with resources lent out");

        let count = shared.idle.len();
        while let Some(resource) = shared.idle.pop_front() {
            policy.destroy(resource);
        }
        if count > 0 {
            tracing::debug!(count, "destroyed idle resources at pool teardown");
        }
    }
}

impl<P: Policy> Pool<P> {
    /// Create a pool and heat it with `min(min_idle, capacity)` resources.
    ///
    /// Fails with [`PoolError::CreationFailed`] if any of the initial
    /// resources could not be created within `retry + 1` attempts; resources
    /// created before the failure are destroyed.
    pub fn new(config: PoolConfig, policy: P) -> Result<Self, PoolError> {
        config.validate()?;

        let inner = PoolInner {
            shared: Monitor::new(Shared::new(&config)),
            config,
            policy,
        };

        {
            let mut shared = inner.shared.lock("construct");
            if let Err(error) = inner.heat(&mut shared) {
                tracing::error!(%error, "failed to heat resource pool");
                return Err(error);
            }
            shared.state = PoolState::Ready;
        }

        tracing::info!(
            capacity = inner.config.capacity,
            min_idle = inner.config.min_idle,
            max_idle = inner.config.max_idle,
            retry = inner.config.retry,
            wait_ms = clock::millis(inner.config.wait),
            "resource pool created"
        );

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Borrow a resource, waiting up to the configured `wait`.
    ///
    /// An idle resource is validated (and replaced if invalid) and activated
    /// before it is handed out. If nothing is idle and the pool is at
    /// capacity, the call blocks until a resource is returned or the wait
    /// expires with [`PoolError::Exhausted`].
    pub fn borrow(&self) -> Result<PooledHandle<P>, PoolError> {
        self.borrow_timeout(self.inner.config.wait)
    }

    /// Borrow a resource, waiting up to `wait` instead of the configured value.
    pub fn borrow_timeout(&self, wait: Duration) -> Result<PooledHandle<P>, PoolError> {
        let span = tracing::debug_span!("pool.borrow", wait_ms = clock::millis(wait));
        let _enter = span.enter();

        let deadline = Deadline::after(wait);
        let mut shared = self.inner.shared.lock("borrow");

        loop {
            if let Some(resource) = self.inner.try_take(&mut shared)? {
                tracing::trace!(in_use = shared.in_use, "resource borrowed");
                drop(shared);
                return Ok(self.bind(resource));
            }

            if deadline.is_expired() {
                tracing::warn!(
                    elapsed_ms = clock::millis(deadline.elapsed()),
                    in_use = shared.in_use,
                    "pool exhausted"
                );
                return Err(PoolError::Exhausted(wait));
            }

            tracing::trace!(
                remaining_ms = clock::millis(deadline.remaining()),
                "waiting for a returned resource"
            );
            shared.wait_until(deadline.instant());
        }
    }

    /// Borrow a resource only if one can be had without waiting.
    pub fn try_borrow(&self) -> Result<Option<PooledHandle<P>>, PoolError> {
        let mut shared = self.inner.shared.lock("try_borrow");
        let resource = self.inner.try_take(&mut shared)?;
        drop(shared);
        Ok(resource.map(|resource| self.bind(resource)))
    }

    fn bind(&self, resource: P::Resource) -> PooledHandle<P> {
        Handle::new(
            resource,
            ReturnToPool {
                pool: Arc::clone(&self.inner),
            },
        )
    }

    /// Get the current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        self.inner.shared.lock("status").status()
    }

    /// Close the pool.
    ///
    /// Idle resources are destroyed now, waiting borrowers fail with
    /// [`PoolError::Closed`], and resources still lent out are destroyed as
    /// they come back.
    pub fn close(&self) {
        {
            let mut shared = self.inner.shared.lock("close");
            if matches!(shared.state, PoolState::Draining | PoolState::Closed) {
                return;
            }

            shared.state = if shared.in_use == 0 {
                PoolState::Closed
            } else {
                PoolState::Draining
            };

            while let Some(resource) = shared.idle.pop_front() {
                self.inner.destroy(&mut shared, resource);
            }
            tracing::info!(in_use = shared.in_use, "resource pool closed");
        }

        self.inner.shared.notify_all();
    }

    /// Check if the pool is closed (or draining toward closed).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self.status().state, PoolState::Draining | PoolState::Closed)
    }

    /// Get the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Get the pool's policy.
    #[must_use]
    pub fn policy(&self) -> &P {
        &self.inner.policy
    }
}

impl<P> Pool<P>
where
    P: Policy + 'static,
    P::Resource: 'static,
{
    /// Borrow a resource from async code.
    ///
    /// The blocking wait runs on Tokio's blocking thread pool so the calling
    /// task's worker thread stays free. A panic in a policy hook is resumed
    /// on the awaiting task.
    pub async fn borrow_async(&self) -> Result<PooledHandle<P>, PoolError> {
        let pool = self.clone();
        match tokio::task::spawn_blocking(move || pool.borrow()).await {
            Ok(result) => result,
            Err(error) if error.is_panic() => std::panic::resume_unwind(error.into_panic()),
            Err(error) => Err(PoolError::BlockingTask(error.to_string())),
        }
    }
}

impl<P: Policy> Clone for Pool<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: Policy> fmt::Debug for Pool<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.inner.config)
            .field("status", &self.status())
            .finish()
    }
}
