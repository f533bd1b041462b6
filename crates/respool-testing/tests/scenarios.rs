//! Pool lifecycle scenarios driven by the counting fake policy.
//!
//! Run with:
//!
//! ```bash
//! cargo test -p respool-testing --test scenarios
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::{Duration, Instant};

use respool::{Policy, Pool, PoolConfig, PoolError, PoolState};
use respool_testing::{CallCounts, CountingPolicy, Event, FactoryMode};

const CAPACITY: usize = 10;
const MIN_IDLE: usize = 2;
const RETRY: usize = 2;
const WAIT: Duration = Duration::from_millis(100);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn config() -> PoolConfig {
    PoolConfig::new(CAPACITY)
        .min_idle(MIN_IDLE)
        .max_idle(CAPACITY)
        .retry(RETRY)
        .wait(WAIT)
}

fn counting_pool(mode: FactoryMode) -> (Result<Pool<CountingPolicy>, PoolError>, CountingPolicy) {
    init_tracing();
    let policy = CountingPolicy::new(mode);
    let probe = policy.clone();
    (Pool::new(config(), policy), probe)
}

// =============================================================================
// Construction
// =============================================================================

#[test]
fn test_happy_path_counts() {
    let (pool, probe) = counting_pool(FactoryMode::Valid);
    let pool = pool.expect("pool should construct");

    assert_eq!(
        probe.counts(),
        CallCounts {
            created: MIN_IDLE,
            validated: MIN_IDLE,
            ..CallCounts::default()
        }
    );

    {
        let conn = pool.borrow().expect("borrow should succeed");
        assert_eq!(conn.activations, 1);

        let counts = probe.counts();
        assert_eq!(counts.created, MIN_IDLE + 1);
        // One more validation for the borrowed resource itself.
        assert_eq!(counts.validated, MIN_IDLE + 2);
        assert_eq!(counts.activated, 1);
        assert_eq!(counts.passivated, 0);
        assert_eq!(counts.destroyed, 0);
        assert_eq!(pool.status().in_use, 1);
    }

    let counts = probe.counts();
    assert_eq!(counts.created, MIN_IDLE + 1);
    assert_eq!(counts.validated, MIN_IDLE + 2);
    assert_eq!(counts.activated, 1);
    assert_eq!(counts.passivated, 1);
    assert_eq!(counts.destroyed, 0);
    assert_eq!(pool.status().in_use, 0);

    drop(pool);
    assert_eq!(probe.counts().destroyed, MIN_IDLE + 1);
}

#[test]
fn test_construction_fails_when_factory_returns_nothing() {
    let (pool, probe) = counting_pool(FactoryMode::Absent);

    match pool {
        Err(PoolError::CreationFailed { attempts }) => assert_eq!(attempts, RETRY + 1),
        other => panic!("expected CreationFailed, got {other:?}"),
    }

    assert_eq!(
        probe.counts(),
        CallCounts {
            created: RETRY + 1,
            ..CallCounts::default()
        }
    );
}

#[test]
fn test_construction_fails_when_every_resource_is_invalid() {
    let (pool, probe) = counting_pool(FactoryMode::Invalid);
    assert!(matches!(pool, Err(PoolError::CreationFailed { .. })));

    let counts = probe.counts();
    assert_eq!(counts.created, RETRY + 1);
    assert_eq!(counts.validated, RETRY + 1);
    assert_eq!(counts.destroyed, RETRY + 1);
    assert_eq!(counts.activated + counts.passivated, 0);

    // Each invalid resource is destroyed before the next attempt.
    assert_eq!(
        probe.events(),
        vec![
            Event::Created(Some(0)),
            Event::Validated(0, false),
            Event::Destroyed(0),
            Event::Created(Some(1)),
            Event::Validated(1, false),
            Event::Destroyed(1),
            Event::Created(Some(2)),
            Event::Validated(2, false),
            Event::Destroyed(2),
        ]
    );
}

#[test]
fn test_failed_construction_destroys_heated_resources() {
    init_tracing();
    let policy = CountingPolicy::new(FactoryMode::Valid);
    let probe = policy.clone();

    // Succeeds for the first slot only: switch the factory once a resource
    // has been validated.
    struct FlipAfterFirst(CountingPolicy);

    impl Policy for FlipAfterFirst {
        type Resource = respool_testing::FakeResource;

        fn create(&self) -> Option<Self::Resource> {
            self.0.create()
        }

        fn validate(&self, resource: &mut Self::Resource) -> bool {
            let ok = self.0.validate(resource);
            self.0.set_mode(FactoryMode::Absent);
            ok
        }

        fn destroy(&self, resource: Self::Resource) {
            self.0.destroy(resource);
        }
    }

    let result = Pool::new(config(), FlipAfterFirst(policy));
    assert!(matches!(result, Err(PoolError::CreationFailed { .. })));
    assert_eq!(probe.destroyed_ids(), vec![0]);
}

#[test]
fn test_initial_idle_is_min_of_min_idle_and_capacity() {
    init_tracing();
    for (capacity, min_idle) in [(1, 1), (5, 0), (5, 3), (5, 5), (3, 8), (20, 2)] {
        let policy = CountingPolicy::default();
        let config = PoolConfig::new(capacity)
            .min_idle(min_idle)
            .max_idle(min_idle.max(capacity));
        let pool = Pool::new(config, policy).unwrap();

        let status = pool.status();
        assert_eq!(status.idle, min_idle.min(capacity), "capacity {capacity}, min_idle {min_idle}");
        assert_eq!(status.in_use, 0);
        assert_eq!(status.state, PoolState::Ready);
    }
}

// =============================================================================
// Borrow and return
// =============================================================================

#[test]
fn test_exhausted_pool_times_out() {
    let (pool, probe) = counting_pool(FactoryMode::Valid);
    let pool = pool.unwrap();

    let mut all = Vec::new();
    for _ in 0..CAPACITY {
        all.push(pool.borrow().unwrap());
    }

    let counts = probe.counts();
    assert_eq!(counts.created, CAPACITY);
    assert_eq!(counts.validated, CAPACITY * 2);
    assert_eq!(counts.activated, CAPACITY);
    assert_eq!(counts.passivated, 0);
    assert_eq!(counts.destroyed, 0);

    let start = Instant::now();
    let result = pool.borrow();
    let elapsed = start.elapsed();

    assert!(matches!(result, Err(PoolError::Exhausted(wait)) if wait == WAIT));
    assert!(elapsed >= WAIT, "gave up too early: {elapsed:?}");
    assert!(elapsed < WAIT * 2, "waited too long: {elapsed:?}");

    drop(all.pop());
    let counts = probe.counts();
    assert_eq!(counts.passivated, 1);
    assert_eq!(counts.destroyed, 0);

    {
        let _conn = pool.borrow().unwrap();
        let counts = probe.counts();
        assert_eq!(counts.created, CAPACITY);
        assert_eq!(counts.validated, CAPACITY * 2 + 1);
        assert_eq!(counts.activated, CAPACITY + 1);
        assert_eq!(counts.passivated, 1);

        all.clear();
    }

    drop(pool);
    let counts = probe.counts();
    assert_eq!(counts.created, CAPACITY);
    assert_eq!(counts.validated, CAPACITY * 2 + 1);
    assert_eq!(counts.activated + counts.passivated, 2 * (CAPACITY + 1));
    assert_eq!(counts.destroyed, CAPACITY);
}

#[test]
fn test_borrow_release_restores_in_use_and_passivates_once() {
    let (pool, probe) = counting_pool(FactoryMode::Valid);
    let pool = pool.unwrap();

    let held = pool.borrow().unwrap();
    let before = pool.status().in_use;
    let passivated_before = probe.counts().passivated;

    let conn = pool.borrow().unwrap();
    assert_eq!(pool.status().in_use, before + 1);
    drop(conn);

    assert_eq!(pool.status().in_use, before);
    assert_eq!(probe.counts().passivated, passivated_before + 1);
    drop(held);
}

#[test]
fn test_borrow_fails_after_retry_when_validation_always_fails() {
    let (pool, probe) = counting_pool(FactoryMode::Valid);
    let pool = pool.unwrap();

    probe.reject_all(true);
    probe.reset_events();

    let result = pool.borrow();
    assert!(matches!(result, Err(PoolError::CreationFailed { attempts }) if attempts == RETRY + 1));

    // The idle resource (0) is destroyed, then 2, 3 and 4 are each created,
    // rejected and destroyed in turn.
    assert_eq!(
        probe.events(),
        vec![
            Event::Validated(0, false),
            Event::Destroyed(0),
            Event::Created(Some(2)),
            Event::Validated(2, false),
            Event::Destroyed(2),
            Event::Created(Some(3)),
            Event::Validated(3, false),
            Event::Destroyed(3),
            Event::Created(Some(4)),
            Event::Validated(4, false),
            Event::Destroyed(4),
        ]
    );
    assert_eq!(probe.counts().created, RETRY + 1);

    // The pool stays usable once resources validate again.
    let status = pool.status();
    assert_eq!(status.in_use, 0);
    assert_eq!(status.state, PoolState::Ready);

    probe.reject_all(false);
    let conn = pool.borrow().unwrap();
    assert_eq!(conn.id, 1);
}

#[test]
fn test_release_at_max_idle_destroys_oldest() {
    init_tracing();
    let policy = CountingPolicy::default();
    let probe = policy.clone();
    let config = PoolConfig::new(4).min_idle(2).max_idle(2).wait(WAIT);
    let pool = Pool::new(config, policy).unwrap();

    // Idle holds [0, 1]; borrowing 0 heats 2 in, leaving [1, 2].
    let conn = pool.borrow().unwrap();
    assert_eq!(conn.id, 0);
    assert_eq!(pool.status().idle, 2);

    drop(conn);
    assert_eq!(probe.destroyed_ids(), vec![1]);
    assert_eq!(pool.status().idle, 2);

    // The returned resource went to the back of the queue.
    let next = pool.borrow().unwrap();
    assert_eq!(next.id, 2);
}

#[test]
fn test_freeze_trims_to_max_idle() {
    init_tracing();
    let policy = CountingPolicy::default();
    let probe = policy.clone();
    let config = PoolConfig::new(6).min_idle(1).max_idle(3).wait(WAIT);
    let pool = Pool::new(config, policy).unwrap();

    let held: Vec<_> = (0..6).map(|_| pool.borrow().unwrap()).collect();
    assert_eq!(pool.status().idle, 0);

    let mut returned = 0;
    for conn in held {
        drop(conn);
        returned += 1;

        let idle = pool.status().idle;
        assert!(idle <= 3);
        assert_eq!(idle, returned.min(3));
    }

    // Six returned, three kept: the first three returned were trimmed.
    assert_eq!(probe.destroyed_ids().len(), 3);
}

#[test]
fn test_idle_resources_served_while_factory_fails() {
    let (pool, probe) = counting_pool(FactoryMode::Valid);
    let pool = pool.unwrap();

    let first = pool.borrow().unwrap();
    assert_eq!(first.id, 0);
    drop(first);

    // Resources created from now on are unhealthy, the idle ones still pass.
    probe.set_mode(FactoryMode::Invalid);

    let conn = pool.borrow().unwrap();
    assert_eq!(conn.id, 1);
    assert!(conn.healthy);
}

#[test]
fn test_close_drains_outstanding_handles() {
    let (pool, probe) = counting_pool(FactoryMode::Valid);
    let pool = pool.unwrap();

    let conn = pool.borrow().unwrap();
    pool.close();

    assert_eq!(pool.status().state, PoolState::Draining);
    assert!(matches!(pool.borrow(), Err(PoolError::Closed)));
    assert!(matches!(pool.try_borrow(), Err(PoolError::Closed)));

    drop(conn);
    let status = pool.status();
    assert_eq!(status.state, PoolState::Closed);

    let counts = probe.counts();
    assert_eq!(counts.passivated, 1);
    assert_eq!(counts.destroyed, counts.created);

    // Closing again is a no-op.
    pool.close();
    assert_eq!(probe.counts().destroyed, counts.destroyed);
}
