//! Concurrent borrow/return tests.
//!
//! Run with:
//!
//! ```bash
//! cargo test -p respool-testing --test concurrency
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use proptest::prelude::*;
use respool::{Pool, PoolConfig, PoolError, PoolStatus};
use respool_testing::{CountingPolicy, FactoryMode};

fn assert_invariants(status: &PoolStatus, config: &PoolConfig) {
    assert!(status.in_use <= status.capacity, "{status:?}");
    assert!(status.total() <= status.capacity, "{status:?}");
    assert!(status.idle <= config.max_idle, "{status:?}");
    assert_eq!(
        status.created - status.destroyed,
        status.total() as u64,
        "live resources must equal idle + in use: {status:?}"
    );
}

// =============================================================================
// Threads
// =============================================================================

#[test]
fn test_no_resource_is_lent_twice() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 200;

    let config = PoolConfig::new(4)
        .min_idle(2)
        .max_idle(3)
        .wait(Duration::from_secs(5));
    let pool = Pool::new(config.clone(), CountingPolicy::new(FactoryMode::Valid)).unwrap();
    let held = Arc::new(Mutex::new(HashSet::new()));

    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let pool = pool.clone();
            let held = Arc::clone(&held);
            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    let conn = pool.borrow().expect("borrow within 5s");
                    assert!(held.lock().insert(conn.id), "resource {} lent twice", conn.id);
                    thread::yield_now();
                    assert!(held.lock().remove(&conn.id));
                    drop(conn);
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    let status = pool.status();
    assert_eq!(status.in_use, 0);
    assert_eq!(status.borrowed, (THREADS * ROUNDS) as u64);
    assert_eq!(status.returned, status.borrowed);
    assert_invariants(&status, &config);
}

#[test]
fn test_waiter_wakes_when_resource_returned() {
    let config = PoolConfig::new(1)
        .min_idle(1)
        .wait(Duration::from_secs(2));
    let pool = Pool::new(config, CountingPolicy::default()).unwrap();
    let conn = pool.borrow().unwrap();

    let waiter = {
        let pool = pool.clone();
        thread::spawn(move || {
            let start = Instant::now();
            let conn = pool.borrow().map(|conn| conn.id);
            (conn, start.elapsed())
        })
    };

    thread::sleep(Duration::from_millis(50));
    drop(conn);

    let (id, elapsed) = waiter.join().unwrap();
    assert_eq!(id.unwrap(), 0);
    assert!(elapsed < Duration::from_secs(1), "waiter slept through the return: {elapsed:?}");
}

#[test]
fn test_close_wakes_waiters() {
    let config = PoolConfig::new(1)
        .min_idle(1)
        .wait(Duration::from_secs(2));
    let pool = Pool::new(config, CountingPolicy::default()).unwrap();
    let conn = pool.borrow().unwrap();

    let waiter = {
        let pool = pool.clone();
        thread::spawn(move || pool.borrow().map(|conn| conn.id))
    };

    thread::sleep(Duration::from_millis(50));
    pool.close();

    assert!(matches!(waiter.join().unwrap(), Err(PoolError::Closed)));
    drop(conn);
    assert_eq!(pool.status().in_use, 0);
}

#[test]
fn test_borrow_timeout_overrides_config() {
    let config = PoolConfig::new(1)
        .min_idle(1)
        .wait(Duration::from_secs(10));
    let pool = Pool::new(config, CountingPolicy::default()).unwrap();
    let _conn = pool.borrow().unwrap();

    let start = Instant::now();
    let result = pool.borrow_timeout(Duration::from_millis(30));
    assert!(matches!(result, Err(PoolError::Exhausted(_))));
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_unbounded_wait_picks_up_returned_resource() {
    let config = PoolConfig::new(1).min_idle(1).wait(Duration::MAX);
    let pool = Pool::new(config, CountingPolicy::default()).unwrap();
    let conn = pool.borrow().unwrap();

    let waiter = {
        let pool = pool.clone();
        thread::spawn(move || pool.borrow_timeout(Duration::MAX).map(|conn| conn.id))
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!waiter.is_finished(), "waiter gave up without waiting");
    drop(conn);

    assert_eq!(waiter.join().unwrap().unwrap(), 0);
}

#[test]
fn test_detached_slot_can_be_refilled() {
    let config = PoolConfig::new(1)
        .min_idle(1)
        .wait(Duration::from_millis(50));
    let pool = Pool::new(config, CountingPolicy::default()).unwrap();

    let raw = pool.borrow().unwrap().detach();
    assert_eq!(raw.id, 0);

    let conn = pool.borrow().unwrap();
    assert_eq!(conn.id, 1);
}

// =============================================================================
// Async
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_borrow_async_from_many_tasks() {
    let config = PoolConfig::new(3)
        .min_idle(1)
        .wait(Duration::from_secs(5));
    let pool = Pool::new(config.clone(), CountingPolicy::default()).unwrap();

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move {
                let conn = pool.borrow_async().await.expect("async borrow");
                tokio::time::sleep(Duration::from_millis(5)).await;
                conn.id
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }

    let status = pool.status();
    assert_eq!(status.in_use, 0);
    assert_eq!(status.borrowed, 16);
    assert_invariants(&status, &config);
}

// =============================================================================
// Property tests
// =============================================================================

#[derive(Debug, Clone)]
enum Op {
    Borrow,
    Release(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![Just(Op::Borrow), (0usize..8).prop_map(Op::Release)]
}

fn pool_config() -> impl Strategy<Value = PoolConfig> {
    (1usize..8)
        .prop_flat_map(|capacity| (Just(capacity), 0..=capacity))
        .prop_flat_map(|(capacity, min_idle)| (Just(capacity), Just(min_idle), min_idle..=capacity))
        .prop_map(|(capacity, min_idle, max_idle)| {
            PoolConfig::new(capacity)
                .min_idle(min_idle)
                .max_idle(max_idle)
                .wait(Duration::ZERO)
        })
}

proptest! {
    #[test]
    fn prop_counts_stay_within_capacity(config in pool_config(), ops in prop::collection::vec(op(), 1..64)) {
        let pool = Pool::new(config.clone(), CountingPolicy::default()).unwrap();
        let mut held = Vec::new();

        for op in ops {
            match op {
                Op::Borrow => {
                    let conn = pool.try_borrow().unwrap();
                    // Anything below capacity can always be served.
                    prop_assert_eq!(conn.is_some(), held.len() < config.capacity);
                    held.extend(conn);
                }
                Op::Release(index) => {
                    if !held.is_empty() {
                        let index = index % held.len();
                        drop(held.swap_remove(index));
                    }
                }
            }

            let status = pool.status();
            prop_assert_eq!(status.in_use, held.len());
            assert_invariants(&status, &config);
        }
    }

    #[test]
    fn prop_release_passivates_exactly_once(borrows in 1usize..10) {
        let policy = CountingPolicy::default();
        let probe = policy.clone();
        let pool = Pool::new(PoolConfig::new(10).min_idle(2), policy).unwrap();

        let held: Vec<_> = (0..borrows).map(|_| pool.borrow().unwrap()).collect();
        prop_assert_eq!(probe.counts().passivated, 0);
        drop(held);
        prop_assert_eq!(probe.counts().passivated, borrows);
        prop_assert_eq!(pool.status().in_use, 0);
    }
}
