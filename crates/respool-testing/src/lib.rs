//! # respool-testing
//!
//! Test infrastructure for the respool pool.
//!
//! This crate provides fake policies and fake connections that record what
//! the pool does with them, so pool behavior can be checked without a real
//! database.
//!
//! ## Features
//!
//! - [`CountingPolicy`]: fake resources with per-hook call recording and a
//!   switchable factory (valid, invalid, absent)
//! - [`FakeServer`]: in-memory database stand-in whose connections implement
//!   `ManagedConnection`
//!
//! ## Example
//!
//! ```rust,ignore
//! use respool::{Pool, PoolConfig};
//! use respool_testing::{CountingPolicy, FactoryMode};
//!
//! let policy = CountingPolicy::new(FactoryMode::Valid);
//! let probe = policy.clone();
//! let pool = Pool::new(PoolConfig::new(10).min_idle(2), policy)?;
//! assert_eq!(probe.counts().created, 2);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod fake_connection;
pub mod fixtures;

pub use fake_connection::{ConnectError, FakeConnection, FakeServer};
pub use fixtures::{CallCounts, CountingPolicy, Event, FactoryMode, FakeResource};
