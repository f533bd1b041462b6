//! # respool
//!
//! Policy-driven pool for expensive, validity-checkable resources such as
//! database connections.
//!
//! The pool itself knows nothing about its resources. A [`Policy`] tells it
//! how to create, validate, activate, passivate and destroy them; the pool
//! takes care of sizing, bounded retries, blocking acquisition with timeout,
//! and the count invariants under concurrent borrow and return.
//!
//! ## Features
//!
//! - Bounded-retry creation: `retry + 1` attempts per resource
//! - Validation on creation and on every borrow, with transparent replacement
//! - `min_idle` heating and `max_idle` freezing of the idle queue (FIFO)
//! - Blocking `borrow()` with a deadline, plus `try_borrow()` and an async
//!   `borrow_async()` for Tokio callers
//! - Move-only handles that return the resource to the pool on drop
//!
//! ## Example
//!
//! ```rust,ignore
//! use respool::connection::ConnectionPolicy;
//! use respool::PoolConfig;
//!
//! let pool = ConnectionPolicy::new(|| MyConnection::open("db://localhost"))
//!     .validation_query("SELECT 1")
//!     .pool(PoolConfig::new(20).min_idle(4).retry(2))?;
//!
//! let mut conn = pool.borrow()?;
//! conn.execute("UPDATE accounts SET balance = balance - 1")?;
//! // Connection is passivated and returned to the pool on drop
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod clock;
pub mod config;
pub mod connection;
pub mod error;
pub mod handle;
pub mod policy;
pub mod pool;
mod sync;

pub use config::PoolConfig;
pub use error::PoolError;
pub use handle::{DropRelease, FnRelease, Handle, Release};
pub use policy::{FnPolicy, Policy};
pub use pool::{Pool, PoolState, PoolStatus, PooledHandle, ReturnToPool};
