//! Database connection policy.
//!
//! [`ConnectionPolicy`] adapts any connection type implementing
//! [`ManagedConnection`] to the pool:
//!
//! - create: call the connector; failures are logged and count as an empty
//!   creation attempt
//! - validate: the connection is open and the validation query returns a row
//! - passivate: roll back a transaction left open, failed or in an unknown
//!   state by the previous borrower
//! - destroy: close the connection
//!
//! The wire protocol stays behind [`ManagedConnection`]; this module never
//! speaks it.

use std::fmt;
use std::sync::Arc;

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::policy::Policy;
use crate::pool::Pool;

/// Default validation query.
pub const DEFAULT_VALIDATION_QUERY: &str = "SELECT 1";

/// Transaction state reported by a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// No transaction is open.
    Idle,
    /// A command is in progress.
    Active,
    /// Inside a transaction block.
    InTransaction,
    /// Inside a failed transaction block.
    InError,
    /// The connection cannot tell.
    Unknown,
}

impl TransactionStatus {
    /// Whether a connection in this state must be rolled back before reuse.
    #[must_use]
    pub fn needs_rollback(&self) -> bool {
        matches!(self, Self::InTransaction | Self::InError | Self::Unknown)
    }
}

/// Operations the pool needs from a database connection.
pub trait ManagedConnection: Send {
    /// Whether the underlying session is still open.
    fn is_open(&self) -> bool;

    /// Run `query` and report whether it produced at least one row.
    fn ping(&mut self, query: &str) -> bool;

    /// Current transaction status.
    fn transaction_status(&self) -> TransactionStatus;

    /// Roll back the current transaction.
    fn rollback(&mut self);

    /// Close the connection.
    fn close(self);
}

/// [`Policy`] for pooled database connections.
pub struct ConnectionPolicy<F> {
    connect: F,
    validation_query: Arc<str>,
}

/// A pool of database connections.
pub type ConnectionPool<F> = Pool<ConnectionPolicy<F>>;

impl<F> ConnectionPolicy<F> {
    /// Create a policy that opens connections with `connect`.
    pub fn new(connect: F) -> Self {
        Self {
            connect,
            validation_query: Arc::from(DEFAULT_VALIDATION_QUERY),
        }
    }

    /// Set a custom validation query.
    ///
    /// The query runs every time a connection is created or borrowed, so it
    /// should be lightweight.
    #[must_use]
    pub fn validation_query(mut self, query: impl Into<Arc<str>>) -> Self {
        self.validation_query = query.into();
        self
    }

    /// The query used to validate connections.
    #[must_use]
    pub fn query(&self) -> &str {
        &self.validation_query
    }
}

impl<F, C, E> ConnectionPolicy<F>
where
    F: Fn() -> Result<C, E> + Send + Sync,
    C: ManagedConnection,
    E: fmt::Display,
{
    /// Build a connection pool around this policy.
    pub fn pool(self, config: PoolConfig) -> Result<ConnectionPool<F>, PoolError> {
        Pool::new(config, self)
    }
}

impl<F, C, E> Policy for ConnectionPolicy<F>
where
    F: Fn() -> Result<C, E> + Send + Sync,
    C: ManagedConnection,
    E: fmt::Display,
{
    type Resource = C;

    fn create(&self) -> Option<C> {
        match (self.connect)() {
            Ok(conn) => Some(conn),
            Err(error) => {
                tracing::warn!(%error, "failed to open connection");
                None
            }
        }
    }

    fn validate(&self, conn: &mut C) -> bool {
        conn.is_open() && conn.ping(&self.validation_query)
    }

    fn passivate(&self, conn: &mut C) {
        let status = conn.transaction_status();
        if status.needs_rollback() {
            tracing::debug!(?status, "rolling back unfinished transaction");
            conn.rollback();
        }
    }

    fn destroy(&self, conn: C) {
        conn.close();
    }
}

impl<F> fmt::Debug for ConnectionPolicy<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPolicy")
            .field("validation_query", &self.validation_query)
            .finish_non_exhaustive()
    }
}
