//! In-memory stand-in for a database server and its connections.
//!
//! A [`FakeServer`] hands out [`FakeConnection`]s that implement
//! [`ManagedConnection`]. Tests can start transactions on a borrowed
//! connection, kill sessions server-side, or refuse new connections, then
//! inspect what the pool did about it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use respool::connection::{ManagedConnection, TransactionStatus};
use thiserror::Error;

/// Error returned when the fake server refuses a connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("connect error: {0}")]
pub struct ConnectError(pub String);

#[derive(Debug, Default)]
struct ServerState {
    refusing: AtomicBool,
    // Sessions whose id is below this watermark are dead.
    killed_below: AtomicUsize,
    next_session: AtomicUsize,
    opened: AtomicUsize,
    closed: AtomicUsize,
    rollbacks: AtomicUsize,
    pings: AtomicUsize,
}

/// A fake database server shared by all connections it opened.
#[derive(Debug, Clone, Default)]
pub struct FakeServer {
    state: Arc<ServerState>,
}

impl FakeServer {
    /// Create a server that accepts connections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a connection, unless the server is refusing them.
    pub fn connect(&self) -> Result<FakeConnection, ConnectError> {
        if self.state.refusing.load(Ordering::SeqCst) {
            return Err(ConnectError("server is refusing connections".into()));
        }

        let session = self.state.next_session.fetch_add(1, Ordering::SeqCst);
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        Ok(FakeConnection {
            session,
            closed: false,
            status: TransactionStatus::Idle,
            server: Arc::clone(&self.state),
        })
    }

    /// Start or stop refusing new connections.
    pub fn refuse_connections(&self, refuse: bool) {
        self.state.refusing.store(refuse, Ordering::SeqCst);
    }

    /// Kill every session opened so far.
    pub fn kill_sessions(&self) {
        let watermark = self.state.next_session.load(Ordering::SeqCst);
        self.state.killed_below.store(watermark, Ordering::SeqCst);
    }

    /// Connections opened so far.
    #[must_use]
    pub fn opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    /// Connections closed so far.
    #[must_use]
    pub fn closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Connections currently open.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.opened() - self.closed()
    }

    /// Rollbacks executed so far.
    #[must_use]
    pub fn rollbacks(&self) -> usize {
        self.state.rollbacks.load(Ordering::SeqCst)
    }

    /// Validation queries executed so far.
    #[must_use]
    pub fn pings(&self) -> usize {
        self.state.pings.load(Ordering::SeqCst)
    }
}

/// A connection to a [`FakeServer`].
#[derive(Debug)]
pub struct FakeConnection {
    session: usize,
    closed: bool,
    status: TransactionStatus,
    server: Arc<ServerState>,
}

impl FakeConnection {
    /// Server-side session id.
    #[must_use]
    pub fn session(&self) -> usize {
        self.session
    }

    /// Open a transaction block.
    pub fn begin(&mut self) {
        self.status = TransactionStatus::InTransaction;
    }

    /// Commit the open transaction.
    pub fn commit(&mut self) {
        self.status = TransactionStatus::Idle;
    }

    /// Fail a statement inside the open transaction.
    pub fn fail_statement(&mut self) {
        self.status = TransactionStatus::InError;
    }

    fn alive(&self) -> bool {
        !self.closed && self.session >= self.server.killed_below.load(Ordering::SeqCst)
    }
}

impl ManagedConnection for FakeConnection {
    fn is_open(&self) -> bool {
        self.alive()
    }

    fn ping(&mut self, query: &str) -> bool {
        self.server.pings.fetch_add(1, Ordering::SeqCst);
        self.alive() && !query.trim().is_empty()
    }

    fn transaction_status(&self) -> TransactionStatus {
        if self.alive() {
            self.status
        } else {
            TransactionStatus::Unknown
        }
    }

    fn rollback(&mut self) {
        self.server.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.status = TransactionStatus::Idle;
    }

    fn close(mut self) {
        self.closed = true;
        self.server.closed.fetch_add(1, Ordering::SeqCst);
    }
}
