//! Connection identity and lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing and socket identity
//! - Count live connections per server
//! - Hold the process open while a connection lives

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::lifecycle::keepalive::KeepAliveToken;
use crate::observability::metrics;
use crate::runtime::Runtime;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection or WebSocket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Counts live connections of one server.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    engine: Runtime,
    active_count: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new(engine: Runtime) -> Self {
        Self {
            engine,
            active_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Record a new live connection. Returns a guard that releases it on drop.
    pub fn track(&self) -> ConnectionGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        metrics::record_connection_opened(self.engine);
        ConnectionGuard {
            engine: self.engine,
            active_count: Arc::clone(&self.active_count),
            id: ConnectionId::new(),
            _hold: KeepAliveToken::acquire(),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }
}

/// Guard that tracks a connection's lifetime.
///
/// Also keeps the process alive independently of the listener's own hold,
/// so `unref` on the server never cuts off a live connection.
#[derive(Debug)]
pub struct ConnectionGuard {
    engine: Runtime,
    active_count: Arc<AtomicU64>,
    id: ConnectionId,
    _hold: KeepAliveToken,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        metrics::record_connection_closed(self.engine);
        tracing::trace!(engine = %self.engine, connection_id = %self.id, "Connection closed");
    }
}
