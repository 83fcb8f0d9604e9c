//! TCP listener implementation with backpressure.
//!
//! # Responsibilities
//! - Resolve and bind the configured hostname/port (port 0 = ephemeral)
//! - Apply the port-reuse hint where the platform supports it
//! - Enforce max_connections via a semaphore
//! - Graceful handling of accept errors

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Pending connection queue length passed to `listen(2)`.
const BACKLOG: u32 = 1024;

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Hostname did not resolve to any address.
    Resolve(std::io::Error),
    /// Failed to bind to address.
    Bind(std::io::Error),
    /// Failed to accept connection.
    Accept(std::io::Error),
    /// The connection limiter was closed.
    LimiterClosed,
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Resolve(e) => write!(f, "Failed to resolve: {}", e),
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
            ListenerError::LimiterClosed => write!(f, "Connection limiter closed"),
        }
    }
}

impl std::error::Error for ListenerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ListenerError::Resolve(e) | ListenerError::Bind(e) | ListenerError::Accept(e) => Some(e),
            ListenerError::LimiterClosed => None,
        }
    }
}

/// Bind a TCP listener on `hostname:port`.
///
/// The first resolved address is used. With `reuse_port` set, `SO_REUSEPORT`
/// is enabled on platforms that have it so several processes can share the
/// address; elsewhere the hint is ignored.
pub async fn bind(hostname: &str, port: u16, reuse_port: bool) -> Result<TcpListener, ListenerError> {
    let addr = tokio::net::lookup_host((hostname, port))
        .await
        .map_err(ListenerError::Resolve)?
        .next()
        .ok_or_else(|| {
            ListenerError::Resolve(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no address for {}", hostname),
            ))
        })?;

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(ListenerError::Bind)?;

    #[cfg(unix)]
    socket.set_reuseaddr(true).map_err(ListenerError::Bind)?;

    if reuse_port {
        apply_reuse_port(&socket)?;
    }

    socket.bind(addr).map_err(ListenerError::Bind)?;
    let listener = socket.listen(BACKLOG).map_err(ListenerError::Bind)?;

    tracing::debug!(
        requested = %addr,
        bound = ?listener.local_addr().ok(),
        reuse_port,
        "Listener bound"
    );
    Ok(listener)
}

#[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
fn apply_reuse_port(socket: &TcpSocket) -> Result<(), ListenerError> {
    socket.set_reuseport(true).map_err(ListenerError::Bind)
}

#[cfg(not(all(unix, not(target_os = "solaris"), not(target_os = "illumos"))))]
fn apply_reuse_port(_socket: &TcpSocket) -> Result<(), ListenerError> {
    tracing::debug!("reuse_port is not supported on this platform; ignoring");
    Ok(())
}

/// A bounded TCP listener that limits concurrent connections.
///
/// Uses a semaphore to enforce `max_connections`. When the limit is reached,
/// new connections will wait until a slot becomes available.
pub struct Listener {
    inner: TcpListener,
    connection_limit: Arc<Semaphore>,
    max_connections: usize,
}

impl Listener {
    /// Wrap an already-bound listener with a connection limit.
    pub fn new(inner: TcpListener, max_connections: usize) -> Self {
        let max_connections = max_connections.max(1);
        Self {
            inner,
            connection_limit: Arc::new(Semaphore::new(max_connections)),
            max_connections,
        }
    }

    /// Accept a new connection, respecting the connection limit.
    ///
    /// This will wait if the connection limit has been reached.
    /// Returns the stream and a permit that must be held for the connection's lifetime.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        // Acquire permit first (backpressure)
        let permit = self
            .connection_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::LimiterClosed)?;

        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        tracing::debug!(
            peer_addr = %addr,
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok((stream, addr, ConnectionPermit::new(permit)))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// A permit representing a connection slot.
///
/// When dropped, the connection slot is released back to the pool.
/// This ensures backpressure is maintained even if the connection handler panics.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: OwnedSemaphorePermit,
}

impl ConnectionPermit {
    pub(crate) fn new(permit: OwnedSemaphorePermit) -> Self {
        Self { _permit: permit }
    }
}
