//! Public error type returned by [`serve`](crate::serve).

use thiserror::Error;

use crate::net::listener::ListenerError;
use crate::net::tls::TlsError;

/// Boxed error produced by application handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while starting a server.
///
/// Errors raised while *handling* requests never surface here: they are
/// answered on the connection (500, transport abort) and logged.
#[derive(Debug, Error)]
pub enum ServeError {
    /// No supported engine was detected (or the requested one is not compiled in).
    #[error("no supported server engine detected (UNISERVE_ENGINE={0:?})")]
    UnknownRuntime(String),

    /// Failed to bind or configure the listening socket.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: ListenerError,
    },

    /// The TLS key/certificate pair was rejected.
    #[error("invalid TLS configuration: {0}")]
    Tls(#[from] TlsError),

    /// Any other I/O failure during startup.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for server startup.
pub type ServeResult<T> = Result<T, ServeError>;
