//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! serve(options)
//!     → listener.rs (resolve, bind, reuse-port, connection limits)
//!     → tls.rs (optional TLS from raw PEM contents)
//!     → acceptor.rs (permit, tracking, TLS handshake per connection)
//!     → connection.rs (identity, tracking, keep-alive hold)
//!     → Hand off to the selected engine
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked so the handle can report live connections
//! - TLS is optional and handled transparently by each engine

pub(crate) mod acceptor;
pub mod connection;
pub mod listener;
pub mod tls;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{Listener, ListenerError};
pub use tls::{TlsConfig, TlsError};
