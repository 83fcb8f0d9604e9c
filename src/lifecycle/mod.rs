//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! serve():
//!     bind → Lifecycle::new (listener takes a keep-alive hold) → accept loop
//!
//! stop() / AbortSignal (shutdown.rs, manager.rs):
//!     trigger → accept loop exits → listener hold released → Closed
//!
//! Process exit (keepalive.rs):
//!     wait_until_idle() resolves when no listener, connection or socket holds
//! ```

pub mod keepalive;
pub mod shutdown;

pub(crate) mod manager;

pub use keepalive::{active_holds, wait_until_idle, KeepAliveToken};
pub use shutdown::{AbortController, AbortSignal, Shutdown, StopReceiver};
