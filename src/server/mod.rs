//! Server entry point.
//!
//! # Data Flow
//! ```text
//! serve(ServeOptions)
//!     → runtime::detect (or serve_on with an explicit engine)
//!     → TLS material validated, listener bound
//!     → Engine::start
//!     → ServerHandle (address, stop, unref/keep_alive, sockets)
//! ```

pub mod handle;
pub mod serve;

pub use handle::{ServerAddress, ServerHandle, Transport};
pub use serve::{serve, serve_on, ServeOptions, DEFAULT_HOSTNAME};
