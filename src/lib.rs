//! One server API over several HTTP engines.
//!
//! A single [`serve`] call takes a request handler and an optional WebSocket
//! event handler and runs them unchanged on whichever engine is selected:
//! an axum router, raw hyper connections, or an evented HTTP/1 server.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod runtime;
pub mod server;
pub mod ws;

pub(crate) mod engine;

pub use error::{BoxError, ServeError, ServeResult};
pub use http::{Body, Handler, HandlerContext, Request, Response};
pub use lifecycle::{active_holds, wait_until_idle, AbortController, AbortSignal};
pub use net::TlsConfig;
pub use runtime::Runtime;
pub use server::{serve, serve_on, ServeOptions, ServerAddress, ServerHandle};
pub use ws::{Payload, ReadyState, SocketEvent, SocketEventArgs, SocketHandler, UpgradeContext, WebSocket};
