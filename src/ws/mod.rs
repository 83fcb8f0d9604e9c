//! WebSocket subsystem.
//!
//! # Data Flow
//! ```text
//! Handler calls Upgrader::upgrade_to_websocket(ctx)   (upgrade.rs)
//!     → engine answers 101 and hands over the raw stream
//!     → engine-specific adapter wraps it                (adapter.rs, engine/axum_engine.rs)
//!     → driver dispatches Open / Message / Error / Close (driver.rs)
//!     → SocketHandler receives SocketEventArgs          (event.rs)
//! ```
//!
//! # Design Decisions
//! - Every engine exposes the same [`WebSocket`] surface
//! - Ready state and buffered amount come from the engine's own bookkeeping,
//!   translated by the adapter

pub mod event;
pub mod registry;
pub mod socket;
pub mod upgrade;

pub(crate) mod adapter;
pub(crate) mod driver;
pub(crate) mod handshake;

pub use event::{SocketError, SocketEvent, SocketEventArgs, SocketHandler};
pub use registry::SocketRegistry;
pub use socket::{
    is_sendable_close_code, Payload, ReadyState, WebSocket, ABNORMAL_CLOSURE, MAX_REASON_BYTES, NORMAL_CLOSURE,
    NO_STATUS_RECEIVED,
};
pub use upgrade::{UpgradeContext, Upgrader};
