//! Per-request upgrade negotiation.
//!
//! # State Machine
//! ```text
//! Pending ──upgrade_to_websocket(ctx)──▶ Accepted(ctx) ──engine takes it──▶ Completed
//!    │                                        │
//!    └──no handler / not a handshake──▶ Rejected
//! ```
//!
//! # Design Decisions
//! - The context is stored in the request's negotiator, never in shared state
//! - The first successful call wins; later calls return `false`
//! - After acceptance the handler's own response is discarded by the engine

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Opaque value attached at upgrade time and handed back on every socket
/// event of that connection.
#[derive(Clone, Default)]
pub struct UpgradeContext(Option<Arc<dyn Any + Send + Sync>>);

impl UpgradeContext {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Some(Arc::new(value)))
    }

    pub fn empty() -> Self {
        Self(None)
    }

    /// Borrow the value if it has type `T`.
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.0.as_deref().and_then(|v| v.downcast_ref::<T>())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}

impl fmt::Debug for UpgradeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_some() {
            f.write_str("UpgradeContext(..)")
        } else {
            f.write_str("UpgradeContext(empty)")
        }
    }
}

#[derive(Debug)]
enum UpgradeState {
    Pending,
    Accepted(UpgradeContext),
    Rejected,
    Completed,
}

/// The `upgrade_to_websocket` capability handed to a request handler.
#[derive(Clone)]
pub struct Upgrader {
    state: Arc<Mutex<UpgradeState>>,
    handshake_valid: bool,
    socket_handler: bool,
}

impl Upgrader {
    /// `handshake_valid`: the engine recognized a well-formed upgrade request.
    /// `socket_handler`: a socket handler was configured at `serve` time.
    pub(crate) fn new(handshake_valid: bool, socket_handler: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(UpgradeState::Pending)),
            handshake_valid,
            socket_handler,
        }
    }

    /// An upgrader that refuses every request.
    pub fn unavailable() -> Self {
        Self::new(false, false)
    }

    /// Whether the request carries a usable WebSocket handshake.
    pub fn is_upgrade_request(&self) -> bool {
        self.handshake_valid
    }

    /// Ask the engine to take this connection over as a WebSocket.
    ///
    /// Returns `true` when negotiation succeeded; the engine then answers
    /// `101 Switching Protocols` itself and ignores the handler's response.
    /// Returns `false` when no socket handler is configured, the request is
    /// not a valid handshake, or an upgrade was already requested.
    pub fn upgrade_to_websocket<T: Any + Send + Sync>(&self, context: T) -> bool {
        self.upgrade_with(UpgradeContext::new(context))
    }

    pub fn upgrade_with(&self, context: UpgradeContext) -> bool {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !matches!(*state, UpgradeState::Pending) {
            return false;
        }
        if !self.socket_handler {
            tracing::warn!("upgrade_to_websocket called but no socket handler is configured");
            *state = UpgradeState::Rejected;
            return false;
        }
        if !self.handshake_valid {
            tracing::debug!("upgrade_to_websocket called on a request without a WebSocket handshake");
            *state = UpgradeState::Rejected;
            return false;
        }
        *state = UpgradeState::Accepted(context);
        true
    }

    /// Engine side: take the accepted context, completing the negotiation.
    pub(crate) fn take_accepted(&self) -> Option<UpgradeContext> {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        match std::mem::replace(&mut *state, UpgradeState::Completed) {
            UpgradeState::Accepted(context) => Some(context),
            other => {
                *state = other;
                None
            }
        }
    }
}

impl fmt::Debug for Upgrader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upgrader")
            .field("handshake_valid", &self.handshake_valid)
            .field("socket_handler", &self.socket_handler)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_context_is_returned_once() {
        let upgrader = Upgrader::new(true, true);
        assert!(upgrader.upgrade_to_websocket(42u32));
        let ctx = upgrader.take_accepted().unwrap();
        assert_eq!(ctx.get::<u32>(), Some(&42));
        assert!(upgrader.take_accepted().is_none());
    }

    #[test]
    fn no_socket_handler_fails_deterministically() {
        let upgrader = Upgrader::new(true, false);
        assert!(!upgrader.upgrade_to_websocket("ctx"));
        assert!(!upgrader.upgrade_to_websocket("again"));
        assert!(upgrader.take_accepted().is_none());
    }

    #[test]
    fn plain_request_cannot_upgrade() {
        let upgrader = Upgrader::new(false, true);
        assert!(!upgrader.is_upgrade_request());
        assert!(!upgrader.upgrade_to_websocket(()));
        assert!(upgrader.take_accepted().is_none());
    }

    #[test]
    fn first_context_wins() {
        let upgrader = Upgrader::new(true, true);
        let clone = upgrader.clone();
        assert!(upgrader.upgrade_to_websocket("first"));
        assert!(!clone.upgrade_to_websocket("second"));
        let ctx = upgrader.take_accepted().unwrap();
        assert_eq!(ctx.get::<&str>(), Some(&"first"));
    }

    #[test]
    fn context_type_mismatch_is_none() {
        let ctx = UpgradeContext::new(String::from("room-1"));
        assert!(ctx.get::<u64>().is_none());
        assert_eq!(ctx.get::<String>().map(String::as_str), Some("room-1"));
        assert!(UpgradeContext::empty().is_empty());
    }
}
