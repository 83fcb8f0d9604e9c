//! Socket events and the socket handler contract.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use thiserror::Error;

use crate::ws::socket::{Payload, WebSocket};
use crate::ws::upgrade::UpgradeContext;

/// Abnormal termination cause carried by [`SocketEvent::Error`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SocketError {
    /// The transport failed or the peer violated the protocol.
    #[error("websocket transport error: {0}")]
    Transport(String),
}

/// One step of a connection's lifecycle.
///
/// Per connection: `Open`, then any number of `Message`, then at most one
/// `Error`, then exactly one `Close`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Open,
    Message(Payload),
    Close { code: u16, reason: String },
    Error(SocketError),
}

impl SocketEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SocketEvent::Open => "open",
            SocketEvent::Message(_) => "message",
            SocketEvent::Close { .. } => "close",
            SocketEvent::Error(_) => "error",
        }
    }
}

/// Everything a socket handler receives for one event.
#[derive(Debug, Clone)]
pub struct SocketEventArgs {
    pub websocket: WebSocket,
    pub event: SocketEvent,
    /// The value passed to `upgrade_to_websocket`, unchanged.
    pub context: UpgradeContext,
}

impl SocketEventArgs {
    /// Payload of a `Message` event.
    pub fn data(&self) -> Option<&Payload> {
        match &self.event {
            SocketEvent::Message(payload) => Some(payload),
            _ => None,
        }
    }

    /// Cause of an `Error` event.
    pub fn error(&self) -> Option<&SocketError> {
        match &self.event {
            SocketEvent::Error(e) => Some(e),
            _ => None,
        }
    }
}

/// Receives every socket event of every upgraded connection.
///
/// Events of one connection are delivered one at a time: the next event is
/// not dispatched until the returned future completes.
pub trait SocketHandler: Send + Sync + 'static {
    fn on_event(&self, args: SocketEventArgs) -> BoxFuture<'static, ()>;
}

impl<F, Fut> SocketHandler for F
where
    F: Fn(SocketEventArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn on_event(&self, args: SocketEventArgs) -> BoxFuture<'static, ()> {
        (self)(args).boxed()
    }
}

pub(crate) type SharedSocketHandler = Arc<dyn SocketHandler>;
