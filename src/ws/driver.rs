//! Per-connection event pump.
//!
//! # Responsibilities
//! - Register the socket and dispatch `Open`
//! - Forward inbound data frames as `Message` events, in arrival order
//! - Drain the outbound queue into the engine's sink on a writer task
//! - Dispatch exactly one terminal `Close` (preceded by `Error` when the
//!   connection ended abnormally)
//!
//! # Design Decisions
//! - All events of one connection come from one task, so they never overlap
//! - The upgrade context lives in this task's `DriverContext`, nowhere else

use std::fmt::Display;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::{FutureExt, Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;

use crate::lifecycle::keepalive::KeepAliveToken;
use crate::observability::metrics;
use crate::runtime::Runtime;
use crate::ws::event::{SharedSocketHandler, SocketError, SocketEvent, SocketEventArgs};
use crate::ws::registry::SocketRegistry;
use crate::ws::socket::{Outbound, ReadyState, SocketAdapter, WebSocket, ABNORMAL_CLOSURE, NO_STATUS_RECEIVED};
use crate::ws::upgrade::UpgradeContext;

/// Inbound frame after translation from the engine's message type.
#[derive(Debug)]
pub(crate) enum Inbound {
    Data(crate::ws::socket::Payload),
    Close(Option<(u16, String)>),
    Control,
}

/// Translation between an engine's native message type and canonical frames.
pub(crate) trait FrameCodec: Send + Sync + 'static {
    type Message: Send + Unpin + 'static;

    fn decode(message: Self::Message) -> Inbound;
    fn encode(frame: Outbound) -> Self::Message;
}

/// What a driver needs besides the stream itself.
pub(crate) struct DriverContext {
    pub(crate) engine: Runtime,
    pub(crate) handler: SharedSocketHandler,
    pub(crate) context: UpgradeContext,
    pub(crate) registry: SocketRegistry,
}

impl DriverContext {
    async fn dispatch(&self, websocket: &WebSocket, event: SocketEvent) {
        let name = event.name();
        let args = SocketEventArgs {
            websocket: websocket.clone(),
            event,
            context: self.context.clone(),
        };
        let fut = self.handler.on_event(args);
        if AssertUnwindSafe(fut).catch_unwind().await.is_err() {
            tracing::error!(
                engine = %self.engine,
                connection_id = %websocket.id(),
                event = name,
                "Socket handler panicked"
            );
        }
    }
}

/// Run a socket from `Open` to `Close`.
pub(crate) async fn drive<C, S, E>(
    stream: S,
    websocket: WebSocket,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    ctx: DriverContext,
) where
    C: FrameCodec,
    S: Stream<Item = Result<C::Message, E>> + Sink<C::Message> + Send + 'static,
    <S as Sink<C::Message>>::Error: Display,
    E: Display + Send,
{
    let _hold = KeepAliveToken::acquire();
    let adapter = Arc::clone(websocket.adapter());
    let (sink, mut inbound) = stream.split();

    ctx.registry.insert(websocket.clone());
    adapter.advance(ReadyState::Open);
    metrics::record_socket_opened(ctx.engine);
    tracing::debug!(engine = %ctx.engine, connection_id = %websocket.id(), "WebSocket open");

    ctx.dispatch(&websocket, SocketEvent::Open).await;

    let writer = tokio::spawn(write_loop::<C, _>(sink, outbound));

    let mut close_frame = None;
    let mut failure = None;
    while let Some(item) = inbound.next().await {
        match item {
            Ok(message) => match C::decode(message) {
                Inbound::Data(payload) => ctx.dispatch(&websocket, SocketEvent::Message(payload)).await,
                Inbound::Close(frame) => {
                    adapter.advance(ReadyState::Closing);
                    close_frame = frame;
                }
                Inbound::Control => {}
            },
            Err(e) => {
                failure = Some(SocketError::Transport(e.to_string()));
                break;
            }
        }
    }

    writer.abort();
    adapter.advance(ReadyState::Closed);
    ctx.registry.remove(websocket.id());
    metrics::record_socket_closed(ctx.engine);

    match failure {
        Some(error) => {
            tracing::warn!(
                engine = %ctx.engine,
                connection_id = %websocket.id(),
                error = %error,
                "WebSocket closed abnormally"
            );
            ctx.dispatch(&websocket, SocketEvent::Error(error)).await;
            ctx.dispatch(
                &websocket,
                SocketEvent::Close {
                    code: ABNORMAL_CLOSURE,
                    reason: String::new(),
                },
            )
            .await;
        }
        None => {
            let (code, reason) = close_frame.unwrap_or((NO_STATUS_RECEIVED, String::new()));
            tracing::debug!(engine = %ctx.engine, connection_id = %websocket.id(), code, "WebSocket closed");
            ctx.dispatch(&websocket, SocketEvent::Close { code, reason }).await;
        }
    }
}

async fn write_loop<C, K>(mut sink: K, mut outbound: mpsc::UnboundedReceiver<Outbound>)
where
    C: FrameCodec,
    K: Sink<C::Message> + Unpin,
    K::Error: Display,
{
    while let Some(frame) = outbound.recv().await {
        let is_close = matches!(frame, Outbound::Close { .. });
        if let Err(e) = sink.send(C::encode(frame)).await {
            tracing::debug!(error = %e, "WebSocket writer stopped");
            break;
        }
        if is_close {
            break;
        }
    }
}
