//! Engine on an axum `Router` served by `axum-server`.
//!
//! Every request falls through to a single handler that bridges it. Upgrades
//! go through axum's own `WebSocketUpgrade`, whose socket reports its
//! lifecycle as separate flags.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{CloseFrame, Message, WebSocket as AxumSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, FromRequestParts, State};
use axum::Router;
use axum_server::Handle;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

use crate::engine::{Engine, EngineContext};
use crate::http::body::Body;
use crate::http::bridge::{Bridge, Dispatch, NativeResponse};
use crate::http::response::Response;
use crate::net::ConnectionId;
use crate::observability::metrics;
use crate::runtime::Runtime;
use crate::ws::driver::{self, DriverContext, FrameCodec, Inbound};
use crate::ws::socket::{sanitize_close, Outbound, Outbox, Payload, ReadyState, SocketAdapter, WebSocket};

pub(crate) struct AxumEngine;

impl Engine for AxumEngine {
    fn runtime(&self) -> Runtime {
        Runtime::Axum
    }

    fn start(&self, listener: TcpListener, ctx: EngineContext) -> std::io::Result<()> {
        let acceptor = ctx.acceptor();
        let EngineContext { bridge, lifecycle, .. } = ctx;

        let app = Router::new()
            .fallback(handle)
            .with_state(bridge)
            .layer(TraceLayer::new_for_http());

        let handle = Handle::new();
        let server = axum_server::from_tcp(listener.into_std()?)
            .acceptor(acceptor)
            .handle(handle.clone());

        let mut stop = lifecycle.stop_receiver();
        tokio::spawn(async move {
            stop.recv().await;
            // No deadline: in-flight exchanges run to completion.
            handle.graceful_shutdown(None);
        });

        tokio::spawn(async move {
            if let Err(e) = server.serve(app.into_make_service_with_connect_info::<SocketAddr>()).await {
                tracing::error!(engine = %Runtime::Axum, error = %e, "Server failed");
            }
            lifecycle.mark_closed();
        });

        Ok(())
    }
}

async fn handle(
    State(bridge): State<Arc<Bridge>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    request: axum::extract::Request,
) -> NativeResponse {
    let start = Instant::now();
    let (mut parts, body) = request.into_parts();

    let upgrade = WebSocketUpgrade::from_request_parts(&mut parts, &()).await.ok();

    let body = Body::from_stream(body.into_data_stream());
    let request = match bridge.request(parts, body, Some(remote)) {
        Ok(request) => request,
        Err(response) => return bridge.respond(response, start),
    };

    let upgrader = bridge.upgrader(upgrade.is_some());
    match bridge.dispatch(request, upgrader).await {
        Dispatch::Respond(response) => bridge.respond(response, start),
        Dispatch::Upgrade(context) => match (upgrade, bridge.driver_context(context)) {
            (Some(upgrade), Some(driver)) => {
                metrics::record_request(bridge.engine, 101, start);
                upgrade
                    .on_failed_upgrade(|e| {
                        tracing::warn!(engine = %Runtime::Axum, error = %e, "WebSocket upgrade did not complete");
                    })
                    .on_upgrade(move |socket| run_socket(socket, driver))
            }
            _ => {
                tracing::error!(engine = %bridge.engine, "Upgrade accepted without a usable handshake");
                bridge.respond(Response::internal_error(), start)
            }
        },
    }
}

async fn run_socket(socket: AxumSocket, driver: DriverContext) {
    let (adapter, rx) = FlagSocket::new();
    let websocket = WebSocket::new(ConnectionId::new(), adapter);
    driver::drive::<AxumCodec, _, _>(socket, websocket, rx, driver).await;
}

/// Adapter for axum sockets, whose state is a set of independent flags.
#[derive(Debug)]
pub(crate) struct FlagSocket {
    outbox: Outbox,
    opened: AtomicBool,
    closing: AtomicBool,
    closed: AtomicBool,
}

impl FlagSocket {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Outbound>) {
        let (outbox, rx) = Outbox::new();
        let socket = Self {
            outbox,
            opened: AtomicBool::new(false),
            closing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        };
        (Arc::new(socket), rx)
    }
}

impl SocketAdapter for FlagSocket {
    fn send(&self, payload: Payload) {
        let frame = Outbound::Data(payload);
        if self.ready_state() >= ReadyState::Closing {
            self.outbox.drop_frame(&frame);
            return;
        }
        self.outbox.push(frame);
    }

    fn close(&self, code: Option<u16>, reason: Option<&str>) {
        let (code, reason) = sanitize_close(code, reason);
        if self.closing.swap(true, Ordering::SeqCst) || self.closed.load(Ordering::SeqCst) {
            return;
        }
        self.outbox.push(Outbound::Close { code, reason });
    }

    fn buffered_amount(&self) -> u64 {
        self.outbox.buffered()
    }

    fn ready_state(&self) -> ReadyState {
        ReadyState::from_flags(
            self.opened.load(Ordering::SeqCst),
            self.closing.load(Ordering::SeqCst),
            self.closed.load(Ordering::SeqCst),
        )
    }

    fn binary_type(&self) -> &'static str {
        "bytes"
    }

    fn advance(&self, state: ReadyState) {
        match state {
            ReadyState::Connecting => {}
            ReadyState::Open => self.opened.store(true, Ordering::SeqCst),
            ReadyState::Closing => self.closing.store(true, Ordering::SeqCst),
            ReadyState::Closed => self.closed.store(true, Ordering::SeqCst),
        }
    }
}

/// Frame translation for axum messages.
pub(crate) struct AxumCodec;

impl FrameCodec for AxumCodec {
    type Message = Message;

    fn decode(message: Message) -> Inbound {
        match message {
            Message::Text(text) => Inbound::Data(Payload::Text(text.as_str().to_owned())),
            Message::Binary(bytes) => Inbound::Data(Payload::Binary(bytes)),
            Message::Close(frame) => Inbound::Close(frame.map(|f| (f.code, f.reason.as_str().to_owned()))),
            Message::Ping(_) | Message::Pong(_) => Inbound::Control,
        }
    }

    fn encode(frame: Outbound) -> Message {
        match frame {
            Outbound::Data(Payload::Text(text)) => Message::Text(text.into()),
            Outbound::Data(Payload::Binary(bytes)) => Message::Binary(bytes),
            Outbound::Close { code, reason } => Message::Close(Some(CloseFrame {
                code,
                reason: reason.into(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_map_to_ready_state() {
        let (socket, _rx) = FlagSocket::new();
        assert_eq!(socket.ready_state(), ReadyState::Connecting);
        socket.advance(ReadyState::Open);
        assert_eq!(socket.ready_state(), ReadyState::Open);
        socket.close(None, None);
        assert_eq!(socket.ready_state(), ReadyState::Closing);
        socket.advance(ReadyState::Closed);
        assert_eq!(socket.ready_state(), ReadyState::Closed);
    }

    #[test]
    fn close_after_closed_sends_nothing() {
        let (socket, mut rx) = FlagSocket::new();
        socket.advance(ReadyState::Open);
        socket.advance(ReadyState::Closed);
        socket.close(Some(4000), Some("late"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn codec_round_trips_close_frame() {
        let message = AxumCodec::encode(Outbound::Close { code: 4100, reason: "bye".into() });
        match AxumCodec::decode(message) {
            Inbound::Close(Some((code, reason))) => {
                assert_eq!(code, 4100);
                assert_eq!(reason, "bye");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
