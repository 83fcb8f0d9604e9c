//! Socket adapter for engines built on raw tungstenite streams (hyper, evented).
//!
//! The engine exposes its lifecycle as a single numeric state, which maps
//! one-to-one onto [`ReadyState`].

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Role};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::net::ConnectionId;
use crate::ws::driver::{self, DriverContext, FrameCodec, Inbound};
use crate::ws::socket::{sanitize_close, Outbound, Outbox, Payload, ReadyState, SocketAdapter, WebSocket};

/// Adapter over a tungstenite stream with a numeric ready state.
#[derive(Debug)]
pub(crate) struct NumericSocket {
    outbox: Outbox,
    state: AtomicU8,
}

impl NumericSocket {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Outbound>) {
        let (outbox, rx) = Outbox::new();
        let socket = Self {
            outbox,
            state: AtomicU8::new(ReadyState::Connecting as u8),
        };
        (Arc::new(socket), rx)
    }
}

impl SocketAdapter for NumericSocket {
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
        // Only the first close sends a frame.
        let previous = self.state.fetch_max(ReadyState::Closing as u8, Ordering::SeqCst);
        if ReadyState::from(previous) >= ReadyState::Closing {
            return;
        }
        self.outbox.push(Outbound::Close { code, reason });
    }

    fn buffered_amount(&self) -> u64 {
        self.outbox.buffered()
    }

    fn ready_state(&self) -> ReadyState {
        ReadyState::from(self.state.load(Ordering::SeqCst))
    }

    fn binary_type(&self) -> &'static str {
        "bytes"
    }

    fn advance(&self, state: ReadyState) {
        self.state.fetch_max(state as u8, Ordering::SeqCst);
    }
}

/// Frame translation for tungstenite messages.
pub(crate) struct TungsteniteCodec;

impl FrameCodec for TungsteniteCodec {
    type Message = Message;

    fn decode(message: Message) -> Inbound {
        match message {
            Message::Text(text) => Inbound::Data(Payload::Text(text.as_str().to_owned())),
            Message::Binary(bytes) => Inbound::Data(Payload::Binary(bytes)),
            Message::Close(frame) => Inbound::Close(frame.map(|f| (u16::from(f.code), f.reason.as_str().to_owned()))),
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Inbound::Control,
        }
    }

    fn encode(frame: Outbound) -> Message {
        match frame {
            Outbound::Data(Payload::Text(text)) => Message::Text(text.into()),
            Outbound::Data(Payload::Binary(bytes)) => Message::Binary(bytes),
            Outbound::Close { code, reason } => Message::Close(Some(CloseFrame {
                code: CloseCode::from(code),
                reason: reason.into(),
            })),
        }
    }
}

/// Finish a hyper upgrade in the background and drive the resulting socket.
pub(crate) fn spawn_upgraded(on_upgrade: OnUpgrade, ctx: DriverContext) {
    tokio::spawn(async move {
        let upgraded = match on_upgrade.await {
            Ok(upgraded) => upgraded,
            Err(e) => {
                tracing::warn!(engine = %ctx.engine, error = %e, "WebSocket upgrade did not complete");
                return;
            }
        };

        let stream = WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None).await;
        let (adapter, rx) = NumericSocket::new();
        let socket = WebSocket::new(ConnectionId::new(), adapter);
        driver::drive::<TungsteniteCodec, _, _>(stream, socket, rx, ctx).await;
    });
}
