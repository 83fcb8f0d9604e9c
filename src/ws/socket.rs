//! Canonical WebSocket handle.
//!
//! # Responsibilities
//! - Identical observable behavior for sockets from every engine
//! - Ready-state numbering shared by all engines (0..=3)
//! - Close code/reason sanitizing and buffered-byte accounting
//!
//! # Design Decisions
//! - Sends never fail; frames for a closing/closed socket are dropped but
//!   still counted
//! - The buffered amount is cumulative: it grows with every send and never
//!   decreases for the lifetime of the connection
//! - Outbound frames go through an unbounded queue drained by the
//!   connection's writer task

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hyper::body::Bytes;
use tokio::sync::mpsc;

use crate::net::ConnectionId;

/// Close code used when none is supplied.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Reported when the peer closed without a status code.
pub const NO_STATUS_RECEIVED: u16 = 1005;
/// Reported when the connection dropped without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;
/// Longest reason that fits a close frame (125 - 2 code bytes).
pub const MAX_REASON_BYTES: usize = 123;

/// Connection lifecycle status.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl From<u8> for ReadyState {
    fn from(val: u8) -> Self {
        match val {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }
}

impl ReadyState {
    /// Translate an engine that reports its state as separate flags.
    pub fn from_flags(opened: bool, closing: bool, closed: bool) -> Self {
        if closed {
            ReadyState::Closed
        } else if closing {
            ReadyState::Closing
        } else if opened {
            ReadyState::Open
        } else {
            ReadyState::Connecting
        }
    }
}

/// A data frame payload. The text/binary distinction is preserved end to end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Bytes),
}

impl Payload {
    pub fn len(&self) -> usize {
        match self {
            Payload::Text(text) => text.len(),
            Payload::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Payload::Text(_))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            Payload::Binary(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(text) => text.as_bytes(),
            Payload::Binary(bytes) => bytes,
        }
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Payload::Binary(bytes)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Binary(Bytes::from(bytes))
    }
}

/// Frames queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outbound {
    Data(Payload),
    Close { code: u16, reason: String },
}

impl Outbound {
    /// Bytes this frame contributes to the buffered amount.
    pub(crate) fn size(&self) -> u64 {
        match self {
            Outbound::Data(payload) => payload.len() as u64,
            Outbound::Close { reason, .. } => 2 + reason.len() as u64,
        }
    }
}

/// Whether a close code may be sent on the wire.
pub fn is_sendable_close_code(code: u16) -> bool {
    matches!(code, 1000..=4999) && !matches!(code, 1004 | 1005 | 1006 | 1015)
}

/// Apply protocol limits to a close request.
///
/// Sendable codes and reasons within the frame limit pass through unchanged.
pub(crate) fn sanitize_close(code: Option<u16>, reason: Option<&str>) -> (u16, String) {
    let code = match code {
        None => NORMAL_CLOSURE,
        Some(code) if is_sendable_close_code(code) => code,
        Some(code) => {
            tracing::warn!(code, "Close code cannot be sent; using 1000");
            NORMAL_CLOSURE
        }
    };

    let reason = reason.unwrap_or_default();
    let reason = if reason.len() > MAX_REASON_BYTES {
        let mut end = MAX_REASON_BYTES;
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        tracing::warn!(len = reason.len(), "Close reason exceeds 123 bytes; truncating");
        &reason[..end]
    } else {
        reason
    };

    (code, reason.to_string())
}

/// Outbound queue shared by every adapter.
#[derive(Debug)]
pub(crate) struct Outbox {
    tx: mpsc::UnboundedSender<Outbound>,
    buffered: AtomicU64,
}

impl Outbox {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                buffered: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Queue a frame for the writer. Frames the writer can no longer take are
    /// dropped, and stay counted.
    pub(crate) fn push(&self, frame: Outbound) {
        self.buffered.fetch_add(frame.size(), Ordering::SeqCst);
        let _ = self.tx.send(frame);
    }

    /// Count a frame that was refused without queueing it.
    pub(crate) fn drop_frame(&self, frame: &Outbound) {
        self.buffered.fetch_add(frame.size(), Ordering::SeqCst);
    }

    pub(crate) fn buffered(&self) -> u64 {
        self.buffered.load(Ordering::SeqCst)
    }
}

/// The capability set every engine's socket adapter provides.
pub(crate) trait SocketAdapter: Send + Sync + 'static {
    fn send(&self, payload: Payload);
    fn close(&self, code: Option<u16>, reason: Option<&str>);
    fn buffered_amount(&self) -> u64;
    fn ready_state(&self) -> ReadyState;
    fn binary_type(&self) -> &'static str;

    /// Advance the lifecycle. Implementations never move backwards.
    fn advance(&self, state: ReadyState);
}

/// An open (or formerly open) WebSocket connection.
///
/// Clones refer to the same connection; equality and hashing use the
/// connection id, so handles can be kept in sets for broadcasting.
#[derive(Clone)]
pub struct WebSocket {
    id: ConnectionId,
    adapter: Arc<dyn SocketAdapter>,
}

impl WebSocket {
    pub(crate) fn new(id: ConnectionId, adapter: Arc<dyn SocketAdapter>) -> Self {
        Self { id, adapter }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Transmit a text or binary frame. Silently dropped once closing.
    pub fn send(&self, payload: impl Into<Payload>) {
        self.adapter.send(payload.into());
    }

    /// Start the closing handshake. `None` code means 1000.
    pub fn close(&self, code: Option<u16>, reason: Option<&str>) {
        self.adapter.close(code, reason);
    }

    /// Bytes handed to the transmit primitive since the socket opened.
    /// Never decreases, including after close.
    pub fn buffered_amount(&self) -> u64 {
        self.adapter.buffered_amount()
    }

    pub fn ready_state(&self) -> ReadyState {
        self.adapter.ready_state()
    }

    /// Container type of incoming binary payloads on this engine.
    pub fn binary_type(&self) -> &'static str {
        self.adapter.binary_type()
    }

    pub(crate) fn adapter(&self) -> &Arc<dyn SocketAdapter> {
        &self.adapter
    }
}

impl PartialEq for WebSocket {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for WebSocket {}

impl Hash for WebSocket {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for WebSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocket")
            .field("id", &self.id)
            .field("ready_state", &self.ready_state())
            .field("buffered_amount", &self.buffered_amount())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_state_numbering() {
        for n in 0u8..=3 {
            assert_eq!(ReadyState::from(n) as u8, n);
        }
        assert_eq!(ReadyState::from(9), ReadyState::Closed);
    }

    #[test]
    fn flags_translate() {
        assert_eq!(ReadyState::from_flags(false, false, false), ReadyState::Connecting);
        assert_eq!(ReadyState::from_flags(true, false, false), ReadyState::Open);
        assert_eq!(ReadyState::from_flags(true, true, false), ReadyState::Closing);
        assert_eq!(ReadyState::from_flags(true, true, true), ReadyState::Closed);
        assert_eq!(ReadyState::from_flags(false, false, true), ReadyState::Closed);
    }

    #[test]
    fn close_codes_pass_through() {
        assert_eq!(sanitize_close(None, None), (1000, String::new()));
        assert_eq!(sanitize_close(Some(4321), Some("bye")), (4321, "bye".to_string()));
        assert_eq!(sanitize_close(Some(1006), None).0, 1000);
        assert_eq!(sanitize_close(Some(999), None).0, 1000);
        assert_eq!(sanitize_close(Some(5000), None).0, 1000);
    }

    #[test]
    fn long_reason_cut_on_char_boundary() {
        let reason = "é".repeat(100); // 200 bytes
        let (_, cut) = sanitize_close(Some(4000), Some(&reason));
        assert!(cut.len() <= MAX_REASON_BYTES);
        assert_eq!(cut.len(), 122);
        assert!(reason.starts_with(&cut));

        let exact = "x".repeat(MAX_REASON_BYTES);
        assert_eq!(sanitize_close(Some(4000), Some(&exact)).1, exact);
    }

    #[test]
    fn outbox_count_never_decreases() {
        let (outbox, mut rx) = Outbox::new();
        outbox.push(Outbound::Data(Payload::from(vec![0u8; 1024])));
        outbox.push(Outbound::Data(Payload::from("abc")));
        assert_eq!(outbox.buffered(), 1027);

        // Draining the queue does not shrink the count.
        rx.try_recv().unwrap();
        rx.try_recv().unwrap();
        assert_eq!(outbox.buffered(), 1027);

        drop(rx);
        outbox.push(Outbound::Data(Payload::from("late")));
        outbox.drop_frame(&Outbound::Data(Payload::from("x")));
        assert_eq!(outbox.buffered(), 1032);
    }
}
