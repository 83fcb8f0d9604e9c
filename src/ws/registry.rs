//! Open sockets of one server, keyed by connection.
//!
//! An entry is written once when the socket opens and removed once it
//! closes, so concurrent connections never write the same key.

use std::sync::Arc;

use dashmap::DashMap;

use crate::net::ConnectionId;
use crate::ws::socket::WebSocket;

#[derive(Debug, Clone, Default)]
pub struct SocketRegistry {
    sockets: Arc<DashMap<ConnectionId, WebSocket>>,
}

impl SocketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, socket: WebSocket) {
        self.sockets.insert(socket.id(), socket);
    }

    pub(crate) fn remove(&self, id: ConnectionId) -> Option<WebSocket> {
        self.sockets.remove(&id).map(|(_, socket)| socket)
    }

    pub fn get(&self, id: ConnectionId) -> Option<WebSocket> {
        self.sockets.get(&id).map(|entry| entry.value().clone())
    }

    /// Snapshot of every open socket.
    pub fn sockets(&self) -> Vec<WebSocket> {
        self.sockets.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sockets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }
}
