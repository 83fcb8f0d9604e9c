//! Per-server lifecycle: stop, abort wiring, and the listener's keep-alive hold.
//!
//! # State Machine
//! ```text
//! Listening ──stop() / abort signal──▶ Stopping ──accept loop exits──▶ Closed
//! ```
//!
//! # Design Decisions
//! - `stop` and the abort signal share one code path
//! - Stopping only ends accepting; in-flight exchanges and sockets run on
//! - `unref`/`keep_alive` only move the listener's token

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;

use crate::lifecycle::keepalive::KeepAliveToken;
use crate::lifecycle::shutdown::{AbortSignal, Shutdown, StopReceiver};
use crate::runtime::Runtime;

pub(crate) struct Lifecycle {
    engine: Runtime,
    shutdown: Shutdown,
    listener_hold: Mutex<Option<KeepAliveToken>>,
    closed: watch::Sender<bool>,
}

impl Lifecycle {
    pub(crate) fn new(engine: Runtime) -> Arc<Self> {
        let (closed, _) = watch::channel(false);
        Arc::new(Self {
            engine,
            shutdown: Shutdown::new(),
            listener_hold: Mutex::new(Some(KeepAliveToken::acquire())),
            closed,
        })
    }

    fn hold(&self) -> MutexGuard<'_, Option<KeepAliveToken>> {
        match self.listener_hold.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Stop accepting. Returns `false` if the server was already stopping.
    pub(crate) fn stop(&self) -> bool {
        if !self.shutdown.trigger() {
            tracing::debug!(engine = %self.engine, "Stop requested again, ignoring");
            return false;
        }
        tracing::info!(engine = %self.engine, "Stopping server");
        true
    }

    pub(crate) fn is_stopping(&self) -> bool {
        self.shutdown.is_triggered()
    }

    pub(crate) fn stop_receiver(&self) -> StopReceiver {
        self.shutdown.subscribe()
    }

    /// Route an abort signal into [`stop`](Self::stop).
    pub(crate) fn watch_abort(self: &Arc<Self>, signal: AbortSignal) {
        let lifecycle = Arc::clone(self);
        let mut stop_rx = self.stop_receiver();
        tokio::spawn(async move {
            tokio::select! {
                _ = signal.aborted() => {
                    tracing::debug!(engine = %lifecycle.engine, "Abort signal received");
                    lifecycle.stop();
                }
                _ = stop_rx.recv() => {}
            }
        });
    }

    /// Let the listener keep the process alive again.
    pub(crate) fn keep_alive(&self) {
        if self.is_closed() {
            return;
        }
        let mut hold = self.hold();
        if hold.is_none() {
            *hold = Some(KeepAliveToken::acquire());
        }
    }

    /// Stop the listener alone from keeping the process alive.
    pub(crate) fn unref(&self) {
        self.hold().take();
    }

    #[cfg(test)]
    fn holds_process(&self) -> bool {
        self.hold().is_some()
    }

    /// Called by the accept loop once it no longer owns the listening socket.
    pub(crate) fn mark_closed(&self) {
        self.hold().take();
        self.closed.send_replace(true);
        tracing::info!(engine = %self.engine, "Listener closed");
    }

    pub(crate) fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    pub(crate) async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        // The sender lives as long as `self`.
        let _ = rx.wait_for(|closed| *closed).await;
    }
}
