//! Process keep-alive registry.
//!
//! Listeners, connections and sockets each hold a [`KeepAliveToken`] while
//! they should keep the process running. A binary awaits
//! [`wait_until_idle`] to exit once nothing holds the process open.
//!
//! `ServerHandle::unref` drops only the listener's token; tokens held by
//! connections and sockets are independent of it.

use std::sync::OnceLock;
use tokio::sync::watch;

fn holds() -> &'static watch::Sender<usize> {
    static HOLDS: OnceLock<watch::Sender<usize>> = OnceLock::new();
    HOLDS.get_or_init(|| watch::channel(0).0)
}

/// A single hold on the process. Released on drop.
#[derive(Debug)]
pub struct KeepAliveToken {
    _private: (),
}

impl KeepAliveToken {
    pub fn acquire() -> Self {
        holds().send_modify(|n| *n += 1);
        Self { _private: () }
    }
}

impl Drop for KeepAliveToken {
    fn drop(&mut self) {
        holds().send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Number of outstanding holds across every server in the process.
pub fn active_holds() -> usize {
    *holds().borrow()
}

/// Resolve once no listener, connection or socket holds the process open.
pub async fn wait_until_idle() {
    let mut rx = holds().subscribe();
    // The sender lives in a static, so the channel never closes.
    let _ = rx.wait_for(|n| *n == 0).await;
}
