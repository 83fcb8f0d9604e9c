//! Stop and abort signalling.

use tokio::sync::watch;

/// Coordinator for stopping one listener.
///
/// Every long-running task of a server (accept loop, abort watcher) holds a
/// [`StopReceiver`]. Triggering is idempotent: only the first call returns
/// `true`.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Subscribe to the stop signal.
    pub fn subscribe(&self) -> StopReceiver {
        StopReceiver {
            rx: self.tx.subscribe(),
        }
    }

    /// Trigger the stop signal. Returns `false` if it was already triggered.
    pub fn trigger(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half of a [`Shutdown`].
#[derive(Debug, Clone)]
pub struct StopReceiver {
    rx: watch::Receiver<bool>,
}

impl StopReceiver {
    /// Resolve once the stop signal fires (immediately if it already has).
    pub async fn recv(&mut self) {
        // A dropped sender means the owning server is gone: treat as stopped.
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}

/// Owner side of a cancellation token handed to `serve` as `signal`.
#[derive(Debug)]
pub struct AbortController {
    tx: watch::Sender<bool>,
}

impl AbortController {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// A signal observing this controller.
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Abort every server started with this controller's signal.
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancellation token observed by a server.
///
/// Dropping the [`AbortController`] without calling `abort` does not abort.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve when the controller aborts. Pends forever if the controller is
    /// dropped without aborting.
    pub async fn aborted(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|aborted| *aborted).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn trigger_is_idempotent() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_triggered());
        assert!(shutdown.trigger());
        assert!(!shutdown.trigger());
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn late_subscriber_sees_stop() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        let mut rx = shutdown.subscribe();
        tokio::time::timeout(Duration::from_millis(100), rx.recv())
            .await
            .expect("stop already triggered");
    }

    #[tokio::test]
    async fn abort_signal_resolves() {
        let controller = AbortController::new();
        let signal = controller.signal();
        assert!(!signal.is_aborted());

        let waiter = tokio::spawn({
            let signal = signal.clone();
            async move { signal.aborted().await }
        });
        controller.abort();
        tokio::time::timeout(Duration::from_millis(500), waiter)
            .await
            .expect("abort observed")
            .unwrap();
        assert!(signal.is_aborted());
    }

    #[tokio::test]
    async fn dropped_controller_does_not_abort() {
        let controller = AbortController::new();
        let signal = controller.signal();
        drop(controller);
        let res = tokio::time::timeout(Duration::from_millis(50), signal.aborted()).await;
        assert!(res.is_err());
    }
}
