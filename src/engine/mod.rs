//! Engine dispatch.
//!
//! # Data Flow
//! ```text
//! serve_on(runtime)
//!     → engine_for(runtime) → Box<dyn Engine>
//!     → Engine::start(listener, EngineContext)
//!         axum_engine.rs     axum Router served by axum-server
//!         hyper_engine.rs    own accept loop, hyper auto (HTTP/1 + HTTP/2), streamed bodies
//!         evented_engine.rs  own accept loop, hyper HTTP/1, push-style body events
//! ```
//!
//! # Design Decisions
//! - One trait, one implementation per engine, chosen from the detector result
//! - Engines own transport only; handler semantics live in `http::bridge`

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum_server::tls_rustls::RustlsAcceptor;
use futures_util::future::BoxFuture;
use hyper::header::HeaderValue;
use hyper::upgrade::OnUpgrade;
use tokio::net::TcpListener;

use crate::http::bridge::{Bridge, NativeResponse};
use crate::http::response::Response;
use crate::lifecycle::manager::Lifecycle;
use crate::net::acceptor::{Connection, ConnectionAcceptor};
use crate::net::connection::ConnectionTracker;
use crate::net::listener::{Listener, ListenerError};
use crate::observability::metrics;
use crate::runtime::Runtime;
use crate::ws::upgrade::UpgradeContext;
use crate::ws::{adapter, handshake};

#[cfg(feature = "engine-axum")]
pub(crate) mod axum_engine;
#[cfg(feature = "engine-evented")]
pub(crate) mod evented_engine;
#[cfg(feature = "engine-hyper")]
pub(crate) mod hyper_engine;

/// Pause after a failed `accept` so a persistent error does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Everything an engine needs to serve on a bound listener.
pub(crate) struct EngineContext {
    pub(crate) bridge: Arc<Bridge>,
    pub(crate) lifecycle: Arc<Lifecycle>,
    pub(crate) connections: ConnectionTracker,
    pub(crate) tls: Option<RustlsAcceptor>,
    pub(crate) max_connections: usize,
}

impl EngineContext {
    fn acceptor(&self) -> ConnectionAcceptor {
        ConnectionAcceptor::new(self.tls.clone(), self.connections.clone(), self.max_connections)
    }
}

pub(crate) trait Engine: Send + Sync {
    fn runtime(&self) -> Runtime;

    /// Start serving in the background. Returns once the accept loop is spawned.
    fn start(&self, listener: TcpListener, ctx: EngineContext) -> std::io::Result<()>;
}

/// The engine implementing `runtime`, if it is compiled in.
pub(crate) fn engine_for(runtime: Runtime) -> Option<Box<dyn Engine>> {
    match runtime {
        #[cfg(feature = "engine-axum")]
        Runtime::Axum => Some(Box::new(axum_engine::AxumEngine)),
        #[cfg(feature = "engine-hyper")]
        Runtime::Hyper => Some(Box::new(hyper_engine::HyperEngine)),
        #[cfg(feature = "engine-evented")]
        Runtime::Evented => Some(Box::new(evented_engine::EventedEngine)),
        _ => None,
    }
}

/// Serves one established connection.
pub(crate) type ServeConnection = fn(Connection, SocketAddr, Arc<Bridge>) -> BoxFuture<'static, ()>;

/// Accept loop shared by the engines that drive hyper connections themselves.
pub(crate) fn spawn_accept_loop(listener: TcpListener, ctx: EngineContext, serve: ServeConnection) {
    let acceptor = ctx.acceptor();
    let EngineContext {
        bridge,
        lifecycle,
        max_connections,
        ..
    } = ctx;
    let engine = bridge.engine;
    let listener = Listener::new(listener, max_connections);
    let mut stop = lifecycle.stop_receiver();

    tokio::spawn(async move {
        loop {
            let accepted = tokio::select! {
                _ = stop.recv() => break,
                accepted = listener.accept() => accepted,
            };

            let (tcp, remote, permit) = match accepted {
                Ok(accepted) => accepted,
                Err(ListenerError::LimiterClosed) => break,
                Err(e) => {
                    tracing::warn!(engine = %engine, error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            let acceptor = acceptor.clone();
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move {
                let connection = match acceptor.establish(tcp, permit).await {
                    Ok(connection) => connection,
                    Err(e) => {
                        tracing::debug!(engine = %engine, peer_addr = %remote, error = %e, "Connection setup failed");
                        return;
                    }
                };
                let id = connection.id();
                tracing::trace!(engine = %engine, connection_id = %id, peer_addr = %remote, "Serving connection");
                serve(connection, remote, bridge).await;
            });
        }

        drop(listener);
        lifecycle.mark_closed();
    });
}

/// Finish an accepted upgrade on a hyper connection: answer `101` and hand
/// the raw stream to the socket driver once hyper releases it.
pub(crate) fn complete_upgrade(
    bridge: &Bridge,
    key: Option<HeaderValue>,
    on_upgrade: Option<OnUpgrade>,
    context: UpgradeContext,
    start: Instant,
) -> NativeResponse {
    match (key, on_upgrade, bridge.driver_context(context)) {
        (Some(key), Some(on_upgrade), Some(driver)) => {
            adapter::spawn_upgraded(on_upgrade, driver);
            metrics::record_request(bridge.engine, 101, start);
            handshake::switching_protocols(&key)
        }
        _ => {
            tracing::error!(engine = %bridge.engine, "Upgrade accepted without a usable handshake");
            bridge.respond(Response::internal_error(), start)
        }
    }
}
