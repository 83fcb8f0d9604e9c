//! `serve`: detect the engine, bind, and start.

use std::fmt;
use std::sync::Arc;

use crate::config::schema::ServerConfig;
use crate::engine::{engine_for, EngineContext};
use crate::error::{ServeError, ServeResult};
use crate::http::bridge::Bridge;
use crate::http::handler::{Handler, SharedHandler};
use crate::lifecycle::manager::Lifecycle;
use crate::lifecycle::shutdown::AbortSignal;
use crate::net::{listener, tls, ConnectionTracker, TlsConfig};
use crate::runtime::{Runtime, ENGINE_ENV};
use crate::server::handle::{ServerAddress, ServerHandle, Transport};
use crate::ws::event::{SharedSocketHandler, SocketHandler};
use crate::ws::registry::SocketRegistry;

/// Hostname bound when none is given.
pub const DEFAULT_HOSTNAME: &str = "0.0.0.0";
pub const DEFAULT_MAX_CONNECTIONS: usize = 10_000;
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Options accepted by [`serve`].
#[derive(Clone)]
pub struct ServeOptions {
    handler: SharedHandler,
    port: u16,
    hostname: Option<String>,
    signal: Option<AbortSignal>,
    tls: Option<TlsConfig>,
    reuse_port: bool,
    socket_handler: Option<SharedSocketHandler>,
    max_connections: usize,
    max_body_bytes: usize,
}

impl ServeOptions {
    /// Options with `handler` and defaults for everything else: an ephemeral
    /// port on the wildcard address, no TLS, no socket handler.
    pub fn new(handler: impl Handler) -> Self {
        Self {
            handler: Arc::new(handler),
            port: 0,
            hostname: None,
            signal: None,
            tls: None,
            reuse_port: false,
            socket_handler: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Options from the listener section of a validated config. TLS material
    /// is read separately with `config::load_tls_material`.
    pub fn from_config(config: &ServerConfig, handler: impl Handler) -> Self {
        let listener = &config.listener;
        Self::new(handler)
            .hostname(listener.hostname.clone())
            .port(listener.port)
            .reuse_port(listener.reuse_port)
            .max_connections(listener.max_connections)
            .max_body_bytes(listener.max_body_bytes)
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Stop the server when `signal` is aborted.
    pub fn signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Serve over TLS.
    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn reuse_port(mut self, reuse_port: bool) -> Self {
        self.reuse_port = reuse_port;
        self
    }

    /// Receive the events of every upgraded socket. Without one, upgrades fail.
    pub fn socket_handler(mut self, handler: impl SocketHandler) -> Self {
        self.socket_handler = Some(Arc::new(handler));
        self
    }

    pub fn max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Request body limit of the buffering engine. Larger bodies get `413`.
    pub fn max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }
}

impl fmt::Debug for ServeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServeOptions")
            .field("port", &self.port)
            .field("hostname", &self.hostname)
            .field("signal", &self.signal.is_some())
            .field("tls", &self.tls)
            .field("reuse_port", &self.reuse_port)
            .field("socket_handler", &self.socket_handler.is_some())
            .field("max_connections", &self.max_connections)
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

/// Serve on the detected engine.
///
/// The engine comes from `UNISERVE_ENGINE`, else the first compiled in.
pub async fn serve(options: ServeOptions) -> ServeResult<ServerHandle> {
    let runtime = Runtime::detect();
    if runtime == Runtime::Unknown {
        let requested = std::env::var(ENGINE_ENV).unwrap_or_default();
        return Err(ServeError::UnknownRuntime(requested));
    }
    serve_on(runtime, options).await
}

/// Serve on an explicitly chosen engine.
pub async fn serve_on(runtime: Runtime, options: ServeOptions) -> ServeResult<ServerHandle> {
    let engine = engine_for(runtime).ok_or_else(|| ServeError::UnknownRuntime(runtime.to_string()))?;
    let runtime = engine.runtime();

    let acceptor = match &options.tls {
        Some(material) => Some(tls::acceptor(material).await?),
        None => None,
    };

    let hostname = options.hostname.unwrap_or_else(|| DEFAULT_HOSTNAME.to_string());
    let tcp = listener::bind(&hostname, options.port, options.reuse_port)
        .await
        .map_err(|source| ServeError::Bind {
            address: format!("{}:{}", hostname, options.port),
            source,
        })?;
    let local_addr = tcp.local_addr()?;

    let registry = SocketRegistry::new();
    let connections = ConnectionTracker::new(runtime);
    let lifecycle = Lifecycle::new(runtime);

    let bridge = Arc::new(Bridge {
        engine: runtime,
        handler: options.handler,
        socket_handler: options.socket_handler,
        registry: registry.clone(),
        tls: acceptor.is_some(),
        local_addr,
        max_body_bytes: options.max_body_bytes,
    });

    let address = ServerAddress {
        hostname,
        port: local_addr.port(),
        transport: Transport::Tcp,
        tls: acceptor.is_some(),
        local_addr,
    };

    engine.start(
        tcp,
        EngineContext {
            bridge,
            lifecycle: Arc::clone(&lifecycle),
            connections: connections.clone(),
            tls: acceptor,
            max_connections: options.max_connections,
        },
    )?;

    if let Some(signal) = options.signal {
        lifecycle.watch_abort(signal);
    }

    tracing::info!(
        engine = %runtime,
        address = %local_addr,
        tls = address.tls,
        "Server listening"
    );

    Ok(ServerHandle::new(runtime, address, lifecycle, connections, registry))
}
