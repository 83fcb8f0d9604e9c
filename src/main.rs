//! uniserve demo server
//!
//! Runs a small application on whichever engine is selected:
//!
//! ```text
//!   GET  /          engine banner
//!   POST /echo      echoes the body and its content type
//!   GET  /chat      WebSocket; every message is broadcast to the other members
//! ```
//!
//! Ctrl-C aborts the server through an `AbortController`, closes the chat
//! sockets, and waits for the process to go idle.

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dashmap::DashMap;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Method, StatusCode};

use uniserve::config::{load_config, load_tls_material, ServerConfig};
use uniserve::net::ConnectionId;
use uniserve::observability::{init_logging, metrics};
use uniserve::ws::SocketEvent;
use uniserve::{
    serve_on, wait_until_idle, AbortController, BoxError, HandlerContext, Response, Runtime, ServeOptions,
    SocketEventArgs, WebSocket,
};

/// How long to wait for open connections after stopping.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Close code sent to chat members on shutdown ("going away").
const GOING_AWAY: u16 = 1001;

#[derive(Parser)]
#[command(name = "uniserve")]
#[command(about = "Echo and chat server on any supported engine", long_about = None)]
struct Cli {
    /// Path to a TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Engine: auto, axum, hyper or evented (overrides config and UNISERVE_ENGINE).
    #[arg(short, long)]
    engine: Option<String>,
}

/// Chat member name attached at upgrade time.
struct Member {
    name: String,
}

type Room = Arc<DashMap<ConnectionId, WebSocket>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(port) = cli.port {
        config.listener.port = port;
    }

    init_logging(&config.observability.log_level, config.observability.log_format);
    tracing::info!("uniserve v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let runtime = match cli.engine.as_deref() {
        Some(engine) => Runtime::resolve(Some(engine)),
        None if std::env::var_os(uniserve::runtime::ENGINE_ENV).is_some() => Runtime::detect(),
        None => Runtime::resolve(Some(&config.runtime.engine)),
    };

    let room: Room = Arc::new(DashMap::new());
    let controller = AbortController::new();

    let mut options = ServeOptions::from_config(&config, move |ctx: HandlerContext| app(ctx, runtime))
        .signal(controller.signal())
        .socket_handler({
            let room = Arc::clone(&room);
            move |args: SocketEventArgs| chat(args, Arc::clone(&room))
        });

    if let Some(paths) = &config.listener.tls {
        let base = cli
            .config
            .as_deref()
            .and_then(|p| p.parent())
            .map(PathBuf::from)
            .unwrap_or_default();
        options = options.tls(load_tls_material(paths, &base)?);
    }

    let handle = serve_on(runtime, options).await?;
    tracing::info!(url = %handle.url(), engine = %handle.runtime(), "Ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Ctrl-C received, shutting down");
    controller.abort();
    handle.stopped().await;

    for socket in handle.open_sockets() {
        socket.close(Some(GOING_AWAY), Some("server shutting down"));
    }

    if tokio::time::timeout(DRAIN_TIMEOUT, wait_until_idle()).await.is_err() {
        tracing::warn!(
            connections = handle.active_connections(),
            "Connections still open after drain timeout"
        );
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn app(ctx: HandlerContext, runtime: Runtime) -> Result<Response, BoxError> {
    let method = ctx.request.method().clone();
    let path = ctx.request.path().to_owned();

    match (method, path.as_str()) {
        (Method::GET, "/") => Ok(Response::text(format!("uniserve on {}\n", runtime))),
        (Method::POST, "/echo") => {
            let content_type = ctx.request.headers().get(CONTENT_TYPE).cloned();
            let body = ctx.into_request().bytes().await?;
            let mut response = Response::new(body);
            if let Some(content_type) = content_type {
                response = response.with_header(CONTENT_TYPE, content_type);
            }
            Ok(response)
        }
        (Method::GET, "/chat") => {
            let name = ctx
                .request
                .url()
                .query_pairs()
                .find(|(k, _)| k == "name")
                .map(|(_, v)| v.into_owned())
                .unwrap_or_else(|| "anonymous".to_string());
            if ctx.upgrade_to_websocket(Member { name }) {
                return Ok(Response::empty());
            }
            Ok(Response::text("expected a WebSocket handshake\n")
                .with_status(StatusCode::UPGRADE_REQUIRED)
                .with_header(hyper::header::UPGRADE, HeaderValue::from_static("websocket")))
        }
        _ => Ok(Response::text("not found\n").with_status(StatusCode::NOT_FOUND)),
    }
}

async fn chat(args: SocketEventArgs, room: Room) {
    let name = args
        .context
        .get::<Member>()
        .map(|m| m.name.clone())
        .unwrap_or_default();
    let id = args.websocket.id();

    match &args.event {
        SocketEvent::Open => {
            room.insert(id, args.websocket.clone());
            tracing::info!(member = %name, members = room.len(), "Joined chat");
        }
        SocketEvent::Message(payload) => {
            for member in room.iter().filter(|entry| *entry.key() != id) {
                member.value().send(payload.clone());
            }
        }
        SocketEvent::Error(e) => {
            tracing::warn!(member = %name, error = %e, "Chat socket failed");
        }
        SocketEvent::Close { code, .. } => {
            room.remove(&id);
            tracing::info!(member = %name, code, members = room.len(), "Left chat");
        }
    }
}
