//! Engine on raw hyper connections (HTTP/1 and HTTP/2 via `hyper_util`'s
//! auto builder). Request bodies are passed through as pull streams.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::{BoxFuture, FutureExt};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use tokio::net::TcpListener;

use crate::engine::{complete_upgrade, spawn_accept_loop, Engine, EngineContext};
use crate::http::body::Body;
use crate::http::bridge::{Bridge, Dispatch, NativeResponse};
use crate::net::acceptor::Connection;
use crate::runtime::Runtime;
use crate::ws::handshake;

pub(crate) struct HyperEngine;

impl Engine for HyperEngine {
    fn runtime(&self) -> Runtime {
        Runtime::Hyper
    }

    fn start(&self, listener: TcpListener, ctx: EngineContext) -> std::io::Result<()> {
        spawn_accept_loop(listener, ctx, serve_connection);
        Ok(())
    }
}

fn serve_connection(connection: Connection, remote: SocketAddr, bridge: Arc<Bridge>) -> BoxFuture<'static, ()> {
    async move {
        let id = connection.id();
        let service = service_fn(move |request| {
            let bridge = Arc::clone(&bridge);
            async move { Ok::<_, Infallible>(handle(&bridge, request, remote).await) }
        });

        let builder = auto::Builder::new(TokioExecutor::new());
        if let Err(e) = builder
            .serve_connection_with_upgrades(TokioIo::new(connection), service)
            .await
        {
            tracing::debug!(engine = %Runtime::Hyper, connection_id = %id, error = %e, "Connection ended with error");
        }
    }
    .boxed()
}

async fn handle(bridge: &Bridge, request: hyper::Request<Incoming>, remote: SocketAddr) -> NativeResponse {
    let start = Instant::now();
    let (mut parts, incoming) = request.into_parts();

    let key = handshake::websocket_key(&parts.method, &parts.headers);
    let on_upgrade = match key {
        Some(_) => parts.extensions.remove::<OnUpgrade>(),
        None => None,
    };

    let body = Body::from_stream(axum::body::Body::new(incoming).into_data_stream());
    let request = match bridge.request(parts, body, Some(remote)) {
        Ok(request) => request,
        Err(response) => return bridge.respond(response, start),
    };

    let upgrader = bridge.upgrader(key.is_some() && on_upgrade.is_some());
    match bridge.dispatch(request, upgrader).await {
        Dispatch::Respond(response) => bridge.respond(response, start),
        Dispatch::Upgrade(context) => complete_upgrade(bridge, key, on_upgrade, context, start),
    }
}
