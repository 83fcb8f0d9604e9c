//! Engine modelled on event-emitting servers.
//!
//! The request body arrives as discrete [`BodyEvent`]s that are buffered
//! through a [`BodyAccumulator`] before the handler runs. The response is
//! written through a push-style [`ResponseWriter`]: head first, then chunks,
//! then `end` or `abort`.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::{BoxFuture, FutureExt};
use futures_util::StreamExt;
use hyper::body::{Bytes, Incoming};
use hyper::header::CONTENT_LENGTH;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::upgrade::OnUpgrade;
use hyper::{HeaderMap, Method, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};

use crate::engine::{complete_upgrade, spawn_accept_loop, Engine, EngineContext};
use crate::error::BoxError;
use crate::http::body::{Body, BodyAccumulator, BodyError, BodyEvent};
use crate::http::bridge::{into_native, Bridge, Dispatch, NativeResponse};
use crate::http::response::Response;
use crate::net::acceptor::Connection;
use crate::observability::metrics;
use crate::runtime::Runtime;
use crate::ws::handshake;

/// Chunks a writer may queue before `write` waits for the connection.
const WRITE_BUFFER: usize = 16;

pub(crate) struct EventedEngine;

impl Engine for EventedEngine {
    fn runtime(&self) -> Runtime {
        Runtime::Evented
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
            async move { Ok::<_, Infallible>(handle(bridge, request, remote).await) }
        });

        if let Err(e) = http1::Builder::new()
            .serve_connection(TokioIo::new(connection), service)
            .with_upgrades()
            .await
        {
            tracing::debug!(engine = %Runtime::Evented, connection_id = %id, error = %e, "Connection ended with error");
        }
    }
    .boxed()
}

async fn handle(bridge: Arc<Bridge>, request: hyper::Request<Incoming>, remote: SocketAddr) -> NativeResponse {
    let start = Instant::now();
    let (mut parts, incoming) = request.into_parts();

    let key = handshake::websocket_key(&parts.method, &parts.headers);
    let on_upgrade = match key {
        Some(_) => parts.extensions.remove::<OnUpgrade>(),
        None => None,
    };

    let body = if parts.method == Method::GET || parts.method == Method::HEAD {
        Body::Empty
    } else {
        match read_body(incoming, bridge.max_body_bytes).await {
            Ok(body) => body,
            Err(BodyError::TooLarge { limit }) => {
                tracing::debug!(engine = %bridge.engine, limit, "Request body too large");
                return bridge.respond(Response::plain(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large"), start);
            }
            Err(e) => {
                tracing::debug!(engine = %bridge.engine, error = %e, "Request body read failed");
                return bridge.respond(Response::plain(StatusCode::BAD_REQUEST, "Bad Request"), start);
            }
        }
    };

    let request = match bridge.request(parts, body, Some(remote)) {
        Ok(request) => request,
        Err(response) => return bridge.respond(response, start),
    };

    let upgrader = bridge.upgrader(key.is_some() && on_upgrade.is_some());
    let response = match bridge.dispatch(request, upgrader).await {
        Dispatch::Respond(response) => response,
        Dispatch::Upgrade(context) => return complete_upgrade(&bridge, key, on_upgrade, context, start),
    };

    metrics::record_request(bridge.engine, response.status().as_u16(), start);
    let (writer, head) = ResponseWriter::new(bridge.engine);
    tokio::spawn(write_response(response, writer));
    match head.await {
        Ok(native) => native,
        Err(_) => into_native(bridge.engine, Response::internal_error()),
    }
}

/// Re-emit the pulled body as data/end/error notifications.
async fn read_body(incoming: Incoming, limit: usize) -> Result<Body, BodyError> {
    let mut chunks = axum::body::Body::new(incoming).into_data_stream();
    let mut accumulator = BodyAccumulator::new(limit);
    loop {
        let event = match chunks.next().await {
            Some(Ok(chunk)) => BodyEvent::Data(chunk),
            Some(Err(e)) => BodyEvent::Error(Box::new(e)),
            None => BodyEvent::End,
        };
        if accumulator.push(event)? {
            break;
        }
    }
    accumulator.into_body()
}

/// Push-style response writer.
pub(crate) struct ResponseWriter {
    engine: Runtime,
    head: Option<oneshot::Sender<NativeResponse>>,
    chunks: Option<mpsc::Sender<Result<Bytes, BoxError>>>,
}

impl ResponseWriter {
    /// A writer and the receiver of the response head it will produce.
    pub(crate) fn new(engine: Runtime) -> (Self, oneshot::Receiver<NativeResponse>) {
        let (tx, rx) = oneshot::channel();
        let writer = Self {
            engine,
            head: Some(tx),
            chunks: None,
        };
        (writer, rx)
    }

    /// Send status and headers. Only the first call has an effect.
    pub(crate) fn write_head(&mut self, status: StatusCode, status_text: Option<String>, headers: HeaderMap) {
        let Some(head) = self.head.take() else {
            return;
        };

        let (tx, mut rx) = mpsc::channel(WRITE_BUFFER);
        let chunks = futures_util::stream::poll_fn(move |cx| rx.poll_recv(cx));
        let mut response = Response::new(Body::from_stream(chunks)).with_status(status);
        *response.headers_mut() = headers;
        if let Some(text) = status_text {
            response = response.with_status_text(text);
        }

        self.chunks = Some(tx);
        // The receiver is gone when hyper dropped the exchange.
        let _ = head.send(into_native(self.engine, response));
    }

    /// Queue a chunk. Returns `false` once the client is gone.
    pub(crate) async fn write(&mut self, chunk: Bytes) -> bool {
        match &self.chunks {
            Some(tx) => tx.send(Ok(chunk)).await.is_ok(),
            None => false,
        }
    }

    /// Finish the body.
    pub(crate) fn end(mut self) {
        self.chunks.take();
    }

    /// Fail the body. The connection is torn down instead of completing.
    pub(crate) async fn abort(mut self, error: BoxError) {
        if let Some(tx) = self.chunks.take() {
            let _ = tx.send(Err(error)).await;
        }
    }
}

/// Drain a canonical response into a writer.
async fn write_response(response: Response, mut writer: ResponseWriter) {
    let (status, status_text, mut headers, body) = response.into_parts();
    if let Some(len) = body.size_hint() {
        if !headers.contains_key(CONTENT_LENGTH) {
            headers.insert(CONTENT_LENGTH, len.into());
        }
    }
    writer.write_head(status, status_text, headers);

    match body {
        Body::Empty => writer.end(),
        Body::Full(bytes) => {
            writer.write(bytes).await;
            writer.end();
        }
        Body::Stream(mut stream) => {
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(chunk) => {
                        if !writer.write(chunk).await {
                            return;
                        }
                    }
                    Err(e) => {
                        writer.abort(e).await;
                        return;
                    }
                }
            }
            writer.end();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writer_emits_head_then_chunks() {
        let (writer, head) = ResponseWriter::new(Runtime::Evented);
        let chunks: Vec<Result<&'static str, std::io::Error>> = vec![Ok("a"), Ok("b"), Ok("c")];
        let response = Response::stream(futures_util::stream::iter(chunks)).with_status(StatusCode::ACCEPTED);
        tokio::spawn(write_response(response, writer));

        let native = head.await.unwrap();
        assert_eq!(native.status(), StatusCode::ACCEPTED);
        let body = axum::body::to_bytes(native.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, Bytes::from("abc"));
    }

    #[tokio::test]
    async fn full_body_sets_content_length() {
        let (writer, head) = ResponseWriter::new(Runtime::Evented);
        tokio::spawn(write_response(Response::text("hello"), writer));

        let native = head.await.unwrap();
        assert_eq!(native.headers()[CONTENT_LENGTH], "5");
        let body = axum::body::to_bytes(native.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, Bytes::from("hello"));
    }

    #[tokio::test]
    async fn aborted_stream_fails_the_body() {
        let (writer, head) = ResponseWriter::new(Runtime::Evented);
        let chunks: Vec<Result<&'static str, std::io::Error>> =
            vec![Ok("partial"), Err(std::io::Error::other("source failed"))];
        tokio::spawn(write_response(Response::stream(futures_util::stream::iter(chunks)), writer));

        let native = head.await.unwrap();
        assert!(axum::body::to_bytes(native.into_body(), usize::MAX).await.is_err());
    }
}
