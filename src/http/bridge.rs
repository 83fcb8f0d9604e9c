//! Request/response bridge shared by every engine.
//!
//! # Responsibilities
//! - Normalize a native request into a [`Request`]
//! - Run the handler, turning errors and panics into `500`
//! - Decide between a plain response and an accepted upgrade
//! - Write a [`Response`] back as a native hyper response
//!
//! # Design Decisions
//! - Engines own transport details only; handler semantics live here
//! - A failure while streaming a response body aborts that response and is
//!   logged, the server keeps running

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures_util::{FutureExt, StreamExt, TryStreamExt};
use hyper::ext::ReasonPhrase;
use hyper::http::request::Parts;
use hyper::{http, StatusCode};

use crate::http::body::Body;
use crate::http::handler::{HandlerContext, SharedHandler};
use crate::http::request::Request;
use crate::http::response::Response;
use crate::observability::metrics;
use crate::runtime::Runtime;
use crate::ws::driver::DriverContext;
use crate::ws::event::SharedSocketHandler;
use crate::ws::registry::SocketRegistry;
use crate::ws::upgrade::{UpgradeContext, Upgrader};

/// Native response type written by every engine.
pub(crate) type NativeResponse = http::Response<axum::body::Body>;

/// Result of running the handler for one request.
pub(crate) enum Dispatch {
    Respond(Response),
    Upgrade(UpgradeContext),
}

/// Per-server state every engine needs to serve a request.
pub(crate) struct Bridge {
    pub(crate) engine: Runtime,
    pub(crate) handler: SharedHandler,
    pub(crate) socket_handler: Option<SharedSocketHandler>,
    pub(crate) registry: SocketRegistry,
    pub(crate) tls: bool,
    pub(crate) local_addr: SocketAddr,
    pub(crate) max_body_bytes: usize,
}

impl Bridge {
    /// Normalize native parts. Returns the `400` to send when the request
    /// cannot be expressed as an absolute URL.
    pub(crate) fn request(
        &self,
        parts: Parts,
        body: Body,
        remote_addr: Option<SocketAddr>,
    ) -> Result<Request, Response> {
        Request::from_parts(parts, body, self.tls, self.local_addr, remote_addr).map_err(|e| {
            tracing::debug!(engine = %self.engine, error = %e, "Rejecting malformed request");
            Response::plain(StatusCode::BAD_REQUEST, "Bad Request")
        })
    }

    /// An upgrader for a request whose handshake validity the engine decided.
    pub(crate) fn upgrader(&self, handshake_valid: bool) -> Upgrader {
        Upgrader::new(handshake_valid, self.socket_handler.is_some())
    }

    /// Run the handler.
    pub(crate) async fn dispatch(&self, request: Request, upgrader: Upgrader) -> Dispatch {
        let method = request.method().clone();
        let path = request.path().to_owned();
        let ctx = HandlerContext::new(request, upgrader.clone());

        let outcome = match std::panic::catch_unwind(AssertUnwindSafe(|| self.handler.call(ctx))) {
            Ok(fut) => AssertUnwindSafe(fut).catch_unwind().await,
            Err(panic) => Err(panic),
        };

        match outcome {
            Ok(Ok(response)) => match upgrader.take_accepted() {
                Some(context) => {
                    tracing::debug!(engine = %self.engine, method = %method, path = %path, "Upgrade accepted");
                    Dispatch::Upgrade(context)
                }
                None => Dispatch::Respond(response),
            },
            Ok(Err(e)) => {
                tracing::error!(engine = %self.engine, method = %method, path = %path, error = %e, "Handler failed");
                Dispatch::Respond(Response::internal_error())
            }
            Err(_) => {
                tracing::error!(engine = %self.engine, method = %method, path = %path, "Handler panicked");
                Dispatch::Respond(Response::internal_error())
            }
        }
    }

    /// Context for the socket driver of an accepted upgrade.
    pub(crate) fn driver_context(&self, context: UpgradeContext) -> Option<DriverContext> {
        let handler = self.socket_handler.clone()?;
        Some(DriverContext {
            engine: self.engine,
            handler,
            context,
            registry: self.registry.clone(),
        })
    }

    /// Convert a canonical response and record it.
    pub(crate) fn respond(&self, response: Response, start: Instant) -> NativeResponse {
        metrics::record_request(self.engine, response.status().as_u16(), start);
        into_native(self.engine, response)
    }
}

/// Write a canonical response as a hyper response.
pub(crate) fn into_native(engine: Runtime, response: Response) -> NativeResponse {
    let (status, status_text, headers, body) = response.into_parts();

    let body = match body {
        Body::Stream(stream) => Body::Stream(
            stream
                .inspect_err(move |e| {
                    tracing::warn!(engine = %engine, error = %e, "Response body stream failed, aborting response");
                    metrics::record_body_abort(engine);
                })
                .boxed(),
        ),
        other => other,
    };

    let mut native = http::Response::new(body.into_axum());
    *native.status_mut() = status;
    *native.headers_mut() = headers;

    if let Some(text) = status_text {
        match ReasonPhrase::try_from(text.into_bytes()) {
            Ok(reason) => {
                native.extensions_mut().insert(reason);
            }
            Err(_) => tracing::debug!(engine = %engine, "Dropping invalid status text"),
        }
    }

    native
}
