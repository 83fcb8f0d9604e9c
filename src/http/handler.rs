//! The request handler contract.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};

use crate::error::BoxError;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::ws::upgrade::{UpgradeContext, Upgrader};

/// What a handler receives for one request: the request itself and the
/// capability to take the connection over as a WebSocket.
#[derive(Debug)]
pub struct HandlerContext {
    pub request: Request,
    pub upgrader: Upgrader,
}

impl HandlerContext {
    pub fn new(request: Request, upgrader: Upgrader) -> Self {
        Self { request, upgrader }
    }

    /// Shorthand for `self.upgrader.upgrade_to_websocket(context)`.
    pub fn upgrade_to_websocket<T: Any + Send + Sync>(&self, context: T) -> bool {
        self.upgrader.upgrade_to_websocket(context)
    }

    pub fn upgrade_with(&self, context: UpgradeContext) -> bool {
        self.upgrader.upgrade_with(context)
    }

    pub fn into_request(self) -> Request {
        self.request
    }
}

/// Produces a response for every request, on every engine.
///
/// An `Err` becomes `500 Internal Server Error`.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, ctx: HandlerContext) -> BoxFuture<'static, Result<Response, BoxError>>;
}

impl<F, Fut, E> Handler for F
where
    F: Fn(HandlerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, E>> + Send + 'static,
    E: Into<BoxError> + 'static,
{
    fn call(&self, ctx: HandlerContext) -> BoxFuture<'static, Result<Response, BoxError>> {
        (self)(ctx).map(|result| result.map_err(Into::into)).boxed()
    }
}

pub(crate) type SharedHandler = Arc<dyn Handler>;
