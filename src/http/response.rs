//! Canonical response.
//!
//! # Responsibilities
//! - Status, optional status text, headers, and body on every engine
//! - Convenience constructors for text, JSON, empty and streamed bodies
//!
//! # Design Decisions
//! - Status text travels as an HTTP/1 reason phrase; HTTP/2 has none
//! - Invalid header values are rejected at insertion, not on the wire

use hyper::body::Bytes;
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::{HeaderMap, StatusCode};
use serde::Serialize;

use crate::http::body::Body;

/// An HTTP response independent of the engine that will write it.
#[derive(Debug, Default)]
pub struct Response {
    status: StatusCode,
    status_text: Option<String>,
    headers: HeaderMap,
    body: Body,
}

impl Response {
    pub fn new(body: impl Into<Body>) -> Self {
        Self {
            status: StatusCode::OK,
            status_text: None,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Body::Empty)
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(Body::from(text.into()))
            .with_header(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"))
    }

    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        let bytes = serde_json::to_vec(value)?;
        Ok(Self::new(Body::from(bytes)).with_header(CONTENT_TYPE, HeaderValue::from_static("application/json")))
    }

    /// A response whose body is produced chunk by chunk.
    pub fn stream<S, B, E>(stream: S) -> Self
    where
        S: futures_util::Stream<Item = Result<B, E>> + Send + 'static,
        B: Into<Bytes> + 'static,
        E: Into<crate::error::BoxError> + 'static,
    {
        Self::new(Body::from_stream(stream))
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn status_text(&self) -> Option<&str> {
        self.status_text.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_status_text(mut self, text: impl Into<String>) -> Self {
        self.status_text = Some(text.into());
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn into_parts(self) -> (StatusCode, Option<String>, HeaderMap, Body) {
        (self.status, self.status_text, self.headers, self.body)
    }

    /// `500 Internal Server Error`, used when a handler fails.
    pub(crate) fn internal_error() -> Self {
        Self::text("Internal Server Error").with_status(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub(crate) fn plain(status: StatusCode, text: &'static str) -> Self {
        Self::text(text).with_status(status)
    }
}

impl From<&'static str> for Response {
    fn from(text: &'static str) -> Self {
        Response::text(text)
    }
}

impl From<String> for Response {
    fn from(text: String) -> Self {
        Response::text(text)
    }
}

impl From<StatusCode> for Response {
    fn from(status: StatusCode) -> Self {
        Response::empty().with_status(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_sets_content_type() {
        let res = Response::json(&serde_json::json!({"id": "1"}))
            .unwrap()
            .with_status(StatusCode::CREATED);
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(res.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(res.body().size_hint(), Some(10));
    }

    #[test]
    fn headers_append() {
        let res = Response::empty()
            .with_header(HeaderName::from_static("x-a"), HeaderValue::from_static("1"))
            .with_header(HeaderName::from_static("x-a"), HeaderValue::from_static("2"));
        assert_eq!(res.headers().get_all("x-a").iter().count(), 2);
    }

    #[test]
    fn status_text_is_optional() {
        assert_eq!(Response::empty().status_text(), None);
        let res = Response::from(StatusCode::IM_A_TEAPOT).with_status_text("Short And Stout");
        assert_eq!(res.status_text(), Some("Short And Stout"));
    }
}
