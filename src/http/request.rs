//! Canonical request.
//!
//! # Responsibilities
//! - Engine-independent view of an incoming request
//! - Absolute URL with the scheme derived from the listener's TLS setting
//! - Single-use body with consuming helpers
//!
//! # Design Decisions
//! - Immutable: fields are private and only readable
//! - GET/HEAD always carry an empty body

use std::net::SocketAddr;

use hyper::body::Bytes;
use hyper::header::HOST;
use hyper::http::request::Parts;
use hyper::{HeaderMap, Method, Uri, Version};
use serde::de::DeserializeOwned;
use url::Url;

use crate::http::body::{Body, BodyError};

/// Errors raised while normalizing a native request.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("cannot build request URL from {0:?}")]
    Url(String),
}

/// An HTTP request independent of the engine that produced it.
#[derive(Debug)]
pub struct Request {
    method: Method,
    url: Url,
    version: Version,
    headers: HeaderMap,
    remote_addr: Option<SocketAddr>,
    body: Body,
}

impl Request {
    /// Build a canonical request from native request parts.
    ///
    /// `local_addr` is used as the authority when the request carries neither
    /// an absolute URI nor a `Host` header.
    pub fn from_parts(
        parts: Parts,
        body: Body,
        tls: bool,
        local_addr: SocketAddr,
        remote_addr: Option<SocketAddr>,
    ) -> Result<Self, RequestError> {
        let url = absolute_url(&parts.uri, &parts.headers, tls, local_addr)?;
        let body = if is_bodyless(&parts.method) { Body::Empty } else { body };

        Ok(Self {
            method: parts.method,
            url,
            version: parts.version,
            headers: parts.headers,
            remote_addr,
            body,
        })
    }

    /// Build a request directly. Mostly useful for tests of handlers.
    pub fn new(method: Method, url: Url, headers: HeaderMap, body: Body) -> Self {
        let body = if is_bodyless(&method) { Body::Empty } else { body };
        Self {
            method,
            url,
            version: Version::HTTP_11,
            headers,
            remote_addr: None,
            body,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Header value as a string, if present and visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn into_body(self) -> Body {
        self.body
    }

    pub async fn bytes(self) -> Result<Bytes, BodyError> {
        self.body.collect(None).await
    }

    pub async fn text(self) -> Result<String, BodyError> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    pub async fn json<T: DeserializeOwned>(self) -> Result<T, BodyError> {
        let bytes = self.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn is_bodyless(method: &Method) -> bool {
    method == Method::GET || method == Method::HEAD
}

/// Derive the absolute URL of a request.
fn absolute_url(uri: &Uri, headers: &HeaderMap, tls: bool, local_addr: SocketAddr) -> Result<Url, RequestError> {
    let scheme = if tls { "https" } else { "http" };
    let authority = uri
        .authority()
        .map(|a| a.as_str().to_string())
        .or_else(|| headers.get(HOST).and_then(|h| h.to_str().ok()).map(str::to_string))
        .unwrap_or_else(|| local_addr.to_string());
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let path_and_query = if path_and_query.starts_with('/') { path_and_query } else { "/" };

    let raw = format!("{}://{}{}", scheme, authority, path_and_query);
    Url::parse(&raw).map_err(|_| RequestError::Url(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::http;

    fn parts(method: &str, uri: &str, host: Option<&str>) -> Parts {
        let mut builder = http::Request::builder().method(method).uri(uri);
        if let Some(host) = host {
            builder = builder.header(HOST, host);
        }
        builder.body(()).unwrap().into_parts().0
    }

    fn local() -> SocketAddr {
        "127.0.0.1:8090".parse().unwrap()
    }

    #[test]
    fn scheme_follows_tls() {
        let req = Request::from_parts(parts("GET", "/a?b=1", Some("example.com")), Body::Empty, false, local(), None).unwrap();
        assert_eq!(req.url().as_str(), "http://example.com/a?b=1");

        let req = Request::from_parts(parts("GET", "/a", Some("example.com")), Body::Empty, true, local(), None).unwrap();
        assert_eq!(req.url().scheme(), "https");
    }

    #[test]
    fn missing_host_falls_back_to_local_addr() {
        let req = Request::from_parts(parts("GET", "/x", None), Body::Empty, false, local(), None).unwrap();
        assert_eq!(req.url().as_str(), "http://127.0.0.1:8090/x");
    }

    #[test]
    fn absolute_form_uri_wins() {
        let req = Request::from_parts(
            parts("GET", "http://proxy.test:81/y", Some("ignored.test")),
            Body::Empty,
            false,
            local(),
            None,
        )
        .unwrap();
        assert_eq!(req.url().host_str(), Some("proxy.test"));
        assert_eq!(req.url().port(), Some(81));
    }

    #[tokio::test]
    async fn get_body_is_dropped() {
        let req = Request::from_parts(parts("GET", "/", None), Body::from("ignored"), false, local(), None).unwrap();
        assert!(req.bytes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn json_body_decodes() {
        let req = Request::from_parts(parts("POST", "/users", None), Body::from(r#"{"id":"1"}"#), false, local(), None).unwrap();
        assert_eq!(req.header("host"), None);
        let value: serde_json::Value = req.json().await.unwrap();
        assert_eq!(value["id"], "1");
    }

    #[test]
    fn bad_host_is_an_error() {
        let res = Request::from_parts(parts("GET", "/", Some("bad host")), Body::Empty, false, local(), None);
        assert!(matches!(res, Err(RequestError::Url(_))));
    }
}
