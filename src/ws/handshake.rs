//! Server side of the RFC 6455 opening handshake for engines that handle the
//! upgrade themselves (hyper, evented).

use hyper::header::{
    HeaderMap, HeaderValue, CONNECTION, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, SEC_WEBSOCKET_VERSION, UPGRADE,
};
use hyper::{http, Method, StatusCode};
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;

fn header_has_token(headers: &HeaderMap, name: hyper::header::HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

/// Return the client key if the request is a well-formed upgrade request.
pub(crate) fn websocket_key(method: &Method, headers: &HeaderMap) -> Option<HeaderValue> {
    if method != Method::GET {
        return None;
    }
    if !header_has_token(headers, CONNECTION, "upgrade") || !header_has_token(headers, UPGRADE, "websocket") {
        return None;
    }
    if headers.get(SEC_WEBSOCKET_VERSION).map(|v| v.as_bytes()) != Some(&b"13"[..]) {
        return None;
    }
    headers.get(SEC_WEBSOCKET_KEY).filter(|k| !k.is_empty()).cloned()
}

/// `101 Switching Protocols` answering `key`.
pub(crate) fn switching_protocols(key: &HeaderValue) -> http::Response<axum::body::Body> {
    let mut response = http::Response::new(axum::body::Body::empty());
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let headers = response.headers_mut();
    headers.insert(CONNECTION, HeaderValue::from_static("upgrade"));
    headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
    if let Ok(accept) = HeaderValue::from_str(&derive_accept_key(key.as_bytes())) {
        headers.insert(SEC_WEBSOCKET_ACCEPT, accept);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handshake_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive, Upgrade"));
        headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
        headers.insert(SEC_WEBSOCKET_VERSION, HeaderValue::from_static("13"));
        headers.insert(SEC_WEBSOCKET_KEY, HeaderValue::from_static("dGhlIHNhbXBsZSBub25jZQ=="));
        headers
    }

    #[test]
    fn accepts_valid_handshake() {
        let key = websocket_key(&Method::GET, &handshake_headers()).unwrap();
        let response = switching_protocols(&key);
        assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
        // Sample from RFC 6455 section 1.3.
        assert_eq!(response.headers()[SEC_WEBSOCKET_ACCEPT], "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn rejects_non_get_and_missing_headers() {
        assert!(websocket_key(&Method::POST, &handshake_headers()).is_none());

        let mut headers = handshake_headers();
        headers.remove(UPGRADE);
        assert!(websocket_key(&Method::GET, &headers).is_none());

        let mut headers = handshake_headers();
        headers.insert(SEC_WEBSOCKET_VERSION, HeaderValue::from_static("8"));
        assert!(websocket_key(&Method::GET, &headers).is_none());

        assert!(websocket_key(&Method::GET, &HeaderMap::new()).is_none());
    }
}
