//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use uniserve::{serve_on, Runtime, ServeOptions, ServerHandle};

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound for anything a test waits on.
pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Every engine compiled into this build.
pub fn engines() -> &'static [Runtime] {
    Runtime::available()
}

/// Serve on loopback with an ephemeral port.
pub async fn start(runtime: Runtime, options: ServeOptions) -> ServerHandle {
    serve_on(runtime, options.hostname("127.0.0.1").port(0))
        .await
        .unwrap_or_else(|e| panic!("{} failed to start: {}", runtime, e))
}

/// HTTP client that never reuses connections, so lifecycle tests see every
/// connection close.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

pub fn ws_url(handle: &ServerHandle, path: &str) -> String {
    format!("ws://{}{}", handle.local_addr(), path)
}

pub async fn connect(handle: &ServerHandle, path: &str) -> Client {
    let (client, response) = within(tokio_tungstenite::connect_async(ws_url(handle, path)))
        .await
        .unwrap_or_else(|e| panic!("{}: WebSocket connect failed: {}", handle.runtime(), e));
    assert_eq!(response.status(), 101);
    client
}

/// Next data or close frame, skipping control frames.
pub async fn next_frame(client: &mut Client) -> Option<Message> {
    within(async {
        loop {
            match client.next().await {
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(message)) => return Some(message),
                Some(Err(_)) | None => return None,
            }
        }
    })
    .await
}

pub async fn next_text(client: &mut Client) -> String {
    match next_frame(client).await {
        Some(Message::Text(text)) => text.as_str().to_owned(),
        other => panic!("expected text frame, got {:?}", other),
    }
}

/// Await `fut`, failing the test after [`TIMEOUT`].
pub async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(TIMEOUT, fut).await.expect("timed out")
}

/// Poll `check` until it holds, failing the test after [`TIMEOUT`].
pub async fn eventually<F: FnMut() -> bool>(mut check: F) {
    within(async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
}
