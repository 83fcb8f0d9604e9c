//! Request/response bridging on every engine.

use std::time::Duration;

use futures_util::stream;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::StatusCode;
use serde::{Deserialize, Serialize};

use uniserve::{BoxError, HandlerContext, Response, ServeOptions};

mod common;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Item {
    id: String,
}

async fn echo(ctx: HandlerContext) -> Result<Response, BoxError> {
    let body = ctx.into_request().bytes().await?;
    Ok(Response::new(body))
}

#[tokio::test]
async fn test_echo_round_trip_is_byte_identical() {
    let payload: Vec<u8> = (0..64 * 1024).map(|i| (i % 251) as u8).collect();

    for &runtime in common::engines() {
        let handle = common::start(runtime, ServeOptions::new(echo)).await;
        let res = common::http_client()
            .post(handle.url())
            .body(payload.clone())
            .send()
            .await
            .unwrap();

        assert_eq!(res.status(), 200, "{}", runtime);
        assert_eq!(res.bytes().await.unwrap().as_ref(), payload.as_slice(), "{}", runtime);
        handle.stop();
    }
}

#[tokio::test]
async fn test_json_post_created() {
    let handler = |ctx: HandlerContext| async move {
        let item: Item = ctx.into_request().json().await?;
        let response = Response::json(&item)?.with_status(StatusCode::CREATED);
        Ok::<_, BoxError>(response)
    };

    for &runtime in common::engines() {
        let handle = common::start(runtime, ServeOptions::new(handler)).await;
        let res = common::http_client()
            .post(format!("{}items", handle.url()))
            .json(&serde_json::json!({ "id": "1" }))
            .send()
            .await
            .unwrap();

        assert_eq!(res.status(), 201, "{}", runtime);
        assert_eq!(res.headers()[CONTENT_TYPE], "application/json", "{}", runtime);
        assert_eq!(res.json::<Item>().await.unwrap(), Item { id: "1".into() }, "{}", runtime);
        handle.stop();
    }
}

#[tokio::test]
async fn test_streamed_chunks_arrive_in_order() {
    let handler = |_ctx: HandlerContext| async move {
        let chunks = stream::unfold(0u8, |i| async move {
            if i == 5 {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            Some((Ok::<_, std::io::Error>(format!("chunk-{};", i)), i + 1))
        });
        Ok::<_, BoxError>(Response::stream(chunks))
    };

    for &runtime in common::engines() {
        let handle = common::start(runtime, ServeOptions::new(handler)).await;
        let body = common::http_client()
            .get(handle.url())
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();

        assert_eq!(body, "chunk-0;chunk-1;chunk-2;chunk-3;chunk-4;", "{}", runtime);
        handle.stop();
    }
}

#[tokio::test]
async fn test_handler_error_is_500_and_server_survives() {
    let handler = |ctx: HandlerContext| async move {
        match ctx.request.path() {
            "/fail" => Err::<Response, BoxError>("handler failed".into()),
            "/panic" => panic!("handler bug"),
            _ => Ok(Response::text("ok")),
        }
    };

    for &runtime in common::engines() {
        let handle = common::start(runtime, ServeOptions::new(handler)).await;
        let client = common::http_client();

        let res = client.get(format!("{}fail", handle.url())).send().await.unwrap();
        assert_eq!(res.status(), 500, "{}", runtime);

        let res = client.get(format!("{}panic", handle.url())).send().await.unwrap();
        assert_eq!(res.status(), 500, "{}", runtime);

        let res = client.get(handle.url()).send().await.unwrap();
        assert_eq!(res.status(), 200, "{}", runtime);
        assert_eq!(res.text().await.unwrap(), "ok");
        handle.stop();
    }
}

#[tokio::test]
async fn test_failed_body_stream_aborts_only_that_response() {
    let handler = |ctx: HandlerContext| async move {
        if ctx.request.path() == "/broken" {
            let chunks: Vec<Result<&'static str, std::io::Error>> =
                vec![Ok("partial"), Err(std::io::Error::other("source failed"))];
            return Ok::<_, BoxError>(Response::stream(stream::iter(chunks)));
        }
        Ok(Response::text("fine"))
    };

    for &runtime in common::engines() {
        let handle = common::start(runtime, ServeOptions::new(handler)).await;
        let client = common::http_client();

        let broken = client.get(format!("{}broken", handle.url())).send().await;
        let failed = match broken {
            Ok(res) => res.bytes().await.is_err(),
            Err(_) => true,
        };
        assert!(failed, "{}: broken stream should not complete", runtime);

        let res = client.get(handle.url()).send().await.unwrap();
        assert_eq!(res.text().await.unwrap(), "fine", "{}", runtime);
        handle.stop();
    }
}

#[tokio::test]
async fn test_request_view_is_normalized() {
    let handler = |ctx: HandlerContext| async move {
        let request = ctx.request;
        let summary = format!(
            "{} {} remote={} host={}",
            request.method(),
            request.url(),
            request.remote_addr().map(|a| a.ip().to_string()).unwrap_or_default(),
            request.header("host").unwrap_or_default(),
        );
        let body = request.bytes().await?;
        Ok::<_, BoxError>(
            Response::text(summary)
                .with_header(hyper::header::HeaderName::from_static("x-body-len"), HeaderValue::from(body.len())),
        )
    };

    for &runtime in common::engines() {
        let handle = common::start(runtime, ServeOptions::new(handler)).await;
        let port = handle.port();
        let res = common::http_client()
            .get(format!("{}search?q=1", handle.url()))
            .body("ignored for GET")
            .send()
            .await
            .unwrap();

        assert_eq!(res.headers()["x-body-len"], "0", "{}: GET must have an empty body", runtime);
        assert_eq!(
            res.text().await.unwrap(),
            format!("GET http://127.0.0.1:{}/search?q=1 remote=127.0.0.1 host=127.0.0.1:{}", port, port),
            "{}",
            runtime
        );
        handle.stop();
    }
}

#[tokio::test]
async fn test_custom_headers_and_status_pass_through() {
    let handler = |_ctx: HandlerContext| async move {
        Ok::<_, BoxError>(
            Response::text("teapot")
                .with_status(StatusCode::IM_A_TEAPOT)
                .with_status_text("Short And Stout")
                .with_header(hyper::header::HeaderName::from_static("x-multi"), HeaderValue::from_static("a"))
                .with_header(hyper::header::HeaderName::from_static("x-multi"), HeaderValue::from_static("b")),
        )
    };

    for &runtime in common::engines() {
        let handle = common::start(runtime, ServeOptions::new(handler)).await;
        let res = common::http_client().get(handle.url()).send().await.unwrap();

        assert_eq!(res.status(), 418, "{}", runtime);
        let values: Vec<_> = res.headers().get_all("x-multi").iter().map(|v| v.to_str().unwrap()).collect();
        assert_eq!(values, vec!["a", "b"], "{}", runtime);
        handle.stop();
    }
}

#[cfg(feature = "engine-evented")]
#[tokio::test]
async fn test_evented_rejects_oversized_body() {
    let handle = common::start(
        uniserve::Runtime::Evented,
        ServeOptions::new(echo).max_body_bytes(16),
    )
    .await;
    let client = common::http_client();

    let res = client.post(handle.url()).body(vec![0u8; 17]).send().await.unwrap();
    assert_eq!(res.status(), 413);

    let res = client.post(handle.url()).body(vec![7u8; 16]).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.bytes().await.unwrap().as_ref(), &[7u8; 16][..]);
    handle.stop();
}
