//! Test utilities and common setup.

#![allow(dead_code)]

use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use dify_relay::api::{self, AppState};
use dify_relay::config::{RelayConfig, UpstreamConfig};
use dify_relay::relay::FramePolicy;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const API_KEY: &str = "test-key";
pub const CHAT_PATH: &str = "/v1/chat-messages";

/// Upstream config pointing at `url` with a one second timeout.
pub fn upstream_config(url: impl Into<String>) -> UpstreamConfig {
    UpstreamConfig::new(url, API_KEY).with_timeout_secs(1)
}

/// Chat-messages URL on the mock server.
pub fn chat_url(server: &MockServer) -> String {
    format!("{}{}", server.uri(), CHAT_PATH)
}

/// Create a test application relaying to `url`.
pub fn test_app_for(url: impl Into<String>, policy: FramePolicy) -> Router {
    let relay = RelayConfig {
        malformed_frames: policy,
    };
    let state = AppState::new(upstream_config(url), relay).unwrap();
    api::create_router(state)
}

/// Create a test application relaying to the mock server.
pub fn test_app(server: &MockServer) -> Router {
    test_app_for(chat_url(server), FramePolicy::Fail)
}

/// Mount an upstream that answers every chat message with `body` as an event stream.
pub async fn mount_stream(server: &MockServer, body: &str) {
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(event_stream(body))
        .mount(server)
        .await;
}

pub fn event_stream(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream")
}

/// Event stream body made of one `data:` line per JSON value.
pub fn data_lines(events: &[serde_json::Value]) -> String {
    events
        .iter()
        .map(|event| format!("data: {event}\n\n"))
        .collect()
}

/// POST /chat with a JSON body.
pub fn chat_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Send a chat message and return the status, content type and the data
/// payload of every SSE event in the response.
pub async fn send_chat(app: Router, message: &str) -> (StatusCode, String, Vec<String>) {
    let body = serde_json::json!({ "message": message }).to_string();
    let response = app.oneshot(chat_request(&body)).await.unwrap();

    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let bytes = tokio::time::timeout(
        Duration::from_secs(10),
        axum::body::to_bytes(response.into_body(), 1024 * 1024),
    )
    .await
    .expect("response body did not finish")
    .unwrap();

    (status, content_type, sse_data(&String::from_utf8_lossy(&bytes)))
}

/// Split an SSE body into events and return each event's joined `data:` lines.
///
/// Comment-only events (keep-alives) are ignored.
pub fn sse_data(body: &str) -> Vec<String> {
    body.split("\n\n")
        .filter_map(|block| {
            let data: Vec<&str> = block
                .lines()
                .filter_map(|line| line.strip_prefix("data:"))
                .map(|value| value.strip_prefix(' ').unwrap_or(value))
                .collect();
            (!data.is_empty()).then(|| data.join("\n"))
        })
        .collect()
}

/// Parse an error fragment.
pub fn error_json(fragment: &str) -> serde_json::Value {
    serde_json::from_str(fragment).unwrap()
}

/// Raw upstream that answers the first connection with a chunked event
/// stream holding `body`, then sends nothing more.
///
/// Returns the endpoint URL and a receiver that fires once the relay side
/// closes the connection.
pub async fn spawn_stalling_upstream(body: &str) -> (String, tokio::sync::oneshot::Receiver<()>) {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (closed_tx, closed_rx) = tokio::sync::oneshot::channel();
    let chunk = format!("{:x}\r\n{body}\r\n", body.len());

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 8192];
        let _ = socket.read(&mut buf).await;

        let head = "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n";
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(chunk.as_bytes()).await.unwrap();
        socket.flush().await.unwrap();

        // Drain until the peer hangs up.
        loop {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => continue,
            }
        }
        let _ = closed_tx.send(());
    });

    (format!("http://{addr}{CHAT_PATH}"), closed_rx)
}
