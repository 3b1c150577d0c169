//! API integration tests for request validation and health.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::Value;
use tower::ServiceExt;
use wiremock::MockServer;

use common::*;

async fn json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Test the health endpoint.
#[tokio::test]
async fn test_health() {
    let server = MockServer::start().await;
    let app = test_app(&server);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

/// Test that invalid JSON is rejected before contacting the upstream.
#[tokio::test]
async fn test_chat_rejects_invalid_json() {
    let server = MockServer::start().await;
    let app = test_app(&server);

    let response = app.oneshot(chat_request("{not json")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["code"], "BAD_REQUEST");
    assert!(server.received_requests().await.unwrap().is_empty());
}

/// Test that a body without a message field is rejected.
#[tokio::test]
async fn test_chat_rejects_missing_message() {
    let server = MockServer::start().await;
    let app = test_app(&server);

    let response = app.oneshot(chat_request(r#"{"text":"hi"}"#)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(server.received_requests().await.unwrap().is_empty());
}

/// Test that a non-JSON content type is rejected.
#[tokio::test]
async fn test_chat_requires_json_content_type() {
    let server = MockServer::start().await;
    let app = test_app(&server);

    let request = Request::builder()
        .method("POST")
        .uri("/chat")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from(r#"{"message":"hi"}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

/// Test that GET /chat is not routed.
#[tokio::test]
async fn test_chat_get_not_allowed() {
    let server = MockServer::start().await;
    let app = test_app(&server);

    let response = app
        .oneshot(Request::builder().uri("/chat").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

/// Test that the stream response disables proxy buffering.
#[tokio::test]
async fn test_chat_response_headers() {
    let server = MockServer::start().await;
    mount_stream(&server, "").await;
    let app = test_app(&server);

    let response = app
        .oneshot(chat_request(r#"{"message":"hi"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers[header::CONTENT_TYPE], "text/event-stream");
    assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
    assert_eq!(headers["x-accel-buffering"], "no");
}
