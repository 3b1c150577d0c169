//! API request handlers.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    response::Response,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::relay::{RelaySession, relay_thoughts};

use super::error::ApiResult;
use super::sse::fragment_response;
use super::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Inbound chat message.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

/// Relay a chat message to the agent and stream its thoughts back.
///
/// Always answers `200 text/event-stream` once the body is valid; upstream
/// failures arrive as a final JSON error event.
pub async fn chat_stream(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = payload?;

    let session = RelaySession::new(request.message);
    info!(user = %session.user, "relaying chat message");

    let fragments = relay_thoughts(state.upstream.clone(), session, state.frame_policy);
    Ok(fragment_response(fragments))
}
