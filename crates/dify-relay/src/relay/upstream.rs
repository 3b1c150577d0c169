//! Streaming client for the Dify chat-messages endpoint.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use reqwest::{StatusCode, header};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, Lines};
use tokio_util::io::StreamReader;
use tracing::debug;

use crate::config::UpstreamConfig;

use super::error::RelayError;
use super::session::RelaySession;

type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Body of a streaming chat-messages request.
#[derive(Debug, Serialize)]
pub struct ChatMessagesRequest<'a> {
    /// App input variables; the relay never sets any.
    pub inputs: Map<String, Value>,
    pub query: &'a str,
    pub response_mode: ResponseMode,
    pub user: &'a str,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    Streaming,
}

impl<'a> ChatMessagesRequest<'a> {
    pub fn streaming(session: &'a RelaySession) -> Self {
        Self {
            inputs: Map::new(),
            query: &session.message,
            response_mode: ResponseMode::Streaming,
            user: &session.user,
        }
    }
}

/// Opens one upstream stream per relay session.
///
/// Cloning is cheap: the underlying `reqwest::Client` shares its pool.
#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    config: Arc<UpstreamConfig>,
}

impl UpstreamClient {
    pub fn new(config: UpstreamConfig) -> Result<Self, RelayError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.timeout())
            .build()
            .map_err(|e| RelayError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            config: Arc::new(config),
        })
    }

    /// Send the session's message and return the response body as lines.
    ///
    /// A non-200 status is returned as `UpstreamUnavailable` without reading
    /// the body.
    pub async fn open(&self, session: &RelaySession) -> Result<UpstreamLines, RelayError> {
        let timeout = self.config.timeout();
        let payload = ChatMessagesRequest::streaming(session);

        debug!(
            url = %self.config.api_url,
            user = %session.user,
            query_len = session.message.len(),
            "sending chat message upstream"
        );

        let request = self
            .http
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .header(header::ACCEPT, "text/event-stream")
            .json(&payload)
            .send();

        let response = tokio::time::timeout(timeout, request)
            .await
            .map_err(|_| RelayError::UpstreamTimeout)??;

        debug!(
            user = %session.user,
            status = %response.status(),
            headers = ?response.headers(),
            "upstream responded"
        );

        if response.status() != StatusCode::OK {
            return Err(RelayError::UpstreamUnavailable(response.status().as_u16()));
        }

        Ok(UpstreamLines::new(response, timeout, session.user.clone()))
    }
}

/// Lazily read lines of one upstream response.
///
/// Owns the response; dropping it releases the upstream connection.
pub struct UpstreamLines {
    lines: Lines<StreamReader<ByteStream, Bytes>>,
    read_timeout: Duration,
    user: String,
}

impl UpstreamLines {
    fn new(response: reqwest::Response, read_timeout: Duration, user: String) -> Self {
        let body: ByteStream = Box::pin(response.bytes_stream().map_err(std::io::Error::other));
        Self {
            lines: StreamReader::new(body).lines(),
            read_timeout,
            user,
        }
    }

    /// Next line without its terminator, or `None` at end of stream.
    pub async fn next_line(&mut self) -> Result<Option<String>, RelayError> {
        match tokio::time::timeout(self.read_timeout, self.lines.next_line()).await {
            Ok(line) => line.map_err(RelayError::from_read_error),
            Err(_) => Err(RelayError::UpstreamTimeout),
        }
    }
}

impl Drop for UpstreamLines {
    fn drop(&mut self) {
        debug!(user = %self.user, "releasing upstream stream");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_body_shape() {
        let session = RelaySession::with_user("Where is order A123?", "user-1");
        let body = serde_json::to_value(ChatMessagesRequest::streaming(&session)).unwrap();
        assert_eq!(
            body,
            json!({
                "inputs": {},
                "query": "Where is order A123?",
                "response_mode": "streaming",
                "user": "user-1",
            })
        );
    }

    #[test]
    fn test_query_is_not_rewritten() {
        let message = "  \"quoted\"\nsecond line \u{1F600}  ";
        let session = RelaySession::with_user(message, "u");
        let body = serde_json::to_value(ChatMessagesRequest::streaming(&session)).unwrap();
        assert_eq!(body["query"], message);
    }
}
