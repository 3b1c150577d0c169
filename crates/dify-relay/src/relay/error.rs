//! Relay failures and their translation into terminal error fragments.

use std::io;

use serde::Serialize;
use thiserror::Error;

/// Anything that can end a relay before the upstream stream completes.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The upstream answered with something other than `200 OK`.
    #[error("upstream returned status {0}")]
    UpstreamUnavailable(u16),

    /// Connecting, waiting for the response head, or reading a line took too long.
    #[error("upstream timed out")]
    UpstreamTimeout,

    /// DNS, connect, reset and other transport-level failures.
    #[error("{0}")]
    UpstreamTransport(String),

    /// A line of the upstream stream could not be understood as an event.
    #[error("{0}")]
    MalformedFrame(String),

    #[error("{0}")]
    Internal(String),
}

impl RelayError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedFrame(msg.into())
    }

    /// Classify an error raised while reading the upstream body.
    ///
    /// The body reader wraps `reqwest` failures in `io::Error`; those are
    /// unwrapped and classified like request errors. Invalid UTF-8 in the
    /// body surfaces as `InvalidData` and counts as a malformed frame.
    pub fn from_read_error(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::InvalidData {
            return Self::MalformedFrame(err.to_string());
        }
        let message = err.to_string();
        match err.into_inner().map(|inner| inner.downcast::<reqwest::Error>()) {
            Some(Ok(http_err)) => Self::from(*http_err),
            Some(Err(other)) => Self::UpstreamTransport(other.to_string()),
            None => Self::UpstreamTransport(message),
        }
    }

    /// Short label used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::UpstreamTimeout => "upstream_timeout",
            Self::UpstreamTransport(_) => "upstream_transport",
            Self::MalformedFrame(_) => "malformed_frame",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::UpstreamTimeout
        } else if err.is_builder() {
            Self::Internal(error_chain(&err))
        } else {
            Self::UpstreamTransport(error_chain(&err))
        }
    }
}

/// `reqwest` keeps the interesting part (refused, reset, dns) in the source chain.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// The single JSON object sent to the caller when a relay fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorFragment {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorFragment {
    fn message(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            status: None,
        }
    }

    /// Serialized form written to the response stream.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            // Two plain strings and an integer always serialize.
            r#"{"error":"An error occurred"}"#.to_string()
        })
    }
}

impl From<&RelayError> for ErrorFragment {
    fn from(err: &RelayError) -> Self {
        match err {
            RelayError::UpstreamTimeout => Self::message("Request to Dify API timed out"),
            RelayError::UpstreamTransport(msg) => Self::message(format!("Request error: {msg}")),
            RelayError::MalformedFrame(msg) | RelayError::Internal(msg) => {
                Self::message(format!("An error occurred: {msg}"))
            }
            RelayError::UpstreamUnavailable(status) => Self {
                error: "Dify API error".to_string(),
                status: Some(*status),
            },
        }
    }
}
