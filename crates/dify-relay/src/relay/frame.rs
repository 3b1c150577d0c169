//! SSE frame parsing for the upstream agent stream.
//!
//! The upstream sends one JSON event per `data:` line. Blank lines separate
//! events, and the other SSE fields (`event:`, `id:`, `retry:`) as well as
//! comment lines only carry framing, so they are skipped here.

use serde::Deserialize;
use tracing::trace;

use super::error::RelayError;

/// SSE field marker that prefixes every event payload.
const DATA_FIELD: &str = "data:";

/// SSE fields that carry no payload for the relay.
const FRAMING_FIELDS: [&str; 3] = ["event:", "id:", "retry:"];

// ============================================================================
// Upstream events
// ============================================================================

/// One event from the agent API, tagged by its `event` field.
///
/// Only [`UpstreamEvent::AgentThought`] reaches the caller. The other named
/// variants exist for diagnostics; anything unknown lands in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum UpstreamEvent {
    /// Intermediate reasoning from the agent.
    AgentThought { thought: String },

    /// Streamed answer text.
    AgentMessage,

    /// Streamed answer text (basic chat apps).
    Message,

    /// End of the turn.
    MessageEnd,

    /// In-band failure reported by the upstream.
    Error {
        #[serde(default)]
        status: Option<u16>,
        #[serde(default)]
        code: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },

    /// Keep-alive.
    Ping,

    #[serde(other)]
    Other,
}

// ============================================================================
// Malformed frame policy
// ============================================================================

/// What to do with a line that cannot be parsed as an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FramePolicy {
    /// End the stream with a generic error fragment.
    #[default]
    Fail,
    /// Log the frame and keep reading.
    Skip,
}

// ============================================================================
// Line parsing
// ============================================================================

/// Parse one line of the upstream body.
///
/// Returns `Ok(None)` for lines that carry no event (blank lines, comments,
/// non-data fields) and `Err(MalformedFrame)` for anything that should have
/// been an event but is not.
pub fn parse_line(line: &str) -> Result<Option<UpstreamEvent>, RelayError> {
    let line = line.trim_end_matches('\r');
    if line.trim().is_empty() {
        return Ok(None);
    }

    if let Some(payload) = line.strip_prefix(DATA_FIELD) {
        let payload = payload.strip_prefix(' ').unwrap_or(payload);
        return serde_json::from_str(payload)
            .map(Some)
            .map_err(|e| RelayError::malformed(e.to_string()));
    }

    if line.starts_with(':') || FRAMING_FIELDS.iter().any(|f| line.starts_with(f)) {
        trace!(line, "skipping SSE framing line");
        return Ok(None);
    }

    Err(RelayError::malformed(format!(
        "unexpected line in event stream: {}",
        truncate(line, 80)
    )))
}

fn truncate(line: &str, max_chars: usize) -> &str {
    match line.char_indices().nth(max_chars) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}
