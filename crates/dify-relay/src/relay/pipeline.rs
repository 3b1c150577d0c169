//! The relay pipeline: upstream lines → events → thought fragments.
//!
//! The pipeline is a lazy `Stream` that owns the upstream connection. It is
//! driven by whoever polls it (normally the SSE response body), so dropping
//! it at any point closes the upstream.

use futures::Stream;
use futures::stream;
use tracing::{debug, error, warn};

use super::error::{ErrorFragment, RelayError};
use super::frame::{self, FramePolicy, UpstreamEvent};
use super::session::RelaySession;
use super::upstream::{UpstreamClient, UpstreamLines};

/// One chunk of the downstream response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Text of an `agent_thought` event.
    Thought(String),
    /// Terminal failure; nothing follows it.
    Error(ErrorFragment),
}

impl Fragment {
    /// Payload written to the wire.
    pub fn into_payload(self) -> String {
        match self {
            Self::Thought(text) => text,
            Self::Error(err) => err.to_json(),
        }
    }
}

enum RelayState {
    Connect {
        client: UpstreamClient,
        session: RelaySession,
    },
    Streaming {
        lines: UpstreamLines,
        session: RelaySession,
    },
    Done,
}

/// Relay one chat message and yield the fragments for the caller.
///
/// Opens exactly one upstream connection, on first poll. Thoughts are yielded
/// in upstream order; any failure yields a single [`Fragment::Error`] and ends
/// the stream.
pub fn relay_thoughts(
    client: UpstreamClient,
    session: RelaySession,
    policy: FramePolicy,
) -> impl Stream<Item = Fragment> + Send + 'static {
    stream::unfold(
        RelayState::Connect { client, session },
        move |state| async move {
            let mut state = state;
            loop {
                state = match state {
                    RelayState::Connect { client, session } => match client.open(&session).await {
                        Ok(lines) => RelayState::Streaming { lines, session },
                        Err(err) => return Some((fault(&session, &err), RelayState::Done)),
                    },
                    RelayState::Streaming { mut lines, session } => {
                        match next_thought(&mut lines, &session, policy).await {
                            Ok(Some(thought)) => {
                                debug!(user = %session.user, thought = %thought, "forwarding thought");
                                return Some((
                                    Fragment::Thought(thought),
                                    RelayState::Streaming { lines, session },
                                ));
                            }
                            Ok(None) => {
                                debug!(user = %session.user, "upstream stream completed");
                                return None;
                            }
                            Err(err) => return Some((fault(&session, &err), RelayState::Done)),
                        }
                    }
                    RelayState::Done => return None,
                };
            }
        },
    )
}

/// Read lines until the next thought, the end of the stream, or a failure.
async fn next_thought(
    lines: &mut UpstreamLines,
    session: &RelaySession,
    policy: FramePolicy,
) -> Result<Option<String>, RelayError> {
    while let Some(line) = lines.next_line().await? {
        let event = match frame::parse_line(&line) {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(err) if policy == FramePolicy::Skip => {
                warn!(user = %session.user, error = %err, "skipping malformed frame");
                continue;
            }
            Err(err) => return Err(err),
        };

        match event {
            UpstreamEvent::AgentThought { thought } => return Ok(Some(thought)),
            UpstreamEvent::Error {
                status,
                code,
                message,
            } => {
                warn!(
                    user = %session.user,
                    ?status,
                    ?code,
                    ?message,
                    "upstream reported an error event"
                );
            }
            other => debug!(user = %session.user, event = ?other, "dropping upstream event"),
        }
    }
    Ok(None)
}

/// Translate a pipeline failure into its terminal fragment.
fn fault(session: &RelaySession, err: &RelayError) -> Fragment {
    let fragment = ErrorFragment::from(err);
    error!(
        user = %session.user,
        kind = err.kind(),
        error = %fragment.error,
        "relay failed"
    );
    Fragment::Error(fragment)
}
