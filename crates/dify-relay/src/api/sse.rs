//! Server-Sent Events response for relayed fragments.

use std::convert::Infallible;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, header};
use axum::response::{IntoResponse, Response};
use bytes::{BufMut, Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt};
use tokio::time::{Instant, MissedTickBehavior};

use crate::relay::Fragment;

/// Idle time after which a keep-alive comment is written.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

const KEEP_ALIVE_FRAME: &[u8] = b":\n\n";

// ============================================================================
// SSE Response Builder
// ============================================================================

/// Wrap a fragment stream as a `text/event-stream` response.
///
/// Every fragment becomes one event, written as soon as the stream yields
/// it. The body ends when the fragment stream ends.
pub fn fragment_response(
    fragments: impl Stream<Item = Fragment> + Send + 'static,
) -> Response {
    let frames = fragments.map(encode_fragment);
    let body = Body::from_stream(
        with_keep_alive(frames, KEEP_ALIVE_INTERVAL).map(Ok::<_, Infallible>),
    );

    (
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/event-stream"),
            ),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
            // Disable nginx buffering if present
            (
                HeaderName::from_static("x-accel-buffering"),
                HeaderValue::from_static("no"),
            ),
        ],
        body,
    )
        .into_response()
}

// ============================================================================
// Framing
// ============================================================================

/// Encode one fragment as an SSE event.
///
/// Each line of the payload becomes its own `data:` line, which SSE clients
/// join back with `\n`. CR and CRLF are folded to LF first since bare CR
/// would end a field early. An empty payload still gets one `data:` line so
/// the client dispatches an empty event.
pub fn encode_fragment(fragment: Fragment) -> Bytes {
    let payload = fragment.into_payload();
    let payload = payload.replace("\r\n", "\n").replace('\r', "\n");

    let mut frame = BytesMut::with_capacity(payload.len() + 8);
    for line in payload.split('\n') {
        frame.put_slice(b"data: ");
        frame.put_slice(line.as_bytes());
        frame.put_u8(b'\n');
    }
    frame.put_u8(b'\n');
    frame.freeze()
}

/// Interleave keep-alive comments into `frames` while it is idle.
///
/// The timer restarts after every frame and the stream ends with `frames`.
pub fn with_keep_alive(
    frames: impl Stream<Item = Bytes> + Send + 'static,
    period: Duration,
) -> impl Stream<Item = Bytes> + Send + 'static {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    stream::unfold(
        (frames.boxed(), ticker),
        |(mut frames, mut ticker)| async move {
            tokio::select! {
                biased;
                frame = frames.next() => match frame {
                    Some(frame) => {
                        ticker.reset();
                        Some((frame, (frames, ticker)))
                    }
                    None => None,
                },
                _ = ticker.tick() => {
                    Some((Bytes::from_static(KEEP_ALIVE_FRAME), (frames, ticker)))
                }
            }
        },
    )
}
