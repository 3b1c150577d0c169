//! Upstream relay: Dify SSE stream in, agent thoughts out.

mod error;
mod frame;
mod pipeline;
mod session;
mod upstream;

pub use error::{ErrorFragment, RelayError};
pub use frame::{FramePolicy, UpstreamEvent, parse_line};
pub use pipeline::{Fragment, relay_thoughts};
pub use session::RelaySession;
pub use upstream::{ChatMessagesRequest, ResponseMode, UpstreamClient, UpstreamLines};
