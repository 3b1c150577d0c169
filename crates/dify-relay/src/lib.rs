//! Dify thought relay.
//!
//! Accepts a chat message over HTTP, forwards it to a Dify agent app in
//! streaming mode and re-streams the agent's `agent_thought` text to the
//! caller as Server-Sent Events.
//!
//! ```text
//! caller --POST /chat--> api --> relay::UpstreamClient --POST--> Dify
//!    ^                                    |
//!    |                              lines (SSE)
//!    |                                    v
//!    +----- SSE data events <-- relay::relay_thoughts (parse, filter, faults)
//! ```

pub mod api;
pub mod config;
pub mod relay;

pub use api::{AppState, create_router};
pub use config::AppConfig;
