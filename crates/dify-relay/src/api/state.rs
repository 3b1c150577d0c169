//! Application state shared across handlers.

use crate::config::{AppConfig, RelayConfig, UpstreamConfig};
use crate::relay::{FramePolicy, RelayError, UpstreamClient};

/// Immutable per-process state; every request builds its own pipeline from it.
#[derive(Clone)]
pub struct AppState {
    /// Client for the agent API.
    pub upstream: UpstreamClient,
    /// Handling of malformed upstream frames.
    pub frame_policy: FramePolicy,
}

impl AppState {
    pub fn new(upstream: UpstreamConfig, relay: RelayConfig) -> Result<Self, RelayError> {
        Ok(Self {
            upstream: UpstreamClient::new(upstream)?,
            frame_policy: relay.malformed_frames,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, RelayError> {
        Self::new(config.upstream.clone(), config.relay.clone())
    }
}
