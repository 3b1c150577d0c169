//! HTTP API module.
//!
//! Accepts chat messages and streams the relayed agent thoughts back.

mod error;
mod handlers;
mod routes;
mod sse;
mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use handlers::{ChatRequest, HealthResponse};
pub use routes::create_router;
pub use sse::{KEEP_ALIVE_INTERVAL, encode_fragment, fragment_response, with_keep_alive};
pub use state::AppState;
