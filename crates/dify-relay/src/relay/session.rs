use uuid::Uuid;

/// Per-request relay context.
///
/// Every inbound chat message gets a fresh upstream user identifier; nothing
/// carries over between requests.
#[derive(Debug, Clone)]
pub struct RelaySession {
    /// Message forwarded verbatim as the upstream `query`.
    pub message: String,
    /// Opaque identifier sent as the upstream `user`.
    pub user: String,
}

impl RelaySession {
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_user(message, Uuid::new_v4().to_string())
    }

    pub fn with_user(message: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            user: user.into(),
        }
    }
}
