//! Session credentials supplied by the external auth collaborator

use std::fmt;

/// Opaque user identity and bearer token. Never parsed, never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user_id: String,
    pub bearer: String,
}

impl Credentials {
    pub fn new(user_id: impl Into<String>, bearer: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), bearer: bearer.into() }
    }

    /// Value for the `Authorization` header
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.bearer)
    }
}

// The token must not end up in logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user_id", &self.user_id)
            .field("bearer", &"<redacted>")
            .finish()
    }
}
