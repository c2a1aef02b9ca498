//! Error taxonomy for the valuation engine

use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;

/// Result type for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the engine to its callers
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Network or connection failure. Retried only by the stream subscription.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Credentials rejected. Terminal for the session, never retried.
    #[error("Authentication rejected: {0}")]
    Auth(String),

    /// Malformed inbound payload
    #[error("Decode error: {0}")]
    Decode(String),

    /// Client-side intent validation failure. No network call was made.
    #[error("Invalid order: {0}")]
    Validation(String),

    #[error("Insufficient shares: requested {requested}, held {held}")]
    InsufficientShares { requested: Decimal, held: Decimal },

    /// An intent with the same identity is already being submitted
    #[error("Duplicate submission: {0} is already in flight")]
    DuplicateSubmission(String),

    /// Order refused by the backend; the reason is passed through verbatim
    #[error("Order rejected by backend: {0}")]
    BackendRejection(String),

    /// No answer within the bound. The request itself is still outstanding.
    #[error("No acknowledgement within {0:?}; the order may still be accepted")]
    Timeout(Duration),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The owning component has shut down
    #[error("Engine shut down: {0}")]
    Shutdown(String),
}

impl EngineError {
    /// Whether this is a validation failure (including insufficient shares)
    pub fn is_validation(&self) -> bool {
        matches!(self, EngineError::Validation(_) | EngineError::InsufficientShares { .. })
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, EngineError::Auth(_))
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Decode(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Transport(err.to_string())
    }
}
