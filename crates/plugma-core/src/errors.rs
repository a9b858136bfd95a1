//! Protocol error types.

use thiserror::Error;

/// Errors raised while decoding relay payloads.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The payload was not valid JSON.
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    /// The payload was JSON but not an object.
    #[error("envelope must be a JSON object, got {0}")]
    NotAnObject(&'static str),
    /// A transport tag string was not recognised.
    #[error("unknown transport tag: {0}")]
    UnknownTransport(String),
}

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
