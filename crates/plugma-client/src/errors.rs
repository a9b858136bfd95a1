//! Client error types.

use thiserror::Error;

/// Errors raised by the transport wrapper.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The relay URL is not a `ws://` or `wss://` URL.
    #[error("invalid relay url {0}")]
    InvalidUrl(String),
    /// Connecting or talking to the relay socket failed.
    #[error("socket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),
    /// The client heartbeat interval is zero.
    #[error("heartbeat interval must be non-zero")]
    ZeroHeartbeat,
    /// The socket driver needs a Tokio runtime and none is running.
    #[error("no tokio runtime available for the socket driver")]
    NoRuntime,
    /// A message could not be encoded.
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
