//! Server error types.

use std::net::SocketAddr;

use thiserror::Error;

/// Errors raised while starting or running the relay server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configured host/port could not be parsed.
    #[error("invalid listen address {0}")]
    InvalidAddress(String),
    /// The heartbeat interval is zero.
    #[error("heartbeat interval must be non-zero")]
    ZeroHeartbeat,
    /// Binding the listener failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address we tried to bind.
        addr: SocketAddr,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Any other I/O failure.
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_error_display() {
        let err = ServerError::Bind {
            addr: "127.0.0.1:9001".parse().unwrap(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert_eq!(err.to_string(), "failed to bind 127.0.0.1:9001: in use");
    }

    #[test]
    fn invalid_address_display() {
        let err = ServerError::InvalidAddress("nowhere:abc".into());
        assert!(err.to_string().contains("nowhere:abc"));
    }
}
