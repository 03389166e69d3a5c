//! Error types for state-relay.

use state_types::WireError;

/// Main error type for state-relay operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Protocol layer errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Frame is not a valid client message.
    #[error("invalid frame: {0}")]
    InvalidFrame(#[from] WireError),

    /// Binary frames are not part of the protocol.
    #[error("unexpected binary frame ({len} bytes)")]
    UnexpectedBinary {
        /// Size of the frame.
        len: usize,
    },

    /// Session outbound queue closed.
    #[error("session closed")]
    SessionClosed,
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;
