//! Error types for the statesync wire format.

use thiserror::Error;

/// Errors that can occur encoding or decoding protocol frames.
#[derive(Debug, Error)]
pub enum WireError {
    /// JSON serialization failed
    #[error("serialization failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// JSON deserialization failed
    #[error("deserialization failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// Frame parsed as JSON but is not a JSON object
    #[error("frame is not a JSON object")]
    NotAnObject,
}
