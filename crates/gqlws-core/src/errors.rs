//! Codec error types.

use thiserror::Error;

/// Errors raised while decoding or encoding frames.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The message is not valid JSON or a field has the wrong JSON type.
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    /// The message is valid JSON but not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,
    /// The `type` field is absent.
    #[error("frame has no type")]
    MissingType,
    /// The `type` field is not a known message type.
    #[error("unknown message type: {0}")]
    UnknownType(String),
}

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;
