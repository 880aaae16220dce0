//! Server error types.

use thiserror::Error;

/// Errors raised while configuring or starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Reading the config file or binding the listener failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The config file is not valid JSON or does not match the schema.
    #[error("failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A config value is out of range.
    #[error("invalid config value: {0}")]
    InvalidValue(String),
    /// The Prometheus recorder could not be installed.
    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
