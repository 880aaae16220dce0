//! Pluggable `connection_init` handling.

use async_trait::async_trait;
use gqlws_core::CloseStatus;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::info::SessionInfo;

/// Outcome of a failed init hook.
#[derive(Debug, Error)]
pub enum InitError {
    /// Policy rejection; the connection closes with `code`.
    #[error("connection init rejected ({code}): {reason}")]
    Rejected {
        /// Close code to send.
        code: u16,
        /// Close reason to send.
        reason: String,
    },
    /// Any other failure; the connection closes with 4401.
    #[error("connection init failed: {0}")]
    Failed(String),
}

impl InitError {
    /// Reject with an explicit close code.
    pub fn rejected(code: u16, reason: impl Into<String>) -> Self {
        Self::Rejected {
            code,
            reason: reason.into(),
        }
    }

    /// Close status to send for this failure.
    pub fn close_status(&self) -> CloseStatus {
        match self {
            Self::Rejected { code, reason } => CloseStatus::new(*code, reason.clone()),
            Self::Failed(_) => CloseStatus::unauthorized(),
        }
    }
}

/// Authorizes and enriches the handshake.
///
/// Runs once per connection with the `connection_init` payload. The returned
/// map becomes the `connection_ack` payload.
#[async_trait]
pub trait InitHook: Send + Sync {
    /// Handle the init payload.
    async fn handle_init(
        &self,
        payload: Option<&Map<String, Value>>,
        session: &SessionInfo,
    ) -> Result<Map<String, Value>, InitError>;
}
