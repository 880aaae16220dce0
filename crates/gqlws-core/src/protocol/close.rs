//! Close statuses sent when the protocol ends a connection.

use std::fmt;

/// Close code and reason for a protocol-initiated connection close.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseStatus {
    /// Numeric close code.
    pub code: u16,
    /// Human-readable reason.
    pub reason: String,
}

impl CloseStatus {
    /// Malformed frame, unknown type, or missing required `id`.
    pub const INVALID_MESSAGE: u16 = 4400;
    /// Handshake not completed, or rejected by the init hook.
    pub const UNAUTHORIZED: u16 = 4401;
    /// No `connection_init` before the timeout.
    pub const INIT_TIMEOUT: u16 = 4408;
    /// An operation with the same id is still live.
    pub const SUBSCRIBER_EXISTS: u16 = 4409;
    /// More than one `connection_init`.
    pub const TOO_MANY_INIT_REQUESTS: u16 = 4429;
    /// Server is going away.
    pub const GOING_AWAY: u16 = 1001;

    /// Build a status from a code and reason.
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// 4400 Invalid message.
    pub fn invalid_message() -> Self {
        Self::new(Self::INVALID_MESSAGE, "Invalid message")
    }

    /// 4401 Unauthorized.
    pub fn unauthorized() -> Self {
        Self::new(Self::UNAUTHORIZED, "Unauthorized")
    }

    /// 4408 Connection initialisation timeout.
    pub fn init_timeout() -> Self {
        Self::new(Self::INIT_TIMEOUT, "Connection initialisation timeout")
    }

    /// 4409 Subscriber for `id` already exists.
    pub fn subscriber_exists(id: &str) -> Self {
        Self::new(
            Self::SUBSCRIBER_EXISTS,
            format!("Subscriber for {id} already exists"),
        )
    }

    /// 4429 Too many initialisation requests.
    pub fn too_many_init_requests() -> Self {
        Self::new(Self::TOO_MANY_INIT_REQUESTS, "Too many initialisation requests")
    }

    /// 1001 Server shutting down.
    pub fn going_away() -> Self {
        Self::new(Self::GOING_AWAY, "Server shutting down")
    }
}

impl fmt::Display for CloseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.reason)
    }
}
