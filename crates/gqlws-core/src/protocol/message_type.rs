//! The closed set of `graphql-transport-ws` message types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Message type carried in the `type` field of every frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Client → server handshake request.
    ConnectionInit,
    /// Server → client handshake acknowledgment.
    ConnectionAck,
    /// Client → server operation request.
    Subscribe,
    /// Server → client operation result.
    Next,
    /// Server → client operation failure (terminal).
    Error,
    /// Operation end, in either direction (terminal when sent by the server).
    Complete,
}

impl MessageType {
    /// Every message type, in protocol order.
    pub const ALL: [Self; 6] = [
        Self::ConnectionInit,
        Self::ConnectionAck,
        Self::Subscribe,
        Self::Next,
        Self::Error,
        Self::Complete,
    ];

    /// Wire string for this type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionInit => "connection_init",
            Self::ConnectionAck => "connection_ack",
            Self::Subscribe => "subscribe",
            Self::Next => "next",
            Self::Error => "error",
            Self::Complete => "complete",
        }
    }

    /// Resolve a wire string. Unknown strings resolve to `None`.
    pub fn resolve(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == value)
    }

    /// Whether a client may send this type.
    pub fn is_inbound(self) -> bool {
        matches!(self, Self::ConnectionInit | Self::Subscribe | Self::Complete)
    }

    /// Whether the server may send this type.
    pub fn is_outbound(self) -> bool {
        matches!(
            self,
            Self::ConnectionAck | Self::Next | Self::Error | Self::Complete
        )
    }

    /// Whether this type ends an operation when sent by the server.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Error | Self::Complete)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
