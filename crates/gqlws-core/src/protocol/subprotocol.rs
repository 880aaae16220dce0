//! `Sec-WebSocket-Protocol` identifiers.
//!
//! The transport selects from [`ADVERTISED`] during the upgrade; the session
//! only resolves the selected identifier.

use std::fmt;

/// Identifier of the supported protocol.
pub const GRAPHQL_TRANSPORT_WS: &str = "graphql-transport-ws";

/// Identifier of the unmaintained Apollo protocol. Accepted at upgrade time
/// only so the connection can be closed with a clear signal.
pub const SUBSCRIPTIONS_TRANSPORT_WS: &str = "subscriptions-transport-ws";

/// Protocol identifiers advertised during the upgrade, in preference order.
pub const ADVERTISED: [&str; 2] = [GRAPHQL_TRANSPORT_WS, SUBSCRIPTIONS_TRANSPORT_WS];

/// A recognised subprotocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Subprotocol {
    /// `graphql-transport-ws`.
    GraphQlTransportWs,
    /// `subscriptions-transport-ws`, rejected on connect.
    Legacy,
}

impl Subprotocol {
    /// Resolve a single identifier (case-insensitive).
    pub fn resolve(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.eq_ignore_ascii_case(GRAPHQL_TRANSPORT_WS) {
            Some(Self::GraphQlTransportWs)
        } else if value.eq_ignore_ascii_case(SUBSCRIPTIONS_TRANSPORT_WS) {
            Some(Self::Legacy)
        } else {
            None
        }
    }

    /// Wire identifier.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GraphQlTransportWs => GRAPHQL_TRANSPORT_WS,
            Self::Legacy => SUBSCRIPTIONS_TRANSPORT_WS,
        }
    }

    /// Whether this is the rejected legacy protocol.
    pub fn is_legacy(self) -> bool {
        self == Self::Legacy
    }
}

impl fmt::Display for Subprotocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
