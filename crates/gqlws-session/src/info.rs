//! Connection metadata visible to the init hook and the execution gateway.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use gqlws_core::Subprotocol;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Metadata about one accepted connection.
#[derive(Debug)]
pub struct SessionInfo {
    /// Unique connection id.
    pub connection_id: String,
    /// Request URI of the upgrade.
    pub uri: String,
    /// Upgrade request headers, lower-cased names.
    pub headers: BTreeMap<String, String>,
    /// Negotiated subprotocol, if any.
    pub subprotocol: Option<Subprotocol>,
    /// When the connection was accepted.
    pub connected_at: DateTime<Utc>,
    /// Payload of the accepted `connection_init`.
    init_payload: RwLock<Option<Map<String, Value>>>,
}

impl SessionInfo {
    /// Metadata for a new connection with a generated id.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            connection_id: format!("conn_{}", Uuid::now_v7()),
            uri: uri.into(),
            headers: BTreeMap::new(),
            subprotocol: Some(Subprotocol::GraphQlTransportWs),
            connected_at: Utc::now(),
            init_payload: RwLock::new(None),
        }
    }

    /// Replace the request headers. Names are lower-cased.
    #[must_use]
    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        self.headers = headers
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
            .collect();
        self
    }

    /// Set the negotiated subprotocol.
    #[must_use]
    pub fn with_subprotocol(mut self, subprotocol: Option<Subprotocol>) -> Self {
        self.subprotocol = subprotocol;
        self
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Payload of the accepted `connection_init`, once acknowledged.
    pub fn init_payload(&self) -> Option<Map<String, Value>> {
        self.init_payload.read().clone()
    }

    /// Whether a `connection_init` has been accepted.
    pub fn is_initialised(&self) -> bool {
        self.init_payload.read().is_some()
    }

    pub(crate) fn set_init_payload(&self, payload: Map<String, Value>) {
        *self.init_payload.write() = Some(payload);
    }
}

impl Default for SessionInfo {
    fn default() -> Self {
        Self::new("/")
    }
}
