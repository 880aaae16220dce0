//! `/health` endpoint body built from the open connections.

use std::sync::Arc;
use std::time::Instant;

use gqlws_session::{OperationRegistry, SessionInfo};
use serde::Serialize;

/// What the server tracks for one open connection.
#[derive(Clone)]
pub struct ConnectionEntry {
    /// Metadata, including whether `connection_init` was accepted.
    pub info: Arc<SessionInfo>,
    /// Live operations of the connection.
    pub registry: Arc<OperationRegistry>,
}

impl ConnectionEntry {
    /// `(handshake accepted, live operation count)` for this connection.
    pub fn load(&self) -> (bool, usize) {
        (self.info.is_initialised(), self.registry.len())
    }
}

/// Health check response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Open WebSocket connections.
    pub connections: usize,
    /// Open connections still waiting for an accepted `connection_init`.
    pub awaiting_init: usize,
    /// Operations registered across all connections.
    pub active_operations: usize,
}

impl HealthResponse {
    /// Summarise `(handshake accepted, live operations)` per connection.
    pub fn snapshot<I>(start_time: Instant, loads: I) -> Self
    where
        I: IntoIterator<Item = (bool, usize)>,
    {
        let mut health = Self {
            status: "ok",
            uptime_secs: start_time.elapsed().as_secs(),
            connections: 0,
            awaiting_init: 0,
            active_operations: 0,
        };
        for (initialised, operations) in loads {
            health.connections += 1;
            if !initialised {
                health.awaiting_init += 1;
            }
            health.active_operations += operations;
        }
        health
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_server() {
        let health = HealthResponse::snapshot(Instant::now(), []);
        assert_eq!(health.status, "ok");
        assert_eq!(health.connections, 0);
        assert_eq!(health.awaiting_init, 0);
        assert_eq!(health.active_operations, 0);
    }

    #[test]
    fn counts_handshakes_and_operations() {
        let health = HealthResponse::snapshot(Instant::now(), [(true, 2), (false, 0), (true, 3)]);
        assert_eq!(health.connections, 3);
        assert_eq!(health.awaiting_init, 1);
        assert_eq!(health.active_operations, 5);
    }

    #[test]
    fn entry_load_follows_session() {
        let entry = ConnectionEntry {
            info: Arc::new(SessionInfo::default()),
            registry: Arc::new(OperationRegistry::new()),
        };
        assert_eq!(entry.load(), (false, 0));
    }

    #[test]
    fn serialization() {
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        let parsed = serde_json::to_value(HealthResponse::snapshot(start, [(false, 1)])).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 1);
        assert_eq!(parsed["awaiting_init"], 1);
        assert_eq!(parsed["active_operations"], 1);
        assert!(parsed["uptime_secs"].as_u64().unwrap() >= 59);
    }
}
