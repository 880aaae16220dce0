//! Server configuration.

use std::time::Duration;

use gqlws_session::SessionConfig;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, ServerError};

/// Configuration for the GraphQL WebSocket server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// WebSocket endpoint path.
    pub path: String,
    /// Time allowed between accept and `connection_init`, in milliseconds.
    pub init_timeout_ms: u64,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Per-connection outbound queue depth.
    pub outbound_capacity: usize,
    /// How long `shutdown` waits for the server task, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            path: "/graphql".into(),
            init_timeout_ms: 60_000,
            max_message_size: 16 * 1024 * 1024, // 16 MB
            outbound_capacity: 256,
            shutdown_timeout_ms: 30_000,
        }
    }
}

impl ServerConfig {
    /// `host:port` for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Handshake deadline.
    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    /// Grace period for shutdown.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Per-connection session tunables.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            init_timeout: self.init_timeout(),
            outbound_capacity: self.outbound_capacity,
        }
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !self.path.starts_with('/') {
            return Err(ServerError::InvalidValue(format!(
                "path must start with '/': {}",
                self.path
            )));
        }
        if matches!(self.path.as_str(), "/health" | "/metrics") {
            return Err(ServerError::InvalidValue(format!(
                "path {} is reserved",
                self.path
            )));
        }
        if self.init_timeout_ms == 0 {
            return Err(ServerError::InvalidValue("init_timeout_ms must be positive".into()));
        }
        if self.max_message_size == 0 {
            return Err(ServerError::InvalidValue(
                "max_message_size must be positive".into(),
            ));
        }
        if self.outbound_capacity == 0 {
            return Err(ServerError::InvalidValue(
                "outbound_capacity must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.path, "/graphql");
        assert_eq!(cfg.init_timeout(), Duration::from_secs(60));
        assert_eq!(cfg.max_message_size, 16 * 1024 * 1024);
        assert_eq!(cfg.outbound_capacity, 256);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn bind_addr_joins_host_and_port() {
        let cfg = ServerConfig {
            host: "0.0.0.0".into(),
            port: 8080,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.bind_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn session_config_carries_timeout_and_capacity() {
        let cfg = ServerConfig {
            init_timeout_ms: 1500,
            outbound_capacity: 8,
            ..ServerConfig::default()
        };
        let session = cfg.session_config();
        assert_eq!(session.init_timeout, Duration::from_millis(1500));
        assert_eq!(session.outbound_capacity, 8);
    }

    #[test]
    fn deserialize_partial_json_fills_defaults() {
        let cfg: ServerConfig = serde_json::from_str(r#"{"port": 4000, "path": "/ws"}"#).unwrap();
        assert_eq!(cfg.port, 4000);
        assert_eq!(cfg.path, "/ws");
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.init_timeout_ms, 60_000);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let bad = [
            ServerConfig {
                path: "graphql".into(),
                ..ServerConfig::default()
            },
            ServerConfig {
                path: "/health".into(),
                ..ServerConfig::default()
            },
            ServerConfig {
                init_timeout_ms: 0,
                ..ServerConfig::default()
            },
            ServerConfig {
                max_message_size: 0,
                ..ServerConfig::default()
            },
            ServerConfig {
                outbound_capacity: 0,
                ..ServerConfig::default()
            },
        ];
        for cfg in bad {
            assert!(
                matches!(cfg.validate(), Err(ServerError::InvalidValue(_))),
                "{cfg:?}"
            );
        }
    }
}
