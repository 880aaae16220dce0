//! Config loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ServerConfig::default()`]
//! 2. If a config file is given and exists, deep-merge its values over defaults
//! 3. Apply `GQLWS_*` environment variable overrides (highest priority)
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ServerConfig;
use crate::errors::Result;

/// Env var naming the config file.
pub const CONFIG_PATH_ENV: &str = "GQLWS_CONFIG";

/// Config file path from `GQLWS_CONFIG`, if set.
pub fn config_path() -> Option<PathBuf> {
    read_env_string(CONFIG_PATH_ENV).map(PathBuf::from)
}

/// Load config from `GQLWS_CONFIG` (if set) with env var overrides.
pub fn load_config() -> Result<ServerConfig> {
    match config_path() {
        Some(path) => load_config_from_path(&path),
        None => finish(serde_json::to_value(ServerConfig::default())?),
    }
}

/// Load config from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_config_from_path(path: &Path) -> Result<ServerConfig> {
    let defaults = serde_json::to_value(ServerConfig::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading config from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "config file not found, using defaults");
        defaults
    };

    finish(merged)
}

fn finish(merged: Value) -> Result<ServerConfig> {
    let mut config: ServerConfig = serde_json::from_value(merged)?;
    apply_env_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides.
///
/// Invalid values are logged and ignored (fall back to file/default).
pub fn apply_env_overrides(config: &mut ServerConfig) {
    if let Some(v) = read_env_string("GQLWS_HOST") {
        config.host = v;
    }
    if let Some(v) = read_env_u16("GQLWS_PORT", 0, 65535) {
        config.port = v;
    }
    if let Some(v) = read_env_string("GQLWS_PATH") {
        config.path = v;
    }
    if let Some(v) = read_env_u64("GQLWS_INIT_TIMEOUT_MS", 1, 3_600_000) {
        config.init_timeout_ms = v;
    }
    if let Some(v) = read_env_usize("GQLWS_MAX_MESSAGE_SIZE", 1024, 1_073_741_824) {
        config.max_message_size = v;
    }
    if let Some(v) = read_env_usize("GQLWS_OUTBOUND_CAPACITY", 1, 65_536) {
        config.outbound_capacity = v;
    }
    if let Some(v) = read_env_u64("GQLWS_SHUTDOWN_TIMEOUT_MS", 0, 600_000) {
        config.shutdown_timeout_ms = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers ─────────────────────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    let val = std::env::var(name).ok()?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ServerError;
    use serde_json::json;

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_simple_override() {
        let merged = deep_merge(json!({"a": 1, "b": 2}), json!({"a": 10}));
        assert_eq!(merged, json!({"a": 10, "b": 2}));
    }

    #[test]
    fn merge_nested_override() {
        let merged = deep_merge(
            json!({"tls": {"cert": "a.pem", "key": "a.key"}}),
            json!({"tls": {"cert": "b.pem"}}),
        );
        assert_eq!(merged["tls"]["cert"], "b.pem");
        assert_eq!(merged["tls"]["key"], "a.key");
    }

    #[test]
    fn merge_null_preserves_target() {
        let merged = deep_merge(json!({"port": 80}), json!({"port": null}));
        assert_eq!(merged["port"], 80);
    }

    #[test]
    fn merge_array_and_primitive_replace() {
        assert_eq!(
            deep_merge(json!({"x": [1, 2]}), json!({"x": [3]})),
            json!({"x": [3]})
        );
        assert_eq!(deep_merge(json!({"x": {"y": 1}}), json!({"x": 2})), json!({"x": 2}));
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u16_range("8080", 0, 65535), Some(8080));
        assert_eq!(parse_u16_range("70000", 0, 65535), None);
        assert_eq!(parse_u64_range("0", 1, 10), None);
        assert_eq!(parse_u64_range("5", 1, 10), Some(5));
        assert_eq!(parse_usize_range("abc", 1, 10), None);
        assert_eq!(parse_usize_range("-1", 0, 10), None);
    }

    // ── load_config_from_path ───────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let config = load_config_from_path(Path::new("/nonexistent/gqlws.json")).unwrap();
        assert_eq!(config.path, ServerConfig::default().path);
        assert_eq!(config.init_timeout_ms, ServerConfig::default().init_timeout_ms);
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gqlws.json");
        std::fs::write(&path, r#"{"path": "/subscriptions", "init_timeout_ms": 5000}"#).unwrap();

        let config = load_config_from_path(&path).unwrap();
        assert_eq!(config.path, "/subscriptions");
        assert_eq!(config.init_timeout_ms, 5000);
        assert_eq!(config.outbound_capacity, 256);
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gqlws.json");
        std::fs::write(&path, "not valid json").unwrap();

        assert!(matches!(
            load_config_from_path(&path),
            Err(ServerError::Json(_))
        ));
    }

    #[test]
    fn load_invalid_value_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gqlws.json");
        std::fs::write(&path, r#"{"path": "no-slash"}"#).unwrap();

        assert!(matches!(
            load_config_from_path(&path),
            Err(ServerError::InvalidValue(_))
        ));
    }

    #[test]
    fn load_wrong_type_is_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gqlws.json");
        std::fs::write(&path, r#"{"port": "eighty"}"#).unwrap();

        assert!(matches!(
            load_config_from_path(&path),
            Err(ServerError::Json(_))
        ));
    }
}
