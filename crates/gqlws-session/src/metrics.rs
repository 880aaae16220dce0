//! Metric names recorded by the session layer.
//!
//! Recording goes through the `metrics` facade; without an installed
//! recorder every call is a no-op.

/// Connections accepted total (counter).
pub const CONNECTIONS_TOTAL: &str = "graphql_ws_connections_total";
/// Open connections (gauge).
pub const CONNECTIONS_ACTIVE: &str = "graphql_ws_connections_active";
/// Connection lifetime seconds (histogram).
pub const CONNECTION_DURATION_SECONDS: &str = "graphql_ws_connection_duration_seconds";
/// Operations started total (counter).
pub const OPERATIONS_TOTAL: &str = "graphql_ws_operations_total";
/// Operations that ended with an `error` frame (counter).
pub const OPERATION_ERRORS_TOTAL: &str = "graphql_ws_operation_errors_total";
/// Server-initiated closes total (counter, labels: code).
pub const CLOSES_TOTAL: &str = "graphql_ws_closes_total";
