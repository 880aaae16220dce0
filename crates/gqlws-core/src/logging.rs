//! `tracing` subscriber initialisation.
//!
//! Connection and operation context (`connection_id`, `operation_id`) is
//! carried on spans opened by the session crate; these helpers only install
//! the global subscriber.

use tracing_subscriber::EnvFilter;

/// Build the level filter. `RUST_LOG` wins over `level` when set.
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initialize the global tracing subscriber with compact stderr output.
///
/// Call once at application startup. Subsequent calls are no-ops.
///
/// # Arguments
///
/// * `level` - Minimum log level to display, e.g. `"info"`.
pub fn init_subscriber(level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // try_init fails if a global subscriber is already set
    let _ = subscriber.try_init();
}

/// Initialize the global tracing subscriber with JSON-lines output on stderr.
///
/// Span fields are flattened into each event so log collectors can filter on
/// `connection_id` and `operation_id`.
pub fn init_json_subscriber(level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_writer(std::io::stderr)
        .json()
        .with_current_span(true)
        .with_span_list(false);

    let _ = subscriber.try_init();
}
