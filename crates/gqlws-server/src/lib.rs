//! # gqlws-server
//!
//! Axum binding for the `graphql-transport-ws` session core.
//!
//! - **Server**: [`GraphQlWsServer`] upgrades requests on the configured
//!   path, negotiates the subprotocol, and runs one
//!   [`gqlws_session::ConnectionSession`] per socket
//! - **Config**: [`ServerConfig`] with file + environment loading
//! - **Observability**: `/health`, optional Prometheus `/metrics`
//! - **Shutdown**: [`ShutdownCoordinator`] closes every connection with 1001

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod loader;
pub mod metrics;
pub mod server;
pub mod shutdown;

pub use config::ServerConfig;
pub use errors::{Result, ServerError};
pub use server::{GraphQlWsServer, ServerHandle};
pub use shutdown::ShutdownCoordinator;
