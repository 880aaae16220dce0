//! # gqlws-session
//!
//! Per-connection state machine for the `graphql-transport-ws` protocol,
//! independent of any socket type.
//!
//! - **Handshake**: [`InitGate`] latch raced by `connection_init` and the
//!   init timeout, with an optional [`InitHook`]
//! - **Dispatch**: [`ProtocolDispatcher`] routes inbound frames
//! - **Registry**: [`OperationRegistry`] maps operation ids to cancellation
//!   handles
//! - **Execution**: [`ExecutionGateway`] runs operations; results flow back
//!   as `next`/`error`/`complete` frames
//! - **Session**: [`ConnectionSession`] ties it together and tears down on
//!   close

#![deny(unsafe_code)]

pub mod adapter;
pub mod dispatcher;
pub mod gate;
pub mod gateway;
pub mod hook;
pub mod info;
pub mod metrics;
pub mod registry;
pub mod session;

pub use adapter::{FrameStream, OperationEnd, into_frames};
pub use dispatcher::{Flow, ProtocolDispatcher};
pub use gate::{GateState, InitGate};
pub use gateway::{
    ExecutionGateway, ExecutionOutput, FnGateway, GatewayError, InvalidPayload, OperationInput,
    ResultStream, gateway_fn,
};
pub use hook::{InitError, InitHook};
pub use info::SessionInfo;
pub use registry::{OperationHandle, OperationRegistry, RegistryError};
pub use session::{
    ConnectionSession, Outbound, SessionBuilder, SessionConfig, SessionEnd,
};
