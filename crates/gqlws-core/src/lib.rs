//! # gqlws-core
//!
//! Shared vocabulary for the `graphql-transport-ws` protocol.
//!
//! - **Frames**: [`Frame`] records with a closed [`MessageType`] enumeration
//! - **Close statuses**: the protocol's 44xx close codes as [`CloseStatus`]
//! - **Subprotocols**: negotiation and the rejected legacy identifier
//! - **Execution results**: GraphQL response and error wire shapes
//! - **Codec**: [`FrameCodec`] seam with a `serde_json` implementation
//! - **Logging**: `tracing` subscriber initialisation

#![deny(unsafe_code)]

pub mod codec;
pub mod errors;
pub mod execution;
pub mod logging;
pub mod protocol;

pub use codec::{FrameCodec, JsonCodec};
pub use errors::CodecError;
pub use execution::{ExecutionResult, GraphQlError, SourceLocation};
pub use protocol::close::CloseStatus;
pub use protocol::frame::Frame;
pub use protocol::message_type::MessageType;
pub use protocol::subprotocol::Subprotocol;
