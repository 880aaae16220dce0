//! Protocol frame record.

use serde::Serialize;
use serde_json::{Map, Value};

use super::message_type::MessageType;
use crate::execution::GraphQlError;

/// One protocol message: `{type, id?, payload?}`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Frame {
    /// Operation identifier, present on operation-scoped frames.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Message type.
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// Handshake data, query input, result data, or error list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Frame {
    /// Build a frame from its parts.
    pub fn new(message_type: MessageType, id: Option<String>, payload: Option<Value>) -> Self {
        Self {
            id,
            message_type,
            payload,
        }
    }

    /// `connection_ack` carrying the init hook's payload.
    pub fn connection_ack(payload: Map<String, Value>) -> Self {
        Self::new(MessageType::ConnectionAck, None, Some(Value::Object(payload)))
    }

    /// `next` carrying one execution result.
    pub fn next(id: impl Into<String>, payload: Value) -> Self {
        Self::new(MessageType::Next, Some(id.into()), Some(payload))
    }

    /// `error` carrying a list of GraphQL errors.
    pub fn error(id: impl Into<String>, errors: &[GraphQlError]) -> Self {
        let payload = Value::Array(errors.iter().map(GraphQlError::to_value).collect());
        Self::new(MessageType::Error, Some(id.into()), Some(payload))
    }

    /// `complete` for an operation.
    pub fn complete(id: impl Into<String>) -> Self {
        Self::new(MessageType::Complete, Some(id.into()), None)
    }

    /// Payload as a JSON object, if it is one.
    pub fn payload_object(&self) -> Option<&Map<String, Value>> {
        self.payload.as_ref().and_then(Value::as_object)
    }

    /// Whether this frame ends its operation.
    pub fn is_terminal(&self) -> bool {
        self.message_type.is_terminal()
    }
}
