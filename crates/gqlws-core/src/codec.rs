//! Frame encoding and decoding.

use serde::Deserialize;
use serde_json::Value;

use crate::errors::{CodecError, Result};
use crate::protocol::frame::Frame;
use crate::protocol::message_type::MessageType;

/// Converts between transport text messages and [`Frame`]s.
pub trait FrameCodec: Send + Sync {
    /// Decode one inbound message.
    fn decode(&self, text: &str) -> Result<Frame>;

    /// Encode one outbound frame.
    fn encode(&self, frame: &Frame) -> Result<String>;
}

/// `serde_json` codec for the JSON wire format.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    message_type: Option<String>,
    id: Option<String>,
    payload: Option<Value>,
}

impl FrameCodec for JsonCodec {
    fn decode(&self, text: &str) -> Result<Frame> {
        let value: Value = serde_json::from_str(text)?;
        if !value.is_object() {
            return Err(CodecError::NotAnObject);
        }
        let raw: RawFrame = serde_json::from_value(value)?;
        let type_str = raw.message_type.ok_or(CodecError::MissingType)?;
        let message_type =
            MessageType::resolve(&type_str).ok_or(CodecError::UnknownType(type_str))?;
        Ok(Frame {
            id: raw.id,
            message_type,
            payload: raw.payload.filter(|p| !p.is_null()),
        })
    }

    fn encode(&self, frame: &Frame) -> Result<String> {
        Ok(serde_json::to_string(frame)?)
    }
}
