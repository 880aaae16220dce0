//! Wire-level protocol definitions: message types, frames, close statuses,
//! and subprotocol negotiation.

pub mod close;
pub mod frame;
pub mod message_type;
pub mod subprotocol;
