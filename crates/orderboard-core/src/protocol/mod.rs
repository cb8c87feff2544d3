//! Protocol module containing message types and the payload codec.

pub mod codec;
pub mod messages;

pub use codec::{decode_message, encode_snapshot, is_complete_message, DecodeOptions, ProtocolError};
pub use messages::*;
