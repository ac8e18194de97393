//! Protocol module containing the frame records and the fixed-layout codec.

pub mod codec;
pub mod messages;

pub use codec::{decode_reply, decode_request, encode_reply, encode_request, ProtocolError};
pub use messages::*;
