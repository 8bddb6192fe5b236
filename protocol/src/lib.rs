//! Wire protocol: newline-delimited JSON framing and size limits.

pub mod codec;
pub mod error;

pub use codec::{decode, encode, MAX_MESSAGE_SIZE};
pub use error::ProtocolError;
