//! Message codec: one JSON object per line.

use braid_messages::Message;

use crate::ProtocolError;

/// Maximum encoded message size in bytes, excluding the trailing newline.
pub const MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024; // 4 MiB

/// Encode a message for transmission as a newline-terminated JSON line.
pub fn encode(message: &Message) -> Result<Vec<u8>, ProtocolError> {
    let mut bytes =
        serde_json::to_vec(message).map_err(|e| ProtocolError::Encode(e.to_string()))?;
    if bytes.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: bytes.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    bytes.push(b'\n');
    Ok(bytes)
}

/// Decode one line (with or without its trailing newline).
///
/// Any record that is not valid JSON, lacks a `type`, names an unknown type,
/// or misses a required field is reported as [`ProtocolError::Malformed`].
pub fn decode(line: &[u8]) -> Result<Message, ProtocolError> {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if line.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: line.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    serde_json::from_slice(line).map_err(|e| ProtocolError::Malformed(e.to_string()))
}
