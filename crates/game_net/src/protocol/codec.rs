//! JSON payload codec.
//!
//! Frames carry an opaque payload; roles that exchange structured messages
//! serialize them with `serde_json` behind the fixed binary header.

use super::header::{frame, payload};
use crate::error::ProtocolError;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serializes `body` and wraps it in a frame for `command`.
pub fn encode<T: Serialize>(command: u16, flags: u16, body: &T) -> Result<Vec<u8>, ProtocolError> {
    let bytes = serde_json::to_vec(body).map_err(|e| ProtocolError::Encode(e.to_string()))?;
    frame(command, flags, &bytes)
}

/// Deserializes the payload of a complete frame.
pub fn decode_body<T: DeserializeOwned>(message: &[u8]) -> Result<T, ProtocolError> {
    let body = payload(message)?;
    serde_json::from_slice(body).map_err(|e| ProtocolError::Decode(e.to_string()))
}
