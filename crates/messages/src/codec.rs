//! Binary encoding for payloads and envelopes.
//!
//! Everything is bincode 2 with the standard configuration. A decode must
//! consume the whole input; leftover bytes mean the payload does not match
//! the schema it was decoded with.

use bincode::{Decode, Encode};
use thiserror::Error;

/// Errors that can occur during message encoding/decoding.
///
/// Any of these on a received message is a protocol contract violation.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("expected {expected} message, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Unknown message type tag: {0}")]
    UnknownTag(String),

    #[error("Decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("Encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("{0} trailing bytes after decode")]
    TrailingBytes(usize),
}

pub(crate) fn encode<T: Encode>(value: &T) -> Result<Vec<u8>, CodecError> {
    Ok(bincode::encode_to_vec(value, bincode::config::standard())?)
}

pub(crate) fn decode<T: Decode<()>>(bytes: &[u8]) -> Result<T, CodecError> {
    let (value, read) = bincode::decode_from_slice(bytes, bincode::config::standard())?;
    if read != bytes.len() {
        return Err(CodecError::TrailingBytes(bytes.len() - read));
    }
    Ok(value)
}
