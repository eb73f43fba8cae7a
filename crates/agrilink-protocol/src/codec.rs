//! JSON codec for stream events.
//!
//! Stream events travel as JSON text frames to the real-time push
//! collaborator. This module provides the encoding and decoding utilities.

use crate::messages::StreamEvent;
use thiserror::Error;

/// Errors that can occur during event encoding/decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Encode a stream event to a JSON string.
pub fn encode_event(event: &StreamEvent) -> Result<String, CodecError> {
    serde_json::to_string(event).map_err(CodecError::from)
}

/// Decode a stream event from a JSON string.
pub fn decode_event(text: &str) -> Result<StreamEvent, CodecError> {
    serde_json::from_str(text).map_err(CodecError::from)
}
