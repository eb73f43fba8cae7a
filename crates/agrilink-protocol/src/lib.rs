//! # agrilink-protocol
//!
//! Wire-level concerns of the AgriLink pipeline:
//! - Vendor gateway envelope classification, unwrapping and encoding
//! - Outbound command encoding honoring per-channel topic configuration
//! - Typed stream events and their JSON codec

pub mod codec;
pub mod command;
pub mod envelope;
pub mod messages;

pub use codec::{decode_event, encode_event, CodecError};
pub use command::{encode_command, Command, CommandError, EncodedCommand};
pub use envelope::{
    classify, unwrap_payload, Document, EnvelopeError, EnvelopeKind, SendEnvelope,
};
pub use messages::StreamEvent;
