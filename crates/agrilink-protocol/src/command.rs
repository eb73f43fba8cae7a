//! Outbound command encoding.
//!
//! Takes a logical actuation command (pump on/off, fill trigger, mode name)
//! and a channel's topic configuration, and produces the wire payload plus
//! the publish QoS. Encoding is symmetric with envelope unwrapping and path
//! extraction: a payload produced here, looped back through ingestion with
//! the channel's own configuration, recovers the logical value. Topics used
//! bidirectionally (command + feedback) depend on this.

use crate::envelope::SendEnvelope;
use agrilink_core::path::Step;
use agrilink_core::{EnvelopeFormat, PayloadMode, QosLevel, TopicConfig};
use serde_json::{json, Value};

/// A logical actuation command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Switch the pump on or off.
    Pump(bool),
    /// Trigger a fill cycle.
    Fill,
    /// Select an operating mode by name (e.g. "auto", "manual").
    Mode(String),
}

impl Command {
    /// The bare string form used for plain payloads and envelope data.
    fn bare(&self) -> String {
        match self {
            Command::Pump(true) => "true".to_string(),
            Command::Pump(false) => "false".to_string(),
            Command::Fill => "1".to_string(),
            Command::Mode(mode) => mode.clone(),
        }
    }

    /// The JSON value form used inside wrapper objects.
    fn json_value(&self) -> Value {
        match self {
            Command::Pump(on) => Value::Bool(*on),
            Command::Fill => json!(1),
            Command::Mode(mode) => Value::String(mode.clone()),
        }
    }
}

/// Errors raised while encoding a command.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("command topic '{0}' does not support indexed path expressions")]
    IndexedPath(String),
    #[error("failed to serialize command payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A wire-ready command payload.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedCommand {
    pub payload: String,
    pub qos: QosLevel,
}

/// Encode a command for a channel's configured wire format.
///
/// - Send envelope format: base64 data wrapper, regardless of payload mode.
/// - Raw payload mode: the bare string form.
/// - Json payload mode: an object nested along the configured path's key
///   segments (a `{"value": ...}` wrapper when no path is set).
pub fn encode_command(
    command: &Command,
    config: &TopicConfig,
) -> Result<EncodedCommand, CommandError> {
    let payload = match (config.payload_mode, config.envelope) {
        (_, EnvelopeFormat::Send) => {
            serde_json::to_string(&SendEnvelope::wrap(&command.bare()))?
        }
        (PayloadMode::Raw, _) => command.bare(),
        (PayloadMode::Json, _) => {
            let document = match &config.path {
                Some(path) => nest_along_path(path.steps(), command.json_value())
                    .ok_or_else(|| CommandError::IndexedPath(config.topic.clone()))?,
                None => json!({ "value": command.json_value() }),
            };
            serde_json::to_string(&document)?
        }
    };

    Ok(EncodedCommand {
        payload,
        qos: config.qos,
    })
}

/// Wrap a value in objects along the path's key segments, innermost first,
/// so that extracting with the same path recovers the value.
fn nest_along_path(steps: &[Step], value: Value) -> Option<Value> {
    let mut current = value;
    for step in steps.iter().rev() {
        match step {
            Step::Key(key) => {
                let mut wrapper = serde_json::Map::new();
                wrapper.insert(key.clone(), current);
                current = Value::Object(wrapper);
            }
            Step::Index(_) => return None,
        }
    }
    Some(current)
}
