//! Gateway envelope classification and unwrapping.
//!
//! Two vendor wrapper shapes are known, plus the plain form:
//! - Receive envelope (uplink): application/device identifiers with a
//!   nested `object` payload.
//! - Send envelope (downlink): `confirmed` flag, base64 `data`, `fPort`.
//!
//! Classification runs ordered structural predicates on key presence —
//! Receive, then Send, then Plain — and only when the configured format is
//! `Auto`. Explicit formats skip detection entirely.

use agrilink_core::EnvelopeFormat;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The classified wrapper shape of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    Receive,
    Send,
    Plain,
}

/// The downlink wrapper shape, also used by the command encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendEnvelope {
    pub confirmed: bool,
    /// Base64-encoded payload body.
    pub data: String,
    #[serde(rename = "fPort")]
    pub f_port: u8,
}

impl SendEnvelope {
    /// Wrap a bare payload string, base64-encoding it.
    pub fn wrap(payload: &str) -> Self {
        Self {
            confirmed: false,
            data: BASE64.encode(payload),
            f_port: 1,
        }
    }

    /// Decode the base64 data back to the payload text.
    pub fn unwrap_data(&self) -> Result<String, EnvelopeError> {
        let bytes = BASE64.decode(&self.data)?;
        String::from_utf8(bytes).map_err(|_| EnvelopeError::InvalidUtf8)
    }
}

/// Errors raised while decoding an envelope. All of them cause the message
/// to be logged and dropped; none are fatal.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("payload is not valid JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),
    #[error("receive envelope is missing its payload object")]
    MissingObject,
    #[error("send envelope is missing the data field")]
    MissingData,
    #[error("send envelope data is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("send envelope data is not valid UTF-8")]
    InvalidUtf8,
}

/// The inner document an envelope unwraps to.
///
/// Send envelopes may carry plain text rather than JSON; path extraction is
/// skipped for text documents and the text itself is the value.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Json(Value),
    Text(String),
}

/// Classify a decoded JSON value by structural key presence.
///
/// Order matters: a Receive envelope wins over a Send envelope.
pub fn classify(value: &Value) -> EnvelopeKind {
    let Some(map) = value.as_object() else {
        return EnvelopeKind::Plain;
    };
    if map.contains_key("object")
        && (map.contains_key("applicationID") || map.contains_key("devEUI"))
    {
        return EnvelopeKind::Receive;
    }
    if map.contains_key("data") && map.contains_key("fPort") {
        return EnvelopeKind::Send;
    }
    EnvelopeKind::Plain
}

/// Decode a json-mode payload and unwrap its envelope.
///
/// Returns the document path extraction runs against.
pub fn unwrap_payload(text: &str, format: EnvelopeFormat) -> Result<Document, EnvelopeError> {
    let value: Value = serde_json::from_str(text)?;
    let kind = match format {
        EnvelopeFormat::Plain => EnvelopeKind::Plain,
        EnvelopeFormat::Receive => EnvelopeKind::Receive,
        EnvelopeFormat::Send => EnvelopeKind::Send,
        EnvelopeFormat::Auto => classify(&value),
    };
    unwrap_value(value, kind)
}

fn unwrap_value(value: Value, kind: EnvelopeKind) -> Result<Document, EnvelopeError> {
    match kind {
        EnvelopeKind::Plain => Ok(Document::Json(value)),
        EnvelopeKind::Receive => {
            let object = value
                .as_object()
                .and_then(|map| map.get("object"))
                .cloned()
                .ok_or(EnvelopeError::MissingObject)?;
            Ok(Document::Json(object))
        }
        EnvelopeKind::Send => {
            let data = value
                .as_object()
                .and_then(|map| map.get("data"))
                .and_then(Value::as_str)
                .ok_or(EnvelopeError::MissingData)?;
            let bytes = BASE64.decode(data)?;
            let text = String::from_utf8(bytes).map_err(|_| EnvelopeError::InvalidUtf8)?;
            // Inner data may itself be JSON; fall back to text scalars.
            match serde_json::from_str::<Value>(&text) {
                Ok(inner @ (Value::Object(_) | Value::Array(_))) => Ok(Document::Json(inner)),
                _ => Ok(Document::Text(text)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_receive() {
        let value = json!({
            "applicationID": "12",
            "devEUI": "a81758fffe05e6fb",
            "object": {"temperature": 21.5}
        });
        assert_eq!(classify(&value), EnvelopeKind::Receive);
    }

    #[test]
    fn test_classify_send() {
        let value = json!({"confirmed": false, "data": "dHJ1ZQ==", "fPort": 1});
        assert_eq!(classify(&value), EnvelopeKind::Send);
    }

    #[test]
    fn test_classify_order_receive_wins() {
        // Both key sets present: the ordered predicates pick Receive.
        let value = json!({
            "devEUI": "a817",
            "object": {},
            "data": "AA==",
            "fPort": 1
        });
        assert_eq!(classify(&value), EnvelopeKind::Receive);
    }

    #[test]
    fn test_classify_plain() {
        assert_eq!(classify(&json!({"temperature": 20})), EnvelopeKind::Plain);
        assert_eq!(classify(&json!([1, 2])), EnvelopeKind::Plain);
        assert_eq!(classify(&json!(3.5)), EnvelopeKind::Plain);
        // Incomplete key sets stay plain.
        assert_eq!(classify(&json!({"object": {}})), EnvelopeKind::Plain);
        assert_eq!(classify(&json!({"data": "AA=="})), EnvelopeKind::Plain);
    }

    #[test]
    fn test_unwrap_receive_yields_object() {
        let text = r#"{"applicationID":"1","devEUI":"a8","object":{"moisture":40.5}}"#;
        let doc = unwrap_payload(text, EnvelopeFormat::Auto).unwrap();
        assert_eq!(doc, Document::Json(json!({"moisture": 40.5})));
    }

    #[test]
    fn test_unwrap_send_decodes_base64_text() {
        let envelope = serde_json::to_string(&SendEnvelope::wrap("true")).unwrap();
        let doc = unwrap_payload(&envelope, EnvelopeFormat::Auto).unwrap();
        assert_eq!(doc, Document::Text("true".to_string()));
    }

    #[test]
    fn test_unwrap_send_with_json_data() {
        let envelope = serde_json::to_string(&SendEnvelope::wrap(r#"{"pump":true}"#)).unwrap();
        let doc = unwrap_payload(&envelope, EnvelopeFormat::Send).unwrap();
        assert_eq!(doc, Document::Json(json!({"pump": true})));
    }

    #[test]
    fn test_explicit_format_skips_classification() {
        // Looks like a Send envelope, but the topic says Plain: the wrapper
        // itself is the document.
        let text = r#"{"confirmed":false,"data":"dHJ1ZQ==","fPort":1}"#;
        let doc = unwrap_payload(text, EnvelopeFormat::Plain).unwrap();
        assert_eq!(
            doc,
            Document::Json(json!({"confirmed": false, "data": "dHJ1ZQ==", "fPort": 1}))
        );
    }

    #[test]
    fn test_unwrap_malformed_json_is_error() {
        assert!(unwrap_payload("not json", EnvelopeFormat::Auto).is_err());
        assert!(matches!(
            unwrap_payload(r#"{"x":1}"#, EnvelopeFormat::Receive),
            Err(EnvelopeError::MissingObject)
        ));
        assert!(matches!(
            unwrap_payload(r#"{"x":1}"#, EnvelopeFormat::Send),
            Err(EnvelopeError::MissingData)
        ));
    }

    #[test]
    fn test_send_envelope_round_trip() {
        let envelope = SendEnvelope::wrap("auto");
        assert_eq!(envelope.unwrap_data().unwrap(), "auto");
        assert!(!envelope.confirmed);
        assert_eq!(envelope.f_port, 1);
    }
}
