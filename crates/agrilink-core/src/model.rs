//! AgriLink data model types.
//!
//! These types describe the entities the station tracks:
//! - Sensors with thresholds and a single telemetry topic
//! - Reservoirs with a level topic and optional command channels
//! - History points, alerts and topic configuration
//!
//! Everything here is serde (de)serializable so that snapshots and stream
//! events can carry the same shapes the dashboard binds to.

use crate::path::PathExpr;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a topic's body is a bare value or JSON requiring path extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadMode {
    Raw,
    Json,
}

/// The fixed JSON wrapper shape a vendor gateway uses on a topic.
///
/// `Auto` is a distinct configuration variant: classification by structural
/// key presence only runs for `Auto`, never for the explicit variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvelopeFormat {
    /// Bare value or plain JSON document, no wrapper.
    #[serde(rename = "raw")]
    Plain,
    /// Gateway uplink wrapper with application/device identifiers and a
    /// nested payload object.
    #[serde(rename = "envelope-receive")]
    Receive,
    /// Gateway downlink wrapper with a confirmation flag, base64 data and a
    /// port number.
    #[serde(rename = "envelope-send")]
    Send,
    /// Detect the shape per message, in the order Receive, Send, Plain.
    #[serde(rename = "auto")]
    Auto,
}

/// MQTT quality-of-service level, validated to 0..=2 at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct QosLevel(u8);

/// Error for out-of-range QoS values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("QoS must be 0, 1 or 2, got {0}")]
pub struct InvalidQos(pub u8);

impl QosLevel {
    pub const AT_MOST_ONCE: QosLevel = QosLevel(0);
    pub const AT_LEAST_ONCE: QosLevel = QosLevel(1);
    pub const EXACTLY_ONCE: QosLevel = QosLevel(2);

    pub fn new(level: u8) -> Result<Self, InvalidQos> {
        if level <= 2 {
            Ok(Self(level))
        } else {
            Err(InvalidQos(level))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for QosLevel {
    fn default() -> Self {
        Self::AT_MOST_ONCE
    }
}

impl TryFrom<u8> for QosLevel {
    type Error = InvalidQos;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        QosLevel::new(level)
    }
}

impl From<QosLevel> for u8 {
    fn from(qos: QosLevel) -> u8 {
        qos.0
    }
}

/// Configuration of one MQTT topic feeding or driven by an entity channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicConfig {
    /// The MQTT topic string.
    pub topic: String,

    /// How the payload body is interpreted.
    pub payload_mode: PayloadMode,

    /// Path expression into the decoded document. Required iff
    /// `payload_mode` is `Json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathExpr>,

    /// Envelope wrapper shape on this topic.
    pub envelope: EnvelopeFormat,

    /// Subscribe/publish QoS for this topic.
    pub qos: QosLevel,
}

impl TopicConfig {
    /// A raw-mode topic with no wrapper, QoS 0.
    pub fn raw(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            payload_mode: PayloadMode::Raw,
            path: None,
            envelope: EnvelopeFormat::Plain,
            qos: QosLevel::AT_MOST_ONCE,
        }
    }

    /// A json-mode topic extracting `path`, QoS 0, auto envelope detection.
    pub fn json(topic: &str, path: PathExpr) -> Self {
        Self {
            topic: topic.to_string(),
            payload_mode: PayloadMode::Json,
            path: Some(path),
            envelope: EnvelopeFormat::Auto,
            qos: QosLevel::AT_MOST_ONCE,
        }
    }
}

/// Connectivity/threshold status of a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorStatus {
    #[default]
    Offline,
    Online,
    /// The last accepted value breaches a configured bound.
    Warning,
}

/// A telemetry sensor fed by a single topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sensor {
    pub id: String,
    pub name: String,

    /// Telemetry input topic.
    pub input: TopicConfig,

    /// Lower alert bound. Values below it raise a low-threshold alert.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_threshold: Option<f64>,

    /// Upper alert bound. Values above it raise a high-threshold alert.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_threshold: Option<f64>,

    /// Last accepted value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,

    #[serde(default)]
    pub status: SensorStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,

    /// Transport receive timestamp of the last message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Utc>>,

    /// Display option: when set, history points also carry the receive
    /// timestamp. Presentation concern only.
    #[serde(default)]
    pub show_received_at: bool,
}

impl Sensor {
    pub fn new(id: &str, name: &str, input: TopicConfig) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            input,
            min_threshold: None,
            max_threshold: None,
            value: None,
            status: SensorStatus::Offline,
            last_update: None,
            received_at: None,
            show_received_at: false,
        }
    }
}

/// A water reservoir with a level topic and up to three command channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservoir {
    pub id: String,
    pub name: String,

    /// Fill-level telemetry topic.
    pub level: TopicConfig,

    /// Pump on/off command + feedback topic.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pump: Option<TopicConfig>,

    /// Fill trigger topic. Trigger-only, carries no state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill: Option<TopicConfig>,

    /// Auto/manual mode command + feedback topic.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<TopicConfig>,

    /// Capacity in liters, for display.
    pub capacity: f64,

    /// Level at or below which a low-level alert is raised, in percent.
    pub low_threshold: f64,

    /// Current fill level, clamped to 0..=100 percent.
    #[serde(default)]
    pub current_level: f64,

    #[serde(default)]
    pub pump_on: bool,

    #[serde(default)]
    pub auto_mode: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub show_received_at: bool,
}

impl Reservoir {
    pub fn new(id: &str, name: &str, level: TopicConfig) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            level,
            pump: None,
            fill: None,
            mode: None,
            capacity: 0.0,
            low_threshold: 0.0,
            current_level: 0.0,
            pump_on: false,
            auto_mode: false,
            last_update: None,
            received_at: None,
            show_received_at: false,
        }
    }

    /// The configuration for one of this reservoir's channels, if set.
    pub fn channel(&self, channel: Channel) -> Option<&TopicConfig> {
        match channel {
            Channel::Level => Some(&self.level),
            Channel::Pump => self.pump.as_ref(),
            Channel::Fill => self.fill.as_ref(),
            Channel::Mode => self.mode.as_ref(),
            Channel::Sensor => None,
        }
    }
}

/// Which logical aspect of an entity a topic feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// A sensor's telemetry value.
    Sensor,
    /// A reservoir's fill level.
    Level,
    /// A reservoir's pump state.
    Pump,
    /// A reservoir's fill trigger.
    Fill,
    /// A reservoir's auto/manual mode.
    Mode,
}

/// Reference to a registered entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityRef {
    Sensor(String),
    Reservoir(String),
}

impl EntityRef {
    pub fn id(&self) -> &str {
        match self {
            EntityRef::Sensor(id) | EntityRef::Reservoir(id) => id,
        }
    }
}

/// One point of an entity's bounded time series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,

    /// Only present when the owning entity enables the display option.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Utc>>,
}

/// Kinds of threshold alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertKind {
    LowThreshold,
    HighThreshold,
    LowLevel,
}

/// A threshold breach. Ephemeral and broadcast-only; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub kind: AlertKind,
    pub id: String,
    pub value: f64,
    pub threshold: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos_validation() {
        assert!(QosLevel::new(0).is_ok());
        assert!(QosLevel::new(2).is_ok());
        assert_eq!(QosLevel::new(3), Err(InvalidQos(3)));
    }

    #[test]
    fn test_qos_serde() {
        let qos: QosLevel = serde_json::from_str("1").unwrap();
        assert_eq!(qos, QosLevel::AT_LEAST_ONCE);
        assert_eq!(serde_json::to_string(&qos).unwrap(), "1");

        let bad: Result<QosLevel, _> = serde_json::from_str("7");
        assert!(bad.is_err());
    }

    #[test]
    fn test_envelope_format_names() {
        assert_eq!(
            serde_json::to_string(&EnvelopeFormat::Receive).unwrap(),
            "\"envelope-receive\""
        );
        assert_eq!(
            serde_json::to_string(&EnvelopeFormat::Plain).unwrap(),
            "\"raw\""
        );
        let auto: EnvelopeFormat = serde_json::from_str("\"auto\"").unwrap();
        assert_eq!(auto, EnvelopeFormat::Auto);
    }

    #[test]
    fn test_sensor_serde_round_trip() {
        let mut sensor = Sensor::new(
            "soil-1",
            "Soil moisture",
            TopicConfig::json(
                "greenhouse/soil/1",
                crate::path::PathExpr::parse("object.moisture").unwrap(),
            ),
        );
        sensor.min_threshold = Some(5.0);
        sensor.max_threshold = Some(38.0);

        let json = serde_json::to_string(&sensor).unwrap();
        assert!(json.contains("\"payloadMode\":\"json\""));
        assert!(json.contains("\"minThreshold\":5.0"));

        let back: Sensor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sensor);
    }

    #[test]
    fn test_alert_kind_names() {
        assert_eq!(
            serde_json::to_string(&AlertKind::LowThreshold).unwrap(),
            "\"low-threshold\""
        );
        assert_eq!(
            serde_json::to_string(&AlertKind::LowLevel).unwrap(),
            "\"low-level\""
        );
    }
}
