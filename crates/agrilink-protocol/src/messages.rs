//! Typed stream events pushed to live subscribers.
//!
//! Every observable mutation yields exactly one event. Payloads are
//! self-sufficient for rendering — id, value/level, status, timestamp and
//! the optional receive timestamp — so a dashboard never needs a follow-up
//! query to draw the update.

use agrilink_core::{Alert, SensorStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One event on the subscriber stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamEvent {
    /// A sensor accepted a new value.
    #[serde(rename_all = "camelCase")]
    SensorUpdate {
        id: String,
        value: f64,
        status: SensorStatus,
        timestamp: DateTime<Utc>,
        #[serde(skip_serializing_if = "Option::is_none")]
        received_at: Option<DateTime<Utc>>,
    },

    /// A reservoir accepted a new (clamped) fill level.
    #[serde(rename_all = "camelCase")]
    LevelUpdate {
        id: String,
        level: f64,
        timestamp: DateTime<Utc>,
        #[serde(skip_serializing_if = "Option::is_none")]
        received_at: Option<DateTime<Utc>>,
    },

    /// A threshold was breached.
    #[serde(rename_all = "camelCase")]
    Alert {
        #[serde(flatten)]
        alert: Alert,
    },

    /// A reservoir pump changed state.
    #[serde(rename_all = "camelCase")]
    PumpChanged {
        id: String,
        on: bool,
        timestamp: DateTime<Utc>,
    },

    /// A reservoir switched between automatic and manual mode.
    #[serde(rename_all = "camelCase")]
    ModeChanged {
        id: String,
        auto: bool,
        timestamp: DateTime<Utc>,
    },

    /// The transport connection to the broker came up or went down.
    #[serde(rename_all = "camelCase")]
    Connectivity {
        connected: bool,
        timestamp: DateTime<Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use agrilink_core::AlertKind;

    #[test]
    fn test_sensor_update_serialization() {
        let event = StreamEvent::SensorUpdate {
            id: "soil-1".to_string(),
            value: 21.5,
            status: SensorStatus::Online,
            timestamp: "2026-08-30T12:00:00Z".parse().unwrap(),
            received_at: None,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"sensor-update\""));
        assert!(json.contains("\"status\":\"online\""));
        // Absent receive timestamp is omitted, not null.
        assert!(!json.contains("receivedAt"));
    }

    #[test]
    fn test_alert_flattens_fields() {
        let event = StreamEvent::Alert {
            alert: Alert {
                kind: AlertKind::LowLevel,
                id: "tank-1".to_string(),
                value: 20.0,
                threshold: 25.0,
            },
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"alert\""));
        assert!(json.contains("\"kind\":\"low-level\""));
        assert!(json.contains("\"threshold\":25.0"));
    }

    #[test]
    fn test_event_round_trip() {
        let event = StreamEvent::PumpChanged {
            id: "tank-1".to_string(),
            on: true,
            timestamp: "2026-08-30T12:00:00Z".parse().unwrap(),
        };

        let json = serde_json::to_string(&event).unwrap();
        let back: StreamEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
