//! Station state store.
//!
//! The store is the single owner of all mutable station state: sensors,
//! reservoirs, their bounded history and the derived topic table. Every
//! other component (transport callback, API handlers, the snapshot timer)
//! is a client issuing mutation requests; none of them share memory with
//! the store directly.
//!
//! Each `apply_*` operation mutates state, evaluates thresholds and returns
//! the events the mutation produced, for the caller to broadcast.

use crate::history::{HistoryStore, Period};
use crate::model::{
    Alert, AlertKind, Channel, EntityRef, HistoryPoint, PayloadMode, Reservoir, Sensor,
    SensorStatus, TopicConfig,
};
use crate::path::PathSyntaxError;
use crate::router::TopicTable;
use crate::snapshot::StationSnapshot;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Registration-time configuration errors.
///
/// These are the only synchronous, caller-visible errors in the pipeline;
/// nothing at message time is fatal.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid path expression: {0}")]
    Path(#[from] PathSyntaxError),
    #[error("payload mode 'json' requires a path expression on topic '{0}'")]
    MissingPath(String),
    #[error("command topic '{0}' does not support indexed path expressions")]
    IndexedCommandPath(String),
    #[error("unknown entity '{0}'")]
    UnknownEntity(String),
}

/// An observable mutation produced by the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    SensorUpdated {
        id: String,
        value: f64,
        status: SensorStatus,
        timestamp: DateTime<Utc>,
        received_at: Option<DateTime<Utc>>,
    },
    LevelUpdated {
        id: String,
        level: f64,
        timestamp: DateTime<Utc>,
        received_at: Option<DateTime<Utc>>,
    },
    Alerted(Alert),
    PumpChanged {
        id: String,
        on: bool,
        timestamp: DateTime<Utc>,
    },
    ModeChanged {
        id: String,
        auto: bool,
        timestamp: DateTime<Utc>,
    },
}

/// The owned station state.
#[derive(Debug, Clone, Default)]
pub struct StationStore {
    sensors: HashMap<String, Sensor>,
    reservoirs: HashMap<String, Reservoir>,
    history: HistoryStore,
    table: TopicTable,
}

impl StationStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Create or replace a sensor, rebuilding the topic table.
    pub fn upsert_sensor(&mut self, sensor: Sensor) -> Result<(), ConfigError> {
        validate_topic(&sensor.input)?;
        self.sensors.insert(sensor.id.clone(), sensor);
        self.rebuild_table();
        Ok(())
    }

    /// Create or replace a reservoir, rebuilding the topic table.
    pub fn upsert_reservoir(&mut self, reservoir: Reservoir) -> Result<(), ConfigError> {
        validate_topic(&reservoir.level)?;
        for config in [&reservoir.pump, &reservoir.fill, &reservoir.mode]
            .into_iter()
            .flatten()
        {
            validate_topic(config)?;
            validate_command_topic(config)?;
        }
        self.reservoirs.insert(reservoir.id.clone(), reservoir);
        self.rebuild_table();
        Ok(())
    }

    /// Delete a sensor together with its history and topic bindings.
    pub fn remove_sensor(&mut self, id: &str) -> Result<(), ConfigError> {
        self.sensors
            .remove(id)
            .ok_or_else(|| ConfigError::UnknownEntity(id.to_string()))?;
        self.history.remove(id);
        self.rebuild_table();
        Ok(())
    }

    /// Delete a reservoir together with its history and topic bindings.
    pub fn remove_reservoir(&mut self, id: &str) -> Result<(), ConfigError> {
        self.reservoirs
            .remove(id)
            .ok_or_else(|| ConfigError::UnknownEntity(id.to_string()))?;
        self.history.remove(id);
        self.rebuild_table();
        Ok(())
    }

    fn rebuild_table(&mut self) {
        self.table = TopicTable::rebuild(self.sensors.values(), self.reservoirs.values());
    }

    // ========================================================================
    // Ingestion
    // ========================================================================

    /// Apply an accepted sensor value.
    ///
    /// Sets value, `last_update` and status, evaluates thresholds (min
    /// before max, at most one alert) and appends a history point.
    pub fn apply_sensor_value(
        &mut self,
        id: &str,
        value: f64,
        now: DateTime<Utc>,
        received_at: Option<DateTime<Utc>>,
    ) -> Result<Vec<StoreEvent>, ConfigError> {
        let sensor = self
            .sensors
            .get_mut(id)
            .ok_or_else(|| ConfigError::UnknownEntity(id.to_string()))?;

        sensor.value = Some(value);
        sensor.last_update = Some(now);
        sensor.received_at = received_at;

        let mut alert = None;
        if let Some(min) = sensor.min_threshold {
            if value < min {
                alert = Some(Alert {
                    kind: AlertKind::LowThreshold,
                    id: id.to_string(),
                    value,
                    threshold: min,
                });
            }
        }
        if alert.is_none() {
            if let Some(max) = sensor.max_threshold {
                if value > max {
                    alert = Some(Alert {
                        kind: AlertKind::HighThreshold,
                        id: id.to_string(),
                        value,
                        threshold: max,
                    });
                }
            }
        }

        sensor.status = if alert.is_some() {
            SensorStatus::Warning
        } else {
            SensorStatus::Online
        };

        let point_received_at = sensor.show_received_at.then_some(received_at).flatten();
        let status = sensor.status;
        self.history.append(
            id,
            HistoryPoint {
                timestamp: now,
                value,
                received_at: point_received_at,
            },
        );

        let mut events = vec![StoreEvent::SensorUpdated {
            id: id.to_string(),
            value,
            status,
            timestamp: now,
            received_at,
        }];
        if let Some(alert) = alert {
            events.push(StoreEvent::Alerted(alert));
        }
        Ok(events)
    }

    /// Apply an accepted reservoir level reading.
    ///
    /// The level is clamped to 0..=100 before the low-level comparison.
    pub fn apply_reservoir_level(
        &mut self,
        id: &str,
        level: f64,
        now: DateTime<Utc>,
        received_at: Option<DateTime<Utc>>,
    ) -> Result<Vec<StoreEvent>, ConfigError> {
        let reservoir = self
            .reservoirs
            .get_mut(id)
            .ok_or_else(|| ConfigError::UnknownEntity(id.to_string()))?;

        let level = level.clamp(0.0, 100.0);
        reservoir.current_level = level;
        reservoir.last_update = Some(now);
        reservoir.received_at = received_at;

        let alert = (level <= reservoir.low_threshold).then(|| Alert {
            kind: AlertKind::LowLevel,
            id: id.to_string(),
            value: level,
            threshold: reservoir.low_threshold,
        });

        let point_received_at = reservoir.show_received_at.then_some(received_at).flatten();
        self.history.append(
            id,
            HistoryPoint {
                timestamp: now,
                value: level,
                received_at: point_received_at,
            },
        );

        let mut events = vec![StoreEvent::LevelUpdated {
            id: id.to_string(),
            level,
            timestamp: now,
            received_at,
        }];
        if let Some(alert) = alert {
            events.push(StoreEvent::Alerted(alert));
        }
        Ok(events)
    }

    /// Apply a pump state report. No threshold logic, no history.
    pub fn apply_pump_state(
        &mut self,
        id: &str,
        on: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<StoreEvent>, ConfigError> {
        let reservoir = self
            .reservoirs
            .get_mut(id)
            .ok_or_else(|| ConfigError::UnknownEntity(id.to_string()))?;

        reservoir.pump_on = on;
        reservoir.last_update = Some(now);

        Ok(vec![StoreEvent::PumpChanged {
            id: id.to_string(),
            on,
            timestamp: now,
        }])
    }

    /// Apply a mode report. Anything that is not auto is manual.
    pub fn apply_mode(
        &mut self,
        id: &str,
        auto: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<StoreEvent>, ConfigError> {
        let reservoir = self
            .reservoirs
            .get_mut(id)
            .ok_or_else(|| ConfigError::UnknownEntity(id.to_string()))?;

        reservoir.auto_mode = auto;
        reservoir.last_update = Some(now);

        Ok(vec![StoreEvent::ModeChanged {
            id: id.to_string(),
            auto,
            timestamp: now,
        }])
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Route a topic to every (entity, channel) pair listening on it.
    pub fn resolve(&self, topic: &str) -> &[(EntityRef, Channel)] {
        self.table.resolve(topic)
    }

    /// The topic configuration an (entity, channel) pair ingests with.
    pub fn topic_config(&self, entity: &EntityRef, channel: Channel) -> Option<&TopicConfig> {
        match entity {
            EntityRef::Sensor(id) => self.sensors.get(id).map(|s| &s.input),
            EntityRef::Reservoir(id) => self
                .reservoirs
                .get(id)
                .and_then(|r| r.channel(channel)),
        }
    }

    /// The (topic, QoS) set the transport should hold subscribed.
    pub fn desired_subscriptions(&self) -> Vec<(String, crate::model::QosLevel)> {
        self.table.desired_subscriptions()
    }

    pub fn sensor(&self, id: &str) -> Option<&Sensor> {
        self.sensors.get(id)
    }

    pub fn reservoir(&self, id: &str) -> Option<&Reservoir> {
        self.reservoirs.get(id)
    }

    pub fn sensors(&self) -> impl Iterator<Item = &Sensor> {
        self.sensors.values()
    }

    pub fn reservoirs(&self) -> impl Iterator<Item = &Reservoir> {
        self.reservoirs.values()
    }

    /// Windowed, decimated history query for one entity.
    pub fn query_history(
        &self,
        entity_id: &str,
        period: Period,
        max_points: usize,
        now: DateTime<Utc>,
    ) -> Vec<HistoryPoint> {
        self.history.query(entity_id, period, max_points, now)
    }

    pub fn history_len(&self, entity_id: &str) -> usize {
        self.history.len(entity_id)
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Capture the full persistable state.
    pub fn snapshot(&self) -> StationSnapshot {
        StationSnapshot {
            sensors: self.sensors.values().cloned().collect(),
            reservoirs: self.reservoirs.values().cloned().collect(),
            history: self.history.clone(),
        }
    }

    /// Replace all state from a snapshot, rebuilding the topic table.
    pub fn restore(&mut self, snapshot: StationSnapshot) {
        self.sensors = snapshot
            .sensors
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();
        self.reservoirs = snapshot
            .reservoirs
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();
        self.history = snapshot.history;
        self.rebuild_table();
    }
}

fn validate_topic(config: &TopicConfig) -> Result<(), ConfigError> {
    if config.payload_mode == PayloadMode::Json && config.path.is_none() {
        return Err(ConfigError::MissingPath(config.topic.clone()));
    }
    Ok(())
}

fn validate_command_topic(config: &TopicConfig) -> Result<(), ConfigError> {
    if let Some(path) = &config.path {
        if path.has_index() {
            return Err(ConfigError::IndexedCommandPath(config.topic.clone()));
        }
    }
    Ok(())
}
