//! Station server.
//!
//! The server owns the station store behind a single lock and processes
//! inbound transport events on one task, each message to completion before
//! the next. Broadcast and persistence are side effects that never block
//! routing: fanout goes through a `tokio::sync::broadcast` channel (lagging
//! subscribers miss events, no replay), and snapshots are written by a
//! separate timer task.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, error, info, warn};

use agrilink_core::{
    value, Channel, ConfigError, EntityRef, HistoryPoint, PayloadMode, Period, Reservoir, Sensor,
    SnapshotStore, StationSnapshot, StationStore, StoreEvent, TopicConfig,
};
use agrilink_protocol::{
    encode_command, unwrap_payload, Command, CommandError, Document, EnvelopeError, StreamEvent,
};

use crate::mqtt::TransportCommand;

/// Events that can be sent to the server by the transport.
#[derive(Debug, Clone)]
pub enum StationEvent {
    /// A message arrived on a subscribed topic.
    Message {
        topic: String,
        payload: Vec<u8>,
        received_at: DateTime<Utc>,
    },
    /// The broker connection came up or went down.
    Connectivity { connected: bool },
}

/// Errors returned by explicit actuation requests.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("unknown reservoir '{0}'")]
    UnknownReservoir(String),
    #[error("channel {0:?} is not configured on reservoir '{1}'")]
    ChannelNotConfigured(Channel, String),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("transport is unavailable")]
    TransportClosed,
}

/// Per-message ingestion failures. Logged and dropped, never fatal.
#[derive(Debug, thiserror::Error)]
enum IngestError {
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    #[error("path expression yielded no value")]
    Absent,
    #[error("value is not numeric")]
    NotNumeric,
    #[error("value is not a switch state")]
    NotSwitch,
}

/// Cloneable handle for API collaborators: registration, actuation,
/// history queries and event subscription.
#[derive(Clone)]
pub struct StationHandle {
    store: Arc<RwLock<StationStore>>,
    event_tx: mpsc::Sender<StationEvent>,
    stream_tx: broadcast::Sender<StreamEvent>,
    transport_tx: mpsc::Sender<TransportCommand>,
}

impl StationHandle {
    /// Create or replace a sensor; reconciles live subscriptions.
    pub async fn upsert_sensor(&self, sensor: Sensor) -> Result<(), ConfigError> {
        {
            let mut store = self.store.write().await;
            store.upsert_sensor(sensor)?;
        }
        self.reconcile().await;
        Ok(())
    }

    /// Create or replace a reservoir; reconciles live subscriptions.
    pub async fn upsert_reservoir(&self, reservoir: Reservoir) -> Result<(), ConfigError> {
        {
            let mut store = self.store.write().await;
            store.upsert_reservoir(reservoir)?;
        }
        self.reconcile().await;
        Ok(())
    }

    /// Delete a sensor, its history and its topic bindings.
    pub async fn remove_sensor(&self, id: &str) -> Result<(), ConfigError> {
        {
            let mut store = self.store.write().await;
            store.remove_sensor(id)?;
        }
        self.reconcile().await;
        Ok(())
    }

    /// Delete a reservoir, its history and its topic bindings.
    pub async fn remove_reservoir(&self, id: &str) -> Result<(), ConfigError> {
        {
            let mut store = self.store.write().await;
            store.remove_reservoir(id)?;
        }
        self.reconcile().await;
        Ok(())
    }

    /// Encode and publish an actuation command on a reservoir channel.
    pub async fn send_command(
        &self,
        reservoir_id: &str,
        channel: Channel,
        command: Command,
    ) -> Result<(), DispatchError> {
        let (topic, encoded) = {
            let store = self.store.read().await;
            let reservoir = store
                .reservoir(reservoir_id)
                .ok_or_else(|| DispatchError::UnknownReservoir(reservoir_id.to_string()))?;
            let config = reservoir.channel(channel).ok_or(
                DispatchError::ChannelNotConfigured(channel, reservoir_id.to_string()),
            )?;
            (config.topic.clone(), encode_command(&command, config)?)
        };

        self.transport_tx
            .send(TransportCommand::Publish {
                topic,
                payload: encoded.payload,
                qos: encoded.qos,
            })
            .await
            .map_err(|_| DispatchError::TransportClosed)
    }

    /// Subscribe to the live event stream. No replay for late subscribers.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.stream_tx.subscribe()
    }

    /// Sender the transport uses to inject messages and connectivity.
    pub fn event_sender(&self) -> mpsc::Sender<StationEvent> {
        self.event_tx.clone()
    }

    /// Windowed, decimated history query.
    pub async fn query_history(
        &self,
        entity_id: &str,
        period: Period,
        max_points: usize,
    ) -> Vec<HistoryPoint> {
        let store = self.store.read().await;
        store.query_history(entity_id, period, max_points, Utc::now())
    }

    pub async fn sensor(&self, id: &str) -> Option<Sensor> {
        self.store.read().await.sensor(id).cloned()
    }

    pub async fn reservoir(&self, id: &str) -> Option<Reservoir> {
        self.store.read().await.reservoir(id).cloned()
    }

    /// Capture the full persistable state.
    pub async fn snapshot(&self) -> StationSnapshot {
        self.store.read().await.snapshot()
    }

    /// Push the current desired subscription set to the transport.
    async fn reconcile(&self) {
        let desired = self.store.read().await.desired_subscriptions();
        if self
            .transport_tx
            .send(TransportCommand::Reconcile { desired })
            .await
            .is_err()
        {
            warn!("Transport command channel closed; subscriptions not reconciled");
        }
    }
}

/// The station server. Create it, keep a [`StationHandle`], then `run()` it.
pub struct StationServer {
    handle: StationHandle,
    event_rx: mpsc::Receiver<StationEvent>,
    snapshots: Option<Arc<dyn SnapshotStore>>,
    snapshot_interval: Duration,
}

impl StationServer {
    /// Create a new server.
    ///
    /// `transport_tx` carries publish/reconcile requests to the MQTT
    /// transport; `snapshots`, when given, is loaded once at startup and
    /// saved on a fixed interval.
    pub fn new(
        transport_tx: mpsc::Sender<TransportCommand>,
        snapshots: Option<Arc<dyn SnapshotStore>>,
        snapshot_interval: Duration,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(1024);
        let (stream_tx, _) = broadcast::channel(1024);

        Self {
            handle: StationHandle {
                store: Arc::new(RwLock::new(StationStore::new())),
                event_tx,
                stream_tx,
                transport_tx,
            },
            event_rx,
            snapshots,
            snapshot_interval,
        }
    }

    pub fn handle(&self) -> StationHandle {
        self.handle.clone()
    }

    /// Run the server until the transport side closes the event channel.
    pub async fn run(mut self) {
        if let Some(snapshots) = &self.snapshots {
            match snapshots.load() {
                Ok(Some(snapshot)) => {
                    let sensors = snapshot.sensors.len();
                    let reservoirs = snapshot.reservoirs.len();
                    self.handle.store.write().await.restore(snapshot);
                    info!(sensors, reservoirs, "Restored station state from snapshot");
                }
                Ok(None) => info!("No snapshot found, starting with an empty station"),
                Err(e) => warn!("Failed to load snapshot, starting empty: {e}"),
            }
        }

        // Subscribe everything the restored entities reference.
        self.handle.reconcile().await;

        if let Some(snapshots) = self.snapshots.clone() {
            let store = self.handle.store.clone();
            let interval = self.snapshot_interval;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                ticker.tick().await; // first tick fires immediately
                loop {
                    ticker.tick().await;
                    let snapshot = store.read().await.snapshot();
                    if let Err(e) = snapshots.save(&snapshot) {
                        // Live state and fanout are unaffected by a failed save.
                        error!("Snapshot save failed: {e}");
                    }
                }
            });
        }

        while let Some(event) = self.event_rx.recv().await {
            match event {
                StationEvent::Message {
                    topic,
                    payload,
                    received_at,
                } => {
                    self.handle_message(&topic, &payload, received_at).await;
                }
                StationEvent::Connectivity { connected } => {
                    if connected {
                        info!("Broker connection established");
                    } else {
                        warn!("Broker connection lost");
                    }
                    self.broadcast(StreamEvent::Connectivity {
                        connected,
                        timestamp: Utc::now(),
                    });
                }
            }
        }

        info!("Event channel closed, station server stopping");
    }

    /// Route one inbound message to every matching (entity, channel) target
    /// and apply it. Runs to completion before the next message is taken.
    async fn handle_message(&self, topic: &str, payload: &[u8], received_at: DateTime<Utc>) {
        let text = String::from_utf8_lossy(payload).into_owned();
        let mut store = self.handle.store.write().await;

        let targets: Vec<(EntityRef, Channel)> = store.resolve(topic).to_vec();
        if targets.is_empty() {
            debug!(topic, "No entity subscribed to topic, dropping message");
            return;
        }

        let now = Utc::now();
        for (entity, channel) in targets {
            let Some(config) = store.topic_config(&entity, channel).cloned() else {
                continue;
            };
            match ingest_target(&mut store, &entity, channel, &config, &text, now, received_at)
            {
                Ok(events) => {
                    for event in events {
                        self.broadcast(to_stream_event(event));
                    }
                }
                Err(e) => {
                    debug!(
                        topic,
                        entity = entity.id(),
                        ?channel,
                        "Dropping message: {e}"
                    );
                }
            }
        }
    }

    fn broadcast(&self, event: StreamEvent) {
        // Send fails only when no subscriber is connected; that is fine.
        let _ = self.handle.stream_tx.send(event);
    }
}

/// Normalize and apply one message for one (entity, channel) target.
fn ingest_target(
    store: &mut StationStore,
    entity: &EntityRef,
    channel: Channel,
    config: &TopicConfig,
    text: &str,
    now: DateTime<Utc>,
    received_at: DateTime<Utc>,
) -> Result<Vec<StoreEvent>, IngestError> {
    let value = extract_value(config, text)?;
    let received_at = Some(received_at);

    let events = match (entity, channel) {
        (EntityRef::Sensor(id), Channel::Sensor) => {
            let v = value::as_number(&value).ok_or(IngestError::NotNumeric)?;
            store.apply_sensor_value(id, v, now, received_at)
        }
        (EntityRef::Reservoir(id), Channel::Level) => {
            let v = value::as_number(&value).ok_or(IngestError::NotNumeric)?;
            store.apply_reservoir_level(id, v, now, received_at)
        }
        (EntityRef::Reservoir(id), Channel::Pump) => {
            let on = value::as_switch(&value).ok_or(IngestError::NotSwitch)?;
            store.apply_pump_state(id, on, now)
        }
        (EntityRef::Reservoir(id), Channel::Mode) => {
            let auto = value::as_mode(&value);
            store.apply_mode(id, auto, now)
        }
        (EntityRef::Reservoir(_), Channel::Fill) => {
            // Fill is trigger-only; inbound traffic carries no state.
            debug!("Ignoring message on fill trigger topic");
            Ok(Vec::new())
        }
        _ => Ok(Vec::new()),
    };

    // Routing guarantees the entity exists; a racing delete just drops.
    Ok(events.unwrap_or_default())
}

/// Decode the payload per the topic configuration and pull out the value.
fn extract_value(config: &TopicConfig, text: &str) -> Result<serde_json::Value, IngestError> {
    match config.payload_mode {
        PayloadMode::Raw => Ok(serde_json::Value::String(text.to_string())),
        PayloadMode::Json => match unwrap_payload(text, config.envelope)? {
            // Send-envelope data may decode to bare text; it is the value.
            Document::Text(inner) => Ok(serde_json::Value::String(inner)),
            Document::Json(doc) => match &config.path {
                Some(path) => path.extract(&doc).cloned().ok_or(IngestError::Absent),
                None => Ok(doc),
            },
        },
    }
}

fn to_stream_event(event: StoreEvent) -> StreamEvent {
    match event {
        StoreEvent::SensorUpdated {
            id,
            value,
            status,
            timestamp,
            received_at,
        } => StreamEvent::SensorUpdate {
            id,
            value,
            status,
            timestamp,
            received_at,
        },
        StoreEvent::LevelUpdated {
            id,
            level,
            timestamp,
            received_at,
        } => StreamEvent::LevelUpdate {
            id,
            level,
            timestamp,
            received_at,
        },
        StoreEvent::Alerted(alert) => StreamEvent::Alert { alert },
        StoreEvent::PumpChanged { id, on, timestamp } => {
            StreamEvent::PumpChanged { id, on, timestamp }
        }
        StoreEvent::ModeChanged {
            id,
            auto,
            timestamp,
        } => StreamEvent::ModeChanged {
            id,
            auto,
            timestamp,
        },
    }
}
