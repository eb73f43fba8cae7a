//! MQTT transport.
//!
//! One connection to the broker carries every entity topic. The transport
//! reconnects automatically with a fixed backoff; on every (re)connect it
//! re-subscribes the full desired topic set at the configured QoS.
//! Messages arriving while disconnected are lost, not retried.
//!
//! Subscription changes go through an explicit reconciliation step: the
//! server pushes the desired (topic, QoS) set after every configuration
//! change and the transport diffs it against what is actually subscribed.
//! Unsubscribes and subscribes are issued sequentially on this task, which
//! serializes them per connection.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use agrilink_core::QosLevel;

use crate::server::StationEvent;

/// Requests the server sends to the transport.
#[derive(Debug, Clone)]
pub enum TransportCommand {
    /// Publish an encoded command payload.
    Publish {
        topic: String,
        payload: String,
        qos: QosLevel,
    },
    /// Replace the desired subscription set.
    Reconcile { desired: Vec<(String, QosLevel)> },
}

/// Broker connection settings.
#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: String,
    pub password: String,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay: Duration,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "agrilink-station".to_string(),
            username: String::new(),
            password: String::new(),
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

/// The MQTT transport task.
pub struct MqttTransport {
    settings: MqttSettings,
    events: mpsc::Sender<StationEvent>,
    commands: mpsc::Receiver<TransportCommand>,
    /// What the server wants subscribed.
    desired: HashMap<String, QosLevel>,
    /// What this connection currently has subscribed.
    subscribed: HashMap<String, QosLevel>,
}

impl MqttTransport {
    pub fn new(
        settings: MqttSettings,
        events: mpsc::Sender<StationEvent>,
        commands: mpsc::Receiver<TransportCommand>,
    ) -> Self {
        Self {
            settings,
            events,
            commands,
            desired: HashMap::new(),
            subscribed: HashMap::new(),
        }
    }

    /// Run the connect/reconnect loop until the command channel closes.
    pub async fn run(mut self) {
        loop {
            info!(
                "Connecting to MQTT broker at {}:{}...",
                self.settings.host, self.settings.port
            );

            let mut options = MqttOptions::new(
                &self.settings.client_id,
                &self.settings.host,
                self.settings.port,
            );
            options.set_keep_alive(Duration::from_secs(10));
            options.set_clean_session(true);
            if !self.settings.username.is_empty() {
                options.set_credentials(&self.settings.username, &self.settings.password);
            }

            let (client, mut eventloop) = AsyncClient::new(options, 64);
            let mut connected = false;

            loop {
                tokio::select! {
                    polled = eventloop.poll() => match polled {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            info!("Connected to MQTT broker");
                            connected = true;
                            self.notify_connectivity(true).await;
                            self.resubscribe_all(&client).await;
                        }
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            let event = StationEvent::Message {
                                topic: publish.topic.clone(),
                                payload: publish.payload.to_vec(),
                                received_at: Utc::now(),
                            };
                            if self.events.send(event).await.is_err() {
                                info!("Server gone, stopping transport");
                                return;
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!("MQTT event loop error: {e}");
                            break;
                        }
                    },
                    command = self.commands.recv() => match command {
                        Some(TransportCommand::Publish { topic, payload, qos }) => {
                            debug!(topic, "Publishing command payload");
                            if let Err(e) = client
                                .publish(&topic, to_qos(qos), false, payload)
                                .await
                            {
                                error!("Failed to publish to '{topic}': {e}");
                            }
                        }
                        Some(TransportCommand::Reconcile { desired }) => {
                            self.desired = desired.into_iter().collect();
                            if connected {
                                self.apply_reconcile(&client).await;
                            }
                        }
                        None => {
                            info!("Command channel closed, stopping transport");
                            return;
                        }
                    }
                }
            }

            if connected {
                self.notify_connectivity(false).await;
            }
            self.subscribed.clear();

            warn!(
                "Lost connection to MQTT broker, retrying in {:?}",
                self.settings.reconnect_delay
            );
            tokio::time::sleep(self.settings.reconnect_delay).await;
        }
    }

    /// Subscribe the full desired set on a fresh connection.
    async fn resubscribe_all(&mut self, client: &AsyncClient) {
        for (topic, qos) in &self.desired {
            match client.subscribe(topic, to_qos(*qos)).await {
                Ok(()) => {
                    self.subscribed.insert(topic.clone(), *qos);
                }
                Err(e) => error!("Failed to subscribe to '{topic}': {e}"),
            }
        }
        info!("Subscribed to {} topic(s)", self.subscribed.len());
    }

    /// Diff desired against actual and issue the difference.
    async fn apply_reconcile(&mut self, client: &AsyncClient) {
        let (unsubscribe, subscribe) = reconcile_plan(&self.subscribed, &self.desired);

        for topic in unsubscribe {
            debug!(topic, "Unsubscribing");
            if let Err(e) = client.unsubscribe(&topic).await {
                error!("Failed to unsubscribe from '{topic}': {e}");
            }
            self.subscribed.remove(&topic);
        }

        for (topic, qos) in subscribe {
            debug!(topic, qos = qos.value(), "Subscribing");
            match client.subscribe(&topic, to_qos(qos)).await {
                Ok(()) => {
                    self.subscribed.insert(topic, qos);
                }
                Err(e) => error!("Failed to subscribe to '{topic}': {e}"),
            }
        }
    }

    async fn notify_connectivity(&self, connected: bool) {
        let _ = self
            .events
            .send(StationEvent::Connectivity { connected })
            .await;
    }
}

/// Compute the (unsubscribe, subscribe) sets turning `actual` into
/// `desired`. A QoS change resubscribes the same topic; the broker
/// overrides the previous grant.
fn reconcile_plan(
    actual: &HashMap<String, QosLevel>,
    desired: &HashMap<String, QosLevel>,
) -> (Vec<String>, Vec<(String, QosLevel)>) {
    let unsubscribe: Vec<String> = actual
        .keys()
        .filter(|topic| !desired.contains_key(*topic))
        .cloned()
        .collect();

    let subscribe: Vec<(String, QosLevel)> = desired
        .iter()
        .filter(|(topic, qos)| actual.get(*topic) != Some(qos))
        .map(|(topic, qos)| (topic.clone(), *qos))
        .collect();

    (unsubscribe, subscribe)
}

fn to_qos(qos: QosLevel) -> QoS {
    match qos.value() {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::ExactlyOnce,
    }
}
