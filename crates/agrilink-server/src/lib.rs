//! # agrilink-server
//!
//! The asynchronous half of the AgriLink pipeline:
//! - [`server::StationServer`] — owns the station store, applies inbound
//!   messages to completion one at a time and fans events out to
//!   subscribers over a broadcast channel
//! - [`mqtt::MqttTransport`] — rumqttc-based broker connection with fixed
//!   backoff reconnect and explicit subscription reconciliation
//! - [`persist::FileSnapshotStore`] — JSON file snapshot storage

pub mod mqtt;
pub mod persist;
pub mod server;

pub use mqtt::{MqttSettings, MqttTransport, TransportCommand};
pub use persist::FileSnapshotStore;
pub use server::{DispatchError, StationEvent, StationHandle, StationServer};
