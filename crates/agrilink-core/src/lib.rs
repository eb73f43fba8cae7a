//! # agrilink-core
//!
//! Core data model and state store for the AgriLink telemetry pipeline.
//!
//! This crate provides:
//! - Entity types (Sensor, Reservoir, alerts, topic configuration)
//! - Restricted payload path expressions and extraction
//! - Value normalization (numeric, switch, mode)
//! - Topic routing tables
//! - Bounded per-entity history with windowed, decimated queries
//! - The station store that applies readings and evaluates thresholds
//!
//! This crate is intentionally runtime-agnostic and contains no async code;
//! the MQTT transport and broadcast fanout live in `agrilink-server`.

pub mod history;
pub mod model;
pub mod path;
pub mod router;
pub mod snapshot;
pub mod store;
pub mod value;

pub use history::{HistoryStore, Period, HISTORY_CAPACITY};
pub use model::*;
pub use path::{PathExpr, PathSyntaxError};
pub use router::TopicTable;
pub use snapshot::{SnapshotError, SnapshotStore, StationSnapshot};
pub use store::{ConfigError, StationStore, StoreEvent};
