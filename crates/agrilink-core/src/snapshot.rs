//! Snapshot persistence abstraction.
//!
//! The station never writes to disk itself; it emits full-state snapshots
//! to a [`SnapshotStore`] and consumes the last snapshot once at startup.
//! The on-disk format belongs to the implementation, which keeps this crate
//! storage-agnostic. All methods are synchronous; async wrappers live at
//! the server layer.

use crate::history::HistoryStore;
use crate::model::{Reservoir, Sensor};
use serde::{Deserialize, Serialize};

/// Full persistable state of the station.
///
/// Alerts are deliberately absent: they are ephemeral and broadcast-only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationSnapshot {
    pub sensors: Vec<Sensor>,
    pub reservoirs: Vec<Reservoir>,
    pub history: HistoryStore,
}

/// Errors that can occur during snapshot load/save.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("failed to read snapshot: {0}")]
    Read(String),
    #[error("failed to write snapshot: {0}")]
    Write(String),
    #[error("snapshot data is invalid: {0}")]
    InvalidData(String),
}

/// Abstract snapshot storage.
///
/// A save failure must never affect in-memory state or fanout; callers log
/// it and continue.
pub trait SnapshotStore: Send + Sync {
    /// Load the last snapshot, or `None` when none has been saved yet.
    fn load(&self) -> Result<Option<StationSnapshot>, SnapshotError>;

    /// Durably save a snapshot, replacing any previous one.
    fn save(&self, snapshot: &StationSnapshot) -> Result<(), SnapshotError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TopicConfig;
    use std::sync::RwLock;

    /// In-memory storage for testing.
    struct MemorySnapshotStore {
        data: RwLock<Option<String>>,
    }

    impl SnapshotStore for MemorySnapshotStore {
        fn load(&self) -> Result<Option<StationSnapshot>, SnapshotError> {
            let data = self.data.read().unwrap();
            match data.as_deref() {
                Some(json) => serde_json::from_str(json)
                    .map(Some)
                    .map_err(|e| SnapshotError::InvalidData(e.to_string())),
                None => Ok(None),
            }
        }

        fn save(&self, snapshot: &StationSnapshot) -> Result<(), SnapshotError> {
            let json = serde_json::to_string(snapshot)
                .map_err(|e| SnapshotError::Write(e.to_string()))?;
            *self.data.write().unwrap() = Some(json);
            Ok(())
        }
    }

    #[test]
    fn test_snapshot_round_trip() {
        let store = MemorySnapshotStore {
            data: RwLock::new(None),
        };

        assert!(store.load().unwrap().is_none());

        let snapshot = StationSnapshot {
            sensors: vec![Sensor::new("s1", "Soil", TopicConfig::raw("farm/soil"))],
            reservoirs: vec![],
            history: HistoryStore::new(),
        };

        store.save(&snapshot).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.sensors.len(), 1);
        assert_eq!(loaded.sensors[0].id, "s1");
    }
}
