//! Snapshot persistence on the local filesystem.

use std::io::ErrorKind;
use std::path::PathBuf;

use agrilink_core::{SnapshotError, SnapshotStore, StationSnapshot};
use tracing::debug;

/// Stores the station snapshot as a single JSON file.
///
/// Writes go to a sibling temp file first and are moved into place with a
/// rename, so a crash mid-write leaves the previous snapshot intact.
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self) -> Result<Option<StationSnapshot>, SnapshotError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SnapshotError::Read(e.to_string())),
        };

        let snapshot: StationSnapshot = serde_json::from_str(&text)
            .map_err(|e| SnapshotError::InvalidData(e.to_string()))?;

        debug!(path = %self.path.display(), "Loaded station snapshot");
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &StationSnapshot) -> Result<(), SnapshotError> {
        let text = serde_json::to_string_pretty(snapshot)
            .map_err(|e| SnapshotError::Write(e.to_string()))?;

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, text).map_err(|e| SnapshotError::Write(e.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| SnapshotError::Write(e.to_string()))?;

        debug!(path = %self.path.display(), "Saved station snapshot");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agrilink_core::{Sensor, TopicConfig};

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("agrilink-{}-{}.json", name, std::process::id()))
    }

    #[test]
    fn test_load_missing_file_is_none() {
        let store = FileSnapshotStore::new(temp_path("missing"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let path = temp_path("roundtrip");
        let store = FileSnapshotStore::new(&path);

        let mut snapshot = StationSnapshot::default();
        snapshot.sensors.push(Sensor::new(
            "soil-1",
            "Soil moisture",
            TopicConfig::raw("farm/soil/1"),
        ));

        store.save(&snapshot).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.sensors.len(), 1);
        assert_eq!(loaded.sensors[0].id, "soil-1");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_load_rejects_corrupt_data() {
        let path = temp_path("corrupt");
        std::fs::write(&path, "{ not json").unwrap();

        let store = FileSnapshotStore::new(&path);
        assert!(matches!(
            store.load(),
            Err(SnapshotError::InvalidData(_))
        ));

        let _ = std::fs::remove_file(&path);
    }
}
