//! File-backed persistence of the last-known-good snapshot.
//!
//! This module provides the [`JsonCacheStore`] for keeping the calendar
//! available offline between runs. Snapshots are serialized to JSON and
//! replaced atomically.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{error, info, warn};
use tokio::fs;

use crate::cache::{CachePersistence, CacheSnapshot, PersistenceError, SCHEMA_VERSION};

/// Handles loading and persisting the snapshot to disk.
///
/// Loading is fault-tolerant: a missing, unreadable or corrupted file yields
/// no snapshot rather than an error. Saving writes a temporary sibling file
/// first and renames it over the current one, so a crash mid-write leaves the
/// previous snapshot intact.
///
/// # Examples
///
/// ```no_run
/// # use fxnews::cache::{CachePersistence, CacheSnapshot, JsonCacheStore, PersistenceError};
/// # async fn example(new_snapshot: CacheSnapshot) -> Result<(), PersistenceError> {
/// let store = JsonCacheStore::new("data/latest_calendar.json");
///
/// // Load the previous snapshot, if any
/// let snapshot = store.load().await;
///
/// // Later, persist a new one
/// store.save(&new_snapshot).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct JsonCacheStore {
    /// Path to the JSON file holding the current snapshot.
    path: PathBuf,
}

impl JsonCacheStore {
    /// Creates a new `JsonCacheStore` for the specified file path.
    ///
    /// # Arguments
    ///
    /// * `path` - The file the snapshot is loaded from and saved to
    pub fn new(path: impl AsRef<Path>) -> Self {
        JsonCacheStore {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the temporary file used while saving.
    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension("tmp")
    }
}

#[async_trait]
impl CachePersistence for JsonCacheStore {
    /// Loads the snapshot from disk.
    ///
    /// # Error Handling
    ///
    /// - If the file doesn't exist: logs a warning and returns `None`
    /// - If deserialization fails: logs an error and returns `None`
    /// - If the schema version differs: logs an error and returns `None`
    ///
    /// This ensures the engine can always start, even with corrupted cache data.
    async fn load(&self) -> Option<CacheSnapshot> {
        let Ok(serialized_snapshot) = fs::read_to_string(&self.path).await else {
            warn!(
                "no cached calendar found at {}, starting with an empty cache",
                self.path.display()
            );
            return None;
        };

        let snapshot: CacheSnapshot = match serde_json::from_str(&serialized_snapshot) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(
                    "failed to deserialize cached calendar, starting with an empty cache: {}",
                    e
                );
                return None;
            }
        };

        if snapshot.schema_version != SCHEMA_VERSION {
            error!(
                "cached calendar has schema version {} (expected {}), ignoring it",
                snapshot.schema_version, SCHEMA_VERSION
            );
            return None;
        }

        info!("loaded cached calendar {}", snapshot);

        Some(snapshot)
    }

    /// Persists the snapshot to disk atomically.
    ///
    /// # Errors
    ///
    /// Returns a [`PersistenceError`] if serialization, the temporary write or
    /// the final rename fails. The previous file is left untouched in all of
    /// these cases.
    async fn save(&self, snapshot: &CacheSnapshot) -> Result<(), PersistenceError> {
        let serialized_snapshot = serde_json::to_string_pretty(snapshot)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let tmp_path = self.tmp_path();
        fs::write(&tmp_path, &serialized_snapshot).await?;
        fs::rename(&tmp_path, &self.path).await?;

        info!("persisted calendar snapshot {}", snapshot);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::clock_event;
    use chrono::{TimeZone, Utc};
    use tempfile::{NamedTempFile, TempDir};

    fn create_test_snapshot() -> CacheSnapshot {
        let at = Utc.with_ymd_and_hms(2025, 10, 1, 12, 30, 0).unwrap();
        CacheSnapshot::new(
            Utc.with_ymd_and_hms(2025, 10, 1, 9, 0, 0).unwrap(),
            "http://calendar.server/feed.json",
            vec![clock_event("GDP", "USD", at), clock_event("CPI", "EUR", at)],
        )
    }

    #[tokio::test]
    async fn test_load_nonexistent_file_returns_none() {
        let store = JsonCacheStore::new("nonexistent_calendar.json");
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn test_save_and_load_snapshot() {
        let temp_file = NamedTempFile::new().unwrap();
        let store = JsonCacheStore::new(temp_file.path());

        let snapshot = create_test_snapshot();
        store.save(&snapshot).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[tokio::test]
    async fn test_load_is_idempotent() {
        let temp_file = NamedTempFile::new().unwrap();
        let store = JsonCacheStore::new(temp_file.path());
        store.save(&create_test_snapshot()).await.unwrap();

        let first = store.load().await;
        let second = store.load().await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_save_replaces_previous_snapshot_and_cleans_tmp() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("latest_calendar.json");
        let store = JsonCacheStore::new(&path);

        store.save(&create_test_snapshot()).await.unwrap();

        let mut newer = create_test_snapshot();
        newer.events.truncate(1);
        store.save(&newer).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.events.len(), 1);
        assert!(!store.tmp_path().exists());
    }

    #[tokio::test]
    async fn test_save_creates_missing_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("latest_calendar.json");
        let store = JsonCacheStore::new(&path);

        store.save(&create_test_snapshot()).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_failed_save_keeps_previous_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("latest_calendar.json");
        let store = JsonCacheStore::new(&path);
        let snapshot = create_test_snapshot();
        store.save(&snapshot).await.unwrap();

        // A directory squatting on the temporary path makes the write fail
        std::fs::create_dir(store.tmp_path()).unwrap();

        let mut newer = create_test_snapshot();
        newer.events.clear();
        let result = store.save(&newer).await;
        assert!(matches!(result, Err(PersistenceError::Io(_))));

        assert_eq!(store.load().await.unwrap(), snapshot);
    }

    #[tokio::test]
    async fn test_load_corrupted_json_returns_none() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_path_buf();

        // Write invalid JSON
        fs::write(&path, "{ this is not valid json ").await.unwrap();

        let store = JsonCacheStore::new(path);
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn test_load_other_schema_version_returns_none() {
        let temp_file = NamedTempFile::new().unwrap();
        let store = JsonCacheStore::new(temp_file.path());

        let mut snapshot = create_test_snapshot();
        snapshot.schema_version = SCHEMA_VERSION + 1;
        store.save(&snapshot).await.unwrap();

        assert!(store.load().await.is_none());
    }
}
