//! Durable local state for the snapshot store
//!
//! Each key lives in its own JSON file inside the state directory so that
//! keys are read independently at startup and rewritten independently on
//! the mutation that touches them. Writes go through a temp file and a
//! rename so a crash never leaves a half-written key behind.

use super::SourceMode;
use crate::models::Snapshot;
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Names of the persisted keys
pub mod keys {
    pub const SNAPSHOTS: &str = "snapshots";
    pub const MODE: &str = "mode";
    pub const ENDPOINT: &str = "endpoint";
    pub const PAUSED: &str = "paused";
    pub const FLUSH_CUTOFF: &str = "flush_cutoff";
}

/// Errors raised while reading or writing a state key
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode key {key}: {source}")]
    Encode {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("corrupt value for key {key}: {source}")]
    Decode {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// State recovered at startup. Every field is `None` when its key was
/// missing or unreadable.
#[derive(Debug, Default)]
pub struct RestoredState {
    pub snapshots: Option<Vec<Snapshot>>,
    pub mode: Option<SourceMode>,
    pub endpoint: Option<String>,
    pub paused: Option<bool>,
    pub flush_cutoff: Option<i64>,
}

/// File-per-key persistence rooted at a directory
#[derive(Debug, Clone)]
pub struct StatePersistence {
    dir: PathBuf,
}

impl StatePersistence {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    /// Atomically replace one key
    pub fn write<T: Serialize + ?Sized>(
        &self,
        key: &'static str,
        value: &T,
    ) -> Result<(), PersistError> {
        fs::create_dir_all(&self.dir).map_err(|source| PersistError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let json = serde_json::to_vec(value).map_err(|source| PersistError::Encode { key, source })?;

        let path = self.path(key);
        let temp_path = path.with_extension("tmp");
        let io_err = |source| PersistError::Io {
            path: temp_path.clone(),
            source,
        };

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(io_err)?;
        file.write_all(&json).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;

        fs::rename(&temp_path, &path).map_err(|source| PersistError::Io {
            path: path.clone(),
            source,
        })?;

        debug!(key = key, bytes = json.len(), "State key persisted");
        Ok(())
    }

    /// Read one key; `Ok(None)` when it was never written
    pub fn read<T: DeserializeOwned>(&self, key: &'static str) -> Result<Option<T>, PersistError> {
        let path = self.path(key);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(PersistError::Io { path, source }),
        };

        serde_json::from_slice(&data)
            .map(Some)
            .map_err(|source| PersistError::Decode { key, source })
    }

    /// Read every key, treating any failure as "absent"
    pub fn restore(&self, capacity: usize) -> RestoredState {
        let mut state = RestoredState {
            snapshots: self.read_or_warn(keys::SNAPSHOTS),
            mode: self.read_or_warn(keys::MODE),
            endpoint: self.read_or_warn(keys::ENDPOINT),
            paused: self.read_or_warn(keys::PAUSED),
            flush_cutoff: self.read_or_warn::<Option<i64>>(keys::FLUSH_CUTOFF).flatten(),
        };

        if let Some(snapshots) = state.snapshots.as_mut() {
            if snapshots.len() > capacity {
                let excess = snapshots.len() - capacity;
                snapshots.drain(..excess);
            }
        }

        info!(
            dir = %self.dir.display(),
            snapshots = state.snapshots.as_ref().map(Vec::len).unwrap_or(0),
            "Restored store state"
        );
        state
    }

    fn read_or_warn<T: DeserializeOwned>(&self, key: &'static str) -> Option<T> {
        match self.read(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = key, error = %e, "Discarding unreadable state key");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read_key() {
        let dir = TempDir::new().unwrap();
        let persistence = StatePersistence::new(dir.path());

        persistence.write(keys::PAUSED, &true).unwrap();
        let paused: Option<bool> = persistence.read(keys::PAUSED).unwrap();
        assert_eq!(paused, Some(true));
        assert!(!dir.path().join("paused.tmp").exists());
    }

    #[test]
    fn test_missing_key_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let persistence = StatePersistence::new(dir.path());

        let endpoint: Option<String> = persistence.read(keys::ENDPOINT).unwrap();
        assert!(endpoint.is_none());
    }

    #[test]
    fn test_corrupt_key_is_decode_error_and_restores_as_absent() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("snapshots.json"), b"{not json").unwrap();
        let persistence = StatePersistence::new(dir.path());

        let err = persistence.read::<Vec<Snapshot>>(keys::SNAPSHOTS).unwrap_err();
        assert!(matches!(err, PersistError::Decode { .. }));

        let restored = persistence.restore(10);
        assert!(restored.snapshots.is_none());
    }

    #[test]
    fn test_restore_bounds_snapshots_to_capacity() {
        let dir = TempDir::new().unwrap();
        let persistence = StatePersistence::new(dir.path());
        let snapshots: Vec<Snapshot> = (0..8).map(|i| Snapshot::new(i, "OAI", vec![])).collect();
        persistence.write(keys::SNAPSHOTS, &snapshots).unwrap();

        let restored = persistence.restore(5);
        let kept = restored.snapshots.unwrap();
        assert_eq!(kept.len(), 5);
        assert_eq!(kept[0].timestamp, 3);
    }
}
