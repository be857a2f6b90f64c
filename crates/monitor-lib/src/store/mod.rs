//! Snapshot store
//!
//! Owns the authoritative, time-ordered log of snapshots:
//! - Timestamp-based deduplication against a watermark and a flush cutoff
//! - FIFO capacity bound
//! - Pause/resume gate and the composite flush-and-pause operation
//! - File-per-key persistence restored at startup
//! - Version-keyed per-UE history lookups

mod history;
mod persist;

#[cfg(test)]
mod tests;

pub use history::HistoryIndex;
pub use persist::{keys, PersistError, RestoredState, StatePersistence};

use crate::models::{MetricSample, Snapshot};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

/// Default number of snapshots retained
pub const DEFAULT_CAPACITY: usize = 1000;

/// Default number of history samples handed to the inference engine
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Default remote ingest endpoint
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8080/api/ingest";

/// Where the poller gets its snapshots from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// Locally generated synthetic snapshots
    #[default]
    Mock,
    /// Remote ingest endpoint
    Api,
}

impl std::fmt::Display for SourceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceMode::Mock => write!(f, "mock"),
            SourceMode::Api => write!(f, "api"),
        }
    }
}

impl FromStr for SourceMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mock" => Ok(SourceMode::Mock),
            "api" => Ok(SourceMode::Api),
            other => anyhow::bail!("unknown source mode '{}', expected mock or api", other),
        }
    }
}

/// Configuration for the snapshot store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Maximum number of snapshots retained (oldest evicted first)
    pub capacity: usize,
    /// Directory for persisted state (in-memory only when `None`)
    pub state_dir: Option<PathBuf>,
    /// Mode used when nothing was persisted
    pub default_mode: SourceMode,
    /// Endpoint used when nothing was persisted
    pub default_endpoint: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            state_dir: None,
            default_mode: SourceMode::default(),
            default_endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }
}

/// Result of one `append` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendOutcome {
    pub accepted: usize,
    pub rejected: usize,
}

/// Point-in-time view of store state
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub entries: usize,
    pub capacity: usize,
    pub version: u64,
    pub watermark: Option<i64>,
    pub flush_cutoff: Option<i64>,
    pub paused: bool,
    pub mode: SourceMode,
    pub endpoint: String,
    pub latest_source: Option<String>,
    pub latest_timestamp: Option<i64>,
    /// Milliseconds since the last accepted append in this process
    pub last_update_age_ms: Option<i64>,
}

#[derive(Debug)]
struct StoreState {
    log: Arc<Vec<Snapshot>>,
    version: u64,
    watermark: Option<i64>,
    flush_cutoff: Option<i64>,
    paused: bool,
    mode: SourceMode,
    endpoint: String,
    last_append_ms: Option<i64>,
}

/// The single authoritative snapshot log of a monitor instance.
///
/// Construct one per process with [`SnapshotStore::open`] and share it
/// behind an `Arc`. Every mutation goes through `append`, `pause`,
/// `resume`, `flush`, `set_mode` or `set_endpoint`.
#[derive(Debug)]
pub struct SnapshotStore {
    state: RwLock<StoreState>,
    index: Mutex<HistoryIndex>,
    persistence: Option<StatePersistence>,
    capacity: usize,
}

impl SnapshotStore {
    /// Create an empty, non-persistent store
    pub fn in_memory(capacity: usize) -> Self {
        Self::open(StoreConfig {
            capacity,
            ..Default::default()
        })
    }

    /// Create a store, restoring persisted state when a state dir is set.
    ///
    /// Unreadable state is logged and replaced by defaults.
    pub fn open(config: StoreConfig) -> Self {
        let capacity = config.capacity.max(1);
        let persistence = config.state_dir.map(StatePersistence::new);
        let restored = persistence
            .as_ref()
            .map(|p| p.restore(capacity))
            .unwrap_or_default();

        let log = restored.snapshots.unwrap_or_default();
        let watermark = log.iter().map(|s| s.timestamp).max();
        let version = if log.is_empty() { 0 } else { 1 };

        info!(
            capacity = capacity,
            entries = log.len(),
            persistent = persistence.is_some(),
            "Snapshot store opened"
        );

        Self {
            state: RwLock::new(StoreState {
                log: Arc::new(log),
                version,
                watermark,
                flush_cutoff: restored.flush_cutoff,
                paused: restored.paused.unwrap_or(false),
                mode: restored.mode.unwrap_or(config.default_mode),
                endpoint: restored.endpoint.unwrap_or(config.default_endpoint),
                last_append_ms: None,
            }),
            index: Mutex::new(HistoryIndex::new()),
            persistence,
            capacity,
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist<T: Serialize + ?Sized>(&self, key: &'static str, value: &T) {
        if let Some(persistence) = &self.persistence {
            if let Err(e) = persistence.write(key, value) {
                warn!(key = key, error = %e, "Failed to persist store state, keeping in-memory copy");
            }
        }
    }

    /// Append a batch of candidate snapshots.
    ///
    /// A candidate is accepted only if its timestamp is strictly greater
    /// than the flush cutoff and than every timestamp accepted before it,
    /// including earlier candidates of the same batch.
    pub fn append(&self, candidates: Vec<Snapshot>) -> AppendOutcome {
        let total = candidates.len();
        let mut state = self.write_state();
        self.adopt_external_flush(&mut state);

        let mut floor = state.watermark.max(state.flush_cutoff);
        let accepted: Vec<Snapshot> = candidates
            .into_iter()
            .filter(|s| {
                if Some(s.timestamp) > floor {
                    floor = Some(s.timestamp);
                    true
                } else {
                    false
                }
            })
            .collect();

        let outcome = AppendOutcome {
            accepted: accepted.len(),
            rejected: total - accepted.len(),
        };

        if accepted.is_empty() {
            if total > 0 {
                debug!(rejected = total, "No new snapshots in batch");
            }
            return outcome;
        }

        let log = Arc::make_mut(&mut state.log);
        log.extend(accepted);
        if log.len() > self.capacity {
            let excess = log.len() - self.capacity;
            log.drain(..excess);
        }
        let tail = log.last().map(|s| s.timestamp);

        state.watermark = tail;
        state.version += 1;
        state.last_append_ms = Some(chrono::Utc::now().timestamp_millis());

        debug!(
            accepted = outcome.accepted,
            rejected = outcome.rejected,
            entries = state.log.len(),
            version = state.version,
            "Snapshots appended"
        );

        self.persist(keys::SNAPSHOTS, state.log.as_slice());
        outcome
    }

    /// Stop the scheduled acquisition cycle
    pub fn pause(&self) {
        let mut state = self.write_state();
        state.paused = true;
        self.persist(keys::PAUSED, &state.paused);
    }

    /// Re-enable the scheduled acquisition cycle
    pub fn resume(&self) {
        let mut state = self.write_state();
        state.paused = false;
        self.persist(keys::PAUSED, &state.paused);
    }

    /// Clear the log at the current wall-clock time and pause in API mode
    pub fn flush(&self) {
        self.flush_at(chrono::Utc::now().timestamp_millis());
    }

    /// Clear the log with an explicit cutoff.
    ///
    /// Nothing at or before `cutoff_ms` is admitted afterwards. The source
    /// switches to API mode and the store pauses, so no synthetic or stale
    /// data reappears until `resume`.
    pub fn flush_at(&self, cutoff_ms: i64) {
        let mut state = self.write_state();
        let dropped = state.log.len();

        state.log = Arc::new(Vec::new());
        state.version += 1;
        state.flush_cutoff = Some(cutoff_ms);
        state.watermark = Some(cutoff_ms);
        state.mode = SourceMode::Api;
        state.paused = true;

        info!(
            dropped = dropped,
            cutoff_ms = cutoff_ms,
            "Store flushed and paused"
        );

        self.persist(keys::SNAPSHOTS, state.log.as_slice());
        self.persist(keys::FLUSH_CUTOFF, &state.flush_cutoff);
        self.persist(keys::MODE, &state.mode);
        self.persist(keys::PAUSED, &state.paused);
    }

    /// Pick up control state another handle wrote to the state dir.
    ///
    /// Reloads `paused`, `mode` and `endpoint`. A persisted flush cutoff
    /// newer than the one held here clears the log as if `flush_at` had run
    /// in this process. Returns true when anything changed.
    pub fn sync_control_state(&self) -> bool {
        let Some(persistence) = &self.persistence else {
            return false;
        };
        let paused = read_control_key::<bool>(persistence, keys::PAUSED);
        let mode = read_control_key::<SourceMode>(persistence, keys::MODE);
        let endpoint = read_control_key::<String>(persistence, keys::ENDPOINT);

        let mut state = self.write_state();
        let mut changed = self.adopt_external_flush(&mut state);
        if let Some(paused) = paused.filter(|p| *p != state.paused) {
            state.paused = paused;
            changed = true;
        }
        if let Some(mode) = mode.filter(|m| *m != state.mode) {
            state.mode = mode;
            changed = true;
        }
        if let Some(endpoint) = endpoint.filter(|e| *e != state.endpoint) {
            state.endpoint = endpoint;
            changed = true;
        }

        if changed {
            info!(
                paused = state.paused,
                mode = %state.mode,
                endpoint = %state.endpoint,
                "Store control state reloaded"
            );
        }
        changed
    }

    /// Clear the log when the persisted cutoff is newer than ours
    fn adopt_external_flush(&self, state: &mut StoreState) -> bool {
        let Some(persistence) = &self.persistence else {
            return false;
        };
        let cutoff = read_control_key::<Option<i64>>(persistence, keys::FLUSH_CUTOFF).flatten();
        let Some(cutoff) = cutoff.filter(|c| Some(*c) > state.flush_cutoff) else {
            return false;
        };

        let dropped = state.log.len();
        state.log = Arc::new(Vec::new());
        state.version += 1;
        state.flush_cutoff = Some(cutoff);
        state.watermark = Some(cutoff);

        info!(
            dropped = dropped,
            cutoff_ms = cutoff,
            "Adopted flush from state dir"
        );
        true
    }

    pub fn set_mode(&self, mode: SourceMode) {
        let mut state = self.write_state();
        state.mode = mode;
        self.persist(keys::MODE, &state.mode);
    }

    pub fn set_endpoint(&self, endpoint: impl Into<String>) {
        let mut state = self.write_state();
        state.endpoint = endpoint.into();
        self.persist(keys::ENDPOINT, &state.endpoint);
    }

    pub fn is_paused(&self) -> bool {
        self.read_state().paused
    }

    pub fn mode(&self) -> SourceMode {
        self.read_state().mode
    }

    pub fn endpoint(&self) -> String {
        self.read_state().endpoint.clone()
    }

    /// Greatest timestamp accepted so far
    pub fn watermark(&self) -> Option<i64> {
        self.read_state().watermark
    }

    pub fn flush_cutoff(&self) -> Option<i64> {
        self.read_state().flush_cutoff
    }

    /// Monotonic counter bumped on every log mutation
    pub fn version(&self) -> u64 {
        self.read_state().version
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Consistent view of the whole log
    pub fn log(&self) -> Arc<Vec<Snapshot>> {
        Arc::clone(&self.read_state().log)
    }

    pub fn len(&self) -> usize {
        self.read_state().log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_state().log.is_empty()
    }

    pub fn latest(&self) -> Option<Snapshot> {
        self.read_state().log.last().cloned()
    }

    pub fn latest_source(&self) -> Option<String> {
        self.read_state().log.last().map(|s| s.source.clone())
    }

    pub fn latest_timestamp(&self) -> Option<i64> {
        self.read_state().log.last().map(|s| s.timestamp)
    }

    /// The most recent `limit` samples for `rnti`, oldest first
    pub fn history_for(&self, rnti: u32, limit: usize) -> Vec<MetricSample> {
        let (log, version) = {
            let state = self.read_state();
            (Arc::clone(&state.log), state.version)
        };

        let mut index = self.index.lock().unwrap_or_else(PoisonError::into_inner);
        index.refresh(&log, version);
        index.history_for(rnti, limit)
    }

    /// RNTIs seen anywhere in the retained log
    pub fn known_rntis(&self) -> Vec<u32> {
        let (log, version) = {
            let state = self.read_state();
            (Arc::clone(&state.log), state.version)
        };

        let mut index = self.index.lock().unwrap_or_else(PoisonError::into_inner);
        index.refresh(&log, version);
        index.rntis()
    }

    pub fn stats(&self) -> StoreStats {
        let state = self.read_state();
        let now = chrono::Utc::now().timestamp_millis();

        StoreStats {
            entries: state.log.len(),
            capacity: self.capacity,
            version: state.version,
            watermark: state.watermark,
            flush_cutoff: state.flush_cutoff,
            paused: state.paused,
            mode: state.mode,
            endpoint: state.endpoint.clone(),
            latest_source: state.log.last().map(|s| s.source.clone()),
            latest_timestamp: state.log.last().map(|s| s.timestamp),
            last_update_age_ms: state.last_append_ms.map(|t| (now - t).max(0)),
        }
    }
}

fn read_control_key<T: serde::de::DeserializeOwned>(
    persistence: &StatePersistence,
    key: &'static str,
) -> Option<T> {
    match persistence.read(key) {
        Ok(value) => value,
        Err(e) => {
            debug!(key = key, error = %e, "Ignoring unreadable control key");
            None
        }
    }
}
