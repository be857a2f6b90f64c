//! Bounded in-memory snapshot buffer served by the ingest endpoint

use monitor_lib::models::Snapshot;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

/// FIFO buffer of the most recent snapshots received
#[derive(Debug, Clone)]
pub struct IngestBuffer {
    entries: Arc<RwLock<VecDeque<Snapshot>>>,
    capacity: usize,
}

impl IngestBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Arc::new(RwLock::new(VecDeque::with_capacity(capacity.min(10_000)))),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append in arrival order, evicting the oldest beyond capacity.
    /// Returns the buffer size afterwards.
    pub async fn push_many(&self, snapshots: Vec<Snapshot>) -> usize {
        let mut entries = self.entries.write().await;
        for snapshot in snapshots {
            while entries.len() >= self.capacity {
                entries.pop_front();
            }
            entries.push_back(snapshot);
        }
        entries.len()
    }

    pub async fn latest(&self) -> Option<Snapshot> {
        self.entries.read().await.back().cloned()
    }

    /// Every retained snapshot, oldest first
    pub async fn all(&self) -> Vec<Snapshot> {
        self.entries.read().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
