//! Per-UE history projection over the snapshot log
//!
//! The index holds no state of its own beyond a cache keyed by the log
//! version it was built from; any read against a newer version rebuilds it.

use crate::models::{MetricSample, Snapshot};
use std::collections::HashMap;
use tracing::debug;

/// Mapping from RNTI to that UE's samples, oldest first
#[derive(Debug, Default)]
pub struct HistoryIndex {
    built_from: Option<u64>,
    by_rnti: HashMap<u32, Vec<MetricSample>>,
}

impl HistoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the index for a log without caching it
    pub fn build(log: &[Snapshot]) -> HashMap<u32, Vec<MetricSample>> {
        let mut by_rnti: HashMap<u32, Vec<MetricSample>> = HashMap::new();
        for snapshot in log {
            for ue in &snapshot.ues {
                by_rnti
                    .entry(ue.rnti)
                    .or_default()
                    .push(MetricSample::from_ue(snapshot.timestamp, ue));
            }
        }
        by_rnti
    }

    pub fn is_stale(&self, version: u64) -> bool {
        self.built_from != Some(version)
    }

    /// Rebuild if `version` differs from the cached one. Returns true on rebuild.
    pub fn refresh(&mut self, log: &[Snapshot], version: u64) -> bool {
        if !self.is_stale(version) {
            return false;
        }

        self.by_rnti = Self::build(log);
        self.built_from = Some(version);
        debug!(
            version = version,
            ues = self.by_rnti.len(),
            "History index rebuilt"
        );
        true
    }

    /// The trailing `limit` samples for `rnti`, oldest first
    pub fn history_for(&self, rnti: u32, limit: usize) -> Vec<MetricSample> {
        match self.by_rnti.get(&rnti) {
            Some(samples) => {
                let start = samples.len().saturating_sub(limit);
                samples[start..].to_vec()
            }
            None => Vec::new(),
        }
    }

    /// RNTIs present anywhere in the indexed log, ascending
    pub fn rntis(&self) -> Vec<u32> {
        let mut rntis: Vec<u32> = self.by_rnti.keys().copied().collect();
        rntis.sort_unstable();
        rntis
    }
}
