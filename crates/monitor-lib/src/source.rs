//! Snapshot acquisition sources
//!
//! Two implementations back the poller: a local generator producing
//! synthetic but well-formed snapshots, and an HTTP client for the remote
//! ingest endpoint.

use crate::models::{Snapshot, SnapshotRejection, UeMetrics};
use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Source label used by the synthetic generator
pub const MOCK_SOURCE: &str = "mock";

/// Trait for snapshot acquisition implementations
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Acquire one batch of candidate snapshots.
    ///
    /// `endpoint` is the store's configured remote endpoint; local sources
    /// ignore it.
    async fn acquire(&self, endpoint: &str) -> Result<Vec<Snapshot>>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Generates one random snapshot per call
#[derive(Debug, Clone)]
pub struct MockSource {
    pci: u32,
    rntis: Vec<u32>,
}

impl Default for MockSource {
    fn default() -> Self {
        Self {
            pci: 1,
            rntis: vec![0x4601, 0x4602, 0x4603],
        }
    }
}

impl MockSource {
    pub fn new(pci: u32, rntis: Vec<u32>) -> Self {
        Self { pci, rntis }
    }

    /// Build one synthetic snapshot stamped `timestamp`
    pub fn generate(&self, timestamp: i64) -> Snapshot {
        let mut rng = rand::thread_rng();
        let count = if self.rntis.is_empty() {
            0
        } else {
            rng.gen_range(1..=self.rntis.len().min(3))
        };

        let ues = self.rntis[..count]
            .iter()
            .map(|&rnti| {
                let mut ue = UeMetrics::new(self.pci, rnti);

                let dl_total: f64 = rng.gen_range(200.0..1200.0_f64).round();
                let dl_nok: f64 = (dl_total * rng.gen_range(0.0..0.12)).round();
                ue.downlink.cqi = rng.gen_range(3..=15) as f64;
                ue.downlink.ri = rng.gen_range(1..=2) as f64;
                ue.downlink.mcs = rng.gen_range(0..=28) as f64;
                ue.downlink.bitrate = rng.gen_range(0.5e6..25e6_f64).round();
                ue.downlink.packets_ok = dl_total - dl_nok;
                ue.downlink.packets_nok = dl_nok;
                ue.downlink.drop_rate = dl_nok / dl_total * 100.0;
                ue.downlink.buffer_status = rng.gen_range(0.0..50_000.0_f64).round();

                let ul_total: f64 = rng.gen_range(100.0..600.0_f64).round();
                let ul_nok: f64 = (ul_total * rng.gen_range(0.0..0.08)).round();
                ue.uplink.pusch_sinr = rng.gen_range(-2.0..30.0);
                ue.uplink.rsrp = rng.gen_range(-110.0..-70.0);
                ue.uplink.ri = 1.0;
                ue.uplink.mcs = rng.gen_range(0..=27) as f64;
                ue.uplink.bitrate = rng.gen_range(0.1e6..10e6_f64).round();
                ue.uplink.packets_ok = ul_total - ul_nok;
                ue.uplink.packets_nok = ul_nok;
                ue.uplink.drop_rate = ul_nok / ul_total * 100.0;
                ue.uplink.bsr = rng.gen_range(0.0..40_000.0_f64).round();
                ue.uplink.timing_advance = rng.gen_range(0..=64) as f64;
                ue.uplink.phr = rng.gen_range(0..=40) as f64;
                ue
            })
            .collect();

        Snapshot::new(timestamp, MOCK_SOURCE, ues)
    }
}

#[async_trait]
impl SnapshotSource for MockSource {
    async fn acquire(&self, _endpoint: &str) -> Result<Vec<Snapshot>> {
        Ok(vec![self.generate(chrono::Utc::now().timestamp_millis())])
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Fetches every retained snapshot from a remote ingest endpoint
#[derive(Debug, Clone)]
pub struct RemoteSource {
    client: reqwest::Client,
}

impl RemoteSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SnapshotSource for RemoteSource {
    async fn acquire(&self, endpoint: &str) -> Result<Vec<Snapshot>> {
        let response = self
            .client
            .get(endpoint)
            .query(&[("all", "1")])
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", endpoint))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Ingest endpoint returned {}", status);
        }

        let body: Value = response
            .json()
            .await
            .context("Ingest endpoint returned invalid JSON")?;

        Ok(decode_batch(&body))
    }

    fn name(&self) -> &'static str {
        "api"
    }
}

/// Decode a GET payload into valid snapshots.
///
/// An array is validated item by item; a single object counts as a one-item
/// batch; `null` and anything else yield nothing.
pub fn decode_batch(body: &Value) -> Vec<Snapshot> {
    let items: &[Value] = match body {
        Value::Array(items) => items,
        Value::Object(_) => std::slice::from_ref(body),
        _ => &[],
    };

    items
        .iter()
        .enumerate()
        .filter_map(|(i, item)| match Snapshot::from_value(item) {
            Ok(snapshot) => Some(snapshot),
            Err(reason) => {
                log_discard(i, &reason);
                None
            }
        })
        .collect()
}

fn log_discard(index: usize, reason: &SnapshotRejection) {
    debug!(index = index, reason = %reason, "Discarding malformed snapshot");
}

/// Pair of sources the poller switches between by store mode
#[derive(Clone)]
pub struct SourceSet {
    pub mock: Arc<dyn SnapshotSource>,
    pub remote: Arc<dyn SnapshotSource>,
}

impl SourceSet {
    pub fn new(mock: Arc<dyn SnapshotSource>, remote: Arc<dyn SnapshotSource>) -> Self {
        Self { mock, remote }
    }

    /// Default mock generator plus an HTTP source with a 5 s timeout
    pub fn standard() -> Result<Self> {
        Ok(Self::new(
            Arc::new(MockSource::default()),
            Arc::new(RemoteSource::new(Duration::from_secs(5))?),
        ))
    }
}

impl std::fmt::Debug for SourceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceSet")
            .field("mock", &self.mock.name())
            .field("remote", &self.remote.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mock_snapshot_is_well_formed() {
        let source = MockSource::default();

        for _ in 0..50 {
            let snapshot = source.generate(1_000);
            assert_eq!(snapshot.timestamp, 1_000);
            assert_eq!(snapshot.source, MOCK_SOURCE);
            assert!((1..=3).contains(&snapshot.ues.len()));

            for ue in &snapshot.ues {
                assert!((3.0..=15.0).contains(&ue.downlink.cqi));
                assert!((0.0..=100.0).contains(&ue.downlink.drop_rate));
                assert!(ue.downlink.packets_ok + ue.downlink.packets_nok > 0.0);
            }

            // Round-trips through wire validation
            let value = serde_json::to_value(&snapshot).unwrap();
            assert!(Snapshot::from_value(&value).is_ok());
        }
    }

    #[test]
    fn test_mock_without_rntis_is_empty() {
        let snapshot = MockSource::new(1, vec![]).generate(5);
        assert!(snapshot.ues.is_empty());
    }

    #[test]
    fn test_decode_batch_mixed_items() {
        let body = json!([
            { "timestamp": 1, "source": "OAI", "ues": [] },
            { "source": "OAI", "ues": [] },
            { "timestamp": 2, "ues": "nope" },
            "garbage",
            { "timestamp": 3, "ues": [{ "rnti": 9 }] }
        ]);

        let snapshots = decode_batch(&body);
        let timestamps: Vec<i64> = snapshots.iter().map(|s| s.timestamp).collect();
        assert_eq!(timestamps, vec![1, 3]);
        assert_eq!(snapshots[1].source, "unknown");
    }

    #[test]
    fn test_decode_batch_object_and_null() {
        assert_eq!(decode_batch(&json!({ "timestamp": 7, "ues": [] })).len(), 1);
        assert!(decode_batch(&Value::Null).is_empty());
    }

    #[tokio::test]
    async fn test_remote_source_fetches_all() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/ingest")
            .match_query(mockito::Matcher::UrlEncoded("all".into(), "1".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"timestamp":10,"source":"srsRAN","ues":[{"pci":1,"rnti":70}]},{"bad":true}]"#)
            .create_async()
            .await;

        let source = RemoteSource::new(Duration::from_secs(2)).unwrap();
        let endpoint = format!("{}/api/ingest", server.url());
        let snapshots = source.acquire(&endpoint).await.unwrap();

        mock.assert_async().await;
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].ues[0].rnti, 70);
    }

    #[tokio::test]
    async fn test_remote_source_non_success_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/ingest")
            .match_query(mockito::Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let source = RemoteSource::new(Duration::from_secs(2)).unwrap();
        let endpoint = format!("{}/api/ingest", server.url());
        let err = source.acquire(&endpoint).await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_remote_source_unreachable_is_error() {
        let source = RemoteSource::new(Duration::from_millis(500)).unwrap();
        assert!(source.acquire("http://127.0.0.1:1/api/ingest").await.is_err());
    }
}
