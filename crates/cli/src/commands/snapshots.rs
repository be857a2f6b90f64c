//! Commands talking to the remote ingest endpoint

use anyhow::{Context, Result};
use colored::Colorize;
use monitor_lib::store::DEFAULT_CAPACITY;
use monitor_lib::{InferenceEngine, SnapshotStore, UeAssessment};
use serde_json::Value;
use std::path::Path;

use crate::client::IngestClient;
use crate::output::{
    format_timestamp, print_assessments, print_json, print_snapshot, print_success,
    print_warning, OutputFormat,
};

/// Show the most recent snapshot
pub async fn show_latest(client: &IngestClient, format: OutputFormat) -> Result<()> {
    match client.latest().await? {
        Some(snapshot) => print_snapshot(&snapshot, format)?,
        None => match format {
            OutputFormat::Json => println!("null"),
            OutputFormat::Table => print_warning("No snapshots ingested yet"),
        },
    }
    Ok(())
}

/// Fetch everything retained remotely and evaluate the newest snapshot
pub async fn show_findings(
    client: &IngestClient,
    rnti: Option<u32>,
    history: usize,
    format: OutputFormat,
) -> Result<()> {
    let snapshots = client.all().await?;
    let assessments = assess_latest(snapshots, rnti, history)?;

    let Some((timestamp, assessments)) = assessments else {
        match format {
            OutputFormat::Json => println!("[]"),
            OutputFormat::Table => print_warning("No snapshots ingested yet"),
        }
        return Ok(());
    };

    if format == OutputFormat::Table {
        println!(
            "{} {}",
            "Findings for snapshot at".bold(),
            format_timestamp(timestamp).cyan()
        );
    }
    print_assessments(&assessments, format)
}

/// Load `snapshots` into a scratch store and assess its newest entry.
///
/// Returns `None` when nothing was accepted, and an error when `rnti` is
/// set but absent from the newest snapshot.
fn assess_latest(
    snapshots: Vec<monitor_lib::Snapshot>,
    rnti: Option<u32>,
    history: usize,
) -> Result<Option<(i64, Vec<UeAssessment>)>> {
    let store = SnapshotStore::in_memory(DEFAULT_CAPACITY.max(snapshots.len()));
    store.append(snapshots);

    let Some(latest) = store.latest() else {
        return Ok(None);
    };

    let engine = InferenceEngine::default();
    let mut assessments = engine.assess_snapshot(&latest, &store, history);

    if let Some(rnti) = rnti {
        assessments.retain(|a| a.rnti == rnti);
        if assessments.is_empty() {
            anyhow::bail!("RNTI 0x{:04x} is not in the latest snapshot", rnti);
        }
    }

    Ok(Some((latest.timestamp, assessments)))
}

/// POST a JSON file holding one snapshot or an array of them
pub async fn push_file(client: &IngestClient, path: &Path, format: OutputFormat) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let body: Value = serde_json::from_str(&content)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;

    if !body.is_object() && !body.is_array() {
        anyhow::bail!("{} must hold a snapshot object or an array", path.display());
    }

    let response = client.push(&body).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => print_success(&format!(
            "Pushed {} snapshot(s) to {}, endpoint now holds {}",
            response.added,
            client.endpoint(),
            response.size
        )),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use monitor_lib::{Severity, Snapshot, UeMetrics};

    fn snapshot(ts: i64, rntis: &[u32], dl_drop: f64) -> Snapshot {
        let ues = rntis
            .iter()
            .map(|&rnti| {
                let mut ue = UeMetrics::new(1, rnti);
                ue.downlink.cqi = 12.0;
                ue.downlink.drop_rate = dl_drop;
                ue
            })
            .collect();
        Snapshot::new(ts, "OAI", ues)
    }

    #[test]
    fn test_assess_latest_uses_newest_snapshot() {
        let snapshots = vec![snapshot(1, &[0x4601], 0.0), snapshot(2, &[0x4601, 0x4602], 12.0)];

        let (ts, assessments) = assess_latest(snapshots, None, 10).unwrap().unwrap();

        assert_eq!(ts, 2);
        assert_eq!(assessments.len(), 2);
        assert!(assessments.iter().all(|a| a.severity == Severity::Alert));
    }

    #[test]
    fn test_assess_latest_filters_by_rnti() {
        let snapshots = vec![snapshot(1, &[0x4601, 0x4602], 0.0)];

        let (_, assessments) = assess_latest(snapshots, Some(0x4602), 10)
            .unwrap()
            .unwrap();

        assert_eq!(assessments.len(), 1);
        assert_eq!(assessments[0].rnti, 0x4602);
    }

    #[test]
    fn test_assess_latest_unknown_rnti_errors() {
        let snapshots = vec![snapshot(1, &[0x4601], 0.0)];

        assert!(assess_latest(snapshots, Some(0x9999), 10).is_err());
    }

    #[test]
    fn test_assess_latest_empty_is_none() {
        assert!(assess_latest(Vec::new(), None, 10).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_push_rejects_scalar_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("snap.json");
        std::fs::write(&path, "42").unwrap();

        let client = IngestClient::new("http://127.0.0.1:9/api/ingest").unwrap();
        let err = push_file(&client, &path, OutputFormat::Json).await.unwrap_err();

        assert!(err.to_string().contains("snapshot object or an array"));
    }
}
