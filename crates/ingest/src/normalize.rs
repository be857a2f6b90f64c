//! POST body normalisation
//!
//! Producers are loosely typed, so fields are repaired rather than rejected:
//! a missing timestamp becomes server time, a missing `ues` becomes empty
//! and a missing source becomes `"unknown"`. Only bodies that are not
//! snapshot-shaped at all are refused.

use monitor_lib::models::{numeric_timestamp, Snapshot, UeMetrics, UNKNOWN_SOURCE};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

/// Why a POST body was refused
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IngestError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("body must be a snapshot object or an array of them")]
    InvalidBody,

    #[error("item {0} is not an object")]
    NonObjectItem(usize),
}

/// Parse and normalise a raw POST body received at `now_ms`
pub fn normalize_body(body: &[u8], now_ms: i64) -> Result<Vec<Snapshot>, IngestError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| IngestError::InvalidJson(e.to_string()))?;

    match value {
        Value::Object(item) => Ok(vec![normalize_item(&item, now_ms)]),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(item) => Ok(normalize_item(item, now_ms)),
                _ => Err(IngestError::NonObjectItem(i)),
            })
            .collect(),
        _ => Err(IngestError::InvalidBody),
    }
}

/// Repair one snapshot object
pub fn normalize_item(item: &Map<String, Value>, now_ms: i64) -> Snapshot {
    let timestamp = item
        .get("timestamp")
        .and_then(numeric_timestamp)
        .unwrap_or(now_ms);

    let source = item
        .get("source")
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN_SOURCE)
        .to_string();

    let ues = match item.get("ues") {
        Some(Value::Array(entries)) => entries
            .iter()
            .filter_map(|entry| match serde_json::from_value::<UeMetrics>(entry.clone()) {
                Ok(ue) => Some(ue),
                Err(e) => {
                    debug!(error = %e, "Dropping undecodable UE entry");
                    None
                }
            })
            .collect(),
        _ => Vec::new(),
    };

    Snapshot::new(timestamp, source, ues)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_object() {
        let body = br#"{"timestamp":10,"source":"srsRAN","ues":[{"pci":1,"rnti":70}]}"#;
        let snapshots = normalize_body(body, 99).unwrap();

        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].timestamp, 10);
        assert_eq!(snapshots[0].source, "srsRAN");
        assert_eq!(snapshots[0].ues[0].rnti, 70);
    }

    #[test]
    fn test_missing_fields_repaired() {
        let snapshots = normalize_body(br#"[{}, {"timestamp":"x","source":5,"ues":"y"}]"#, 99).unwrap();

        for snapshot in &snapshots {
            assert_eq!(snapshot.timestamp, 99);
            assert_eq!(snapshot.source, UNKNOWN_SOURCE);
            assert!(snapshot.ues.is_empty());
        }
    }

    #[test]
    fn test_undecodable_ue_dropped() {
        let body = br#"{"timestamp":1,"ues":[{"rnti":1},{"pci":2},"x"]}"#;
        let snapshots = normalize_body(body, 0).unwrap();
        assert_eq!(snapshots[0].ues.len(), 1);
    }

    #[test]
    fn test_rejections() {
        assert!(matches!(
            normalize_body(b"{not json", 0),
            Err(IngestError::InvalidJson(_))
        ));
        assert_eq!(normalize_body(b"42", 0), Err(IngestError::InvalidBody));
        assert_eq!(normalize_body(b"null", 0), Err(IngestError::InvalidBody));
        assert_eq!(
            normalize_body(br#"[{"timestamp":1}, 3]"#, 0),
            Err(IngestError::NonObjectItem(1))
        );
    }
}
