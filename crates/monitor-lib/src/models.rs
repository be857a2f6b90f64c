//! Core data models for RAN telemetry snapshots
//!
//! The serde shapes here are the wire format shared by the parsers, the
//! ingest endpoint and the snapshot store.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Source label assigned when a producer does not name itself
pub const UNKNOWN_SOURCE: &str = "unknown";

/// Bits per second in one Mbit/s
pub const BITS_PER_MBIT: f64 = 1_000_000.0;

/// Accepts a number or `null` (vendor tools emit `null` for "n/a").
fn lenient_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}

/// Downlink metrics for one UE in one snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DownlinkMetrics {
    /// Channel quality indicator
    #[serde(default, deserialize_with = "lenient_number")]
    pub cqi: f64,
    /// Rank indicator
    #[serde(default, deserialize_with = "lenient_number")]
    pub ri: f64,
    /// Modulation and coding scheme index
    #[serde(default, deserialize_with = "lenient_number")]
    pub mcs: f64,
    /// Bitrate in bits per second
    #[serde(default, deserialize_with = "lenient_number")]
    pub bitrate: f64,
    #[serde(default, deserialize_with = "lenient_number")]
    pub packets_ok: f64,
    #[serde(default, deserialize_with = "lenient_number")]
    pub packets_nok: f64,
    /// Drop rate in percent
    #[serde(default, deserialize_with = "lenient_number")]
    pub drop_rate: f64,
    /// Pending downlink buffer
    #[serde(default, deserialize_with = "lenient_number")]
    pub buffer_status: f64,
}

/// Uplink metrics for one UE in one snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UplinkMetrics {
    #[serde(default, deserialize_with = "lenient_number")]
    pub pusch_sinr: f64,
    #[serde(default, deserialize_with = "lenient_number")]
    pub rsrp: f64,
    #[serde(default, deserialize_with = "lenient_number")]
    pub ri: f64,
    #[serde(default, deserialize_with = "lenient_number")]
    pub mcs: f64,
    /// Bitrate in bits per second
    #[serde(default, deserialize_with = "lenient_number")]
    pub bitrate: f64,
    #[serde(default, deserialize_with = "lenient_number")]
    pub packets_ok: f64,
    #[serde(default, deserialize_with = "lenient_number")]
    pub packets_nok: f64,
    /// Drop rate in percent
    #[serde(default, deserialize_with = "lenient_number")]
    pub drop_rate: f64,
    /// Buffer status report (uplink backlog)
    #[serde(default, deserialize_with = "lenient_number")]
    pub bsr: f64,
    #[serde(default, deserialize_with = "lenient_number")]
    pub timing_advance: f64,
    /// Power headroom
    #[serde(default, deserialize_with = "lenient_number")]
    pub phr: f64,
}

/// One connected terminal within a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UeMetrics {
    /// Physical cell id
    #[serde(default)]
    pub pci: u32,
    /// Radio network temporary identifier, unique within a snapshot
    pub rnti: u32,
    #[serde(default)]
    pub downlink: DownlinkMetrics,
    #[serde(default)]
    pub uplink: UplinkMetrics,
}

impl UeMetrics {
    pub fn new(pci: u32, rnti: u32) -> Self {
        Self {
            pci,
            rnti,
            downlink: DownlinkMetrics::default(),
            uplink: UplinkMetrics::default(),
        }
    }
}

/// A point-in-time capture of all UEs reported by one base station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Capture time in Unix milliseconds
    pub timestamp: i64,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default)]
    pub ues: Vec<UeMetrics>,
}

fn default_source() -> String {
    UNKNOWN_SOURCE.to_string()
}

impl Snapshot {
    pub fn new(timestamp: i64, source: impl Into<String>, ues: Vec<UeMetrics>) -> Self {
        Self {
            timestamp,
            source: source.into(),
            ues,
        }
    }

    /// Find a UE by RNTI
    pub fn ue(&self, rnti: u32) -> Option<&UeMetrics> {
        self.ues.iter().find(|ue| ue.rnti == rnti)
    }

    /// Validate an untrusted JSON item.
    ///
    /// The item must carry a numeric `timestamp` and an array `ues` whose
    /// entries all decode as UEs. A missing `source` becomes `"unknown"`.
    pub fn from_value(value: &Value) -> Result<Self, SnapshotRejection> {
        let object = value.as_object().ok_or(SnapshotRejection::NotAnObject)?;

        let timestamp = object
            .get("timestamp")
            .and_then(numeric_timestamp)
            .ok_or(SnapshotRejection::MissingTimestamp)?;

        let ues = object
            .get("ues")
            .and_then(Value::as_array)
            .ok_or(SnapshotRejection::MissingUes)?
            .iter()
            .map(|ue| serde_json::from_value::<UeMetrics>(ue.clone()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| SnapshotRejection::InvalidUe(e.to_string()))?;

        let source = object
            .get("source")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(default_source);

        Ok(Self {
            timestamp,
            source,
            ues,
        })
    }
}

/// Read a JSON number as a millisecond timestamp
pub fn numeric_timestamp(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
}

/// Reason an untrusted snapshot item was discarded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotRejection {
    NotAnObject,
    MissingTimestamp,
    MissingUes,
    InvalidUe(String),
}

impl std::fmt::Display for SnapshotRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotRejection::NotAnObject => write!(f, "item is not an object"),
            SnapshotRejection::MissingTimestamp => write!(f, "missing numeric timestamp"),
            SnapshotRejection::MissingUes => write!(f, "missing ues array"),
            SnapshotRejection::InvalidUe(e) => write!(f, "invalid ue entry: {}", e),
        }
    }
}

/// One UE's metrics as recorded in one snapshot, used for history lookups
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: i64,
    pub pci: u32,
    pub downlink: DownlinkMetrics,
    pub uplink: UplinkMetrics,
}

impl MetricSample {
    pub fn from_ue(timestamp: i64, ue: &UeMetrics) -> Self {
        Self {
            timestamp,
            pci: ue.pci,
            downlink: ue.downlink,
            uplink: ue.uplink,
        }
    }

    pub fn dl_bitrate_mbps(&self) -> f64 {
        self.downlink.bitrate / BITS_PER_MBIT
    }

    pub fn ul_bitrate_mbps(&self) -> f64 {
        self.uplink.bitrate / BITS_PER_MBIT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snapshot_wire_shape() {
        let raw = json!({
            "timestamp": 1_700_000_000_000i64,
            "source": "OAI",
            "ues": [{
                "pci": 1,
                "rnti": 17921,
                "downlink": {
                    "cqi": 15, "ri": 1, "mcs": 28, "bitrate": 4000000,
                    "packets_ok": 100, "packets_nok": 2, "drop_rate": 1.96, "buffer_status": 0
                },
                "uplink": {
                    "pusch_sinr": 22.5, "rsrp": -80, "ri": 1, "mcs": 20, "bitrate": 4000000,
                    "packets_ok": 50, "packets_nok": 0, "drop_rate": 0.0, "bsr": 300,
                    "timing_advance": 31, "phr": 40
                }
            }]
        });

        let snapshot: Snapshot = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(snapshot.ues[0].rnti, 17921);
        assert_eq!(snapshot.ues[0].downlink.cqi, 15.0);
        assert_eq!(snapshot.ues[0].uplink.timing_advance, 31.0);

        let back = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(back["ues"][0]["downlink"]["buffer_status"], json!(0.0));
        assert_eq!(back["source"], "OAI");
    }

    #[test]
    fn test_srsran_frame_with_nulls_and_missing_fields() {
        let raw = json!({
            "timestamp": 5,
            "source": "srsRAN",
            "ues": [{
                "pci": 1, "rnti": 70,
                "downlink": { "cqi": 12, "bitrate": null },
                "uplink": { "pusch_sinr": 9.5, "bsr": 0 }
            }]
        });

        let snapshot = Snapshot::from_value(&raw).unwrap();
        assert_eq!(snapshot.ues[0].downlink.bitrate, 0.0);
        assert_eq!(snapshot.ues[0].uplink.rsrp, 0.0);
    }

    #[test]
    fn test_from_value_rejections() {
        assert_eq!(
            Snapshot::from_value(&json!([1, 2])),
            Err(SnapshotRejection::NotAnObject)
        );
        assert_eq!(
            Snapshot::from_value(&json!({ "timestamp": "soon", "ues": [] })),
            Err(SnapshotRejection::MissingTimestamp)
        );
        assert_eq!(
            Snapshot::from_value(&json!({ "timestamp": 1, "ues": {} })),
            Err(SnapshotRejection::MissingUes)
        );
        assert!(matches!(
            Snapshot::from_value(&json!({ "timestamp": 1, "ues": [{ "pci": 1 }] })),
            Err(SnapshotRejection::InvalidUe(_))
        ));
    }

    #[test]
    fn test_from_value_defaults_source() {
        let snapshot = Snapshot::from_value(&json!({ "timestamp": 10.0, "ues": [] })).unwrap();
        assert_eq!(snapshot.timestamp, 10);
        assert_eq!(snapshot.source, UNKNOWN_SOURCE);
    }
}
