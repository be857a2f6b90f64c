//! Rule evaluation
//!
//! Evaluates one UE's current metrics plus its recent history against a
//! fixed rule battery. Every rule runs independently and findings come back
//! in rule order; callers sort or filter by severity themselves.

use super::trend::{index_slope, MIN_TREND_SAMPLES};
use super::{worst_severity, Finding, Severity};
use crate::models::{MetricSample, Snapshot, UeMetrics};
use crate::store::SnapshotStore;
use serde::{Deserialize, Serialize};

/// Rule thresholds. Defaults are the tuned production values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceThresholds {
    /// Drop rate (percent) above which an alert fires
    pub drop_rate_alert: f64,
    /// Drop rate (percent) above which a warning fires
    pub drop_rate_warning: f64,
    /// Downlink CQI below which an alert fires
    pub cqi_alert: f64,
    /// Downlink CQI below which a warning fires
    pub cqi_warning: f64,
    /// Bitrate slope (Mbit/s per sample) below which an alert fires
    pub trend_alert_slope: f64,
    /// Bitrate slope (Mbit/s per sample) below which a warning fires
    pub trend_warning_slope: f64,
    /// Downlink buffer occupancy above which congestion is hinted
    pub dl_buffer_congestion: f64,
    /// Uplink BSR above which congestion is hinted
    pub ul_bsr_congestion: f64,
}

impl Default for InferenceThresholds {
    fn default() -> Self {
        Self {
            drop_rate_alert: 10.0,
            drop_rate_warning: 5.0,
            cqi_alert: 4.0,
            cqi_warning: 7.0,
            trend_alert_slope: -0.7,
            trend_warning_slope: -0.3,
            dl_buffer_congestion: 40_000.0,
            ul_bsr_congestion: 35_000.0,
        }
    }
}

/// Findings for one UE of a snapshot
#[derive(Debug, Clone, Serialize)]
pub struct UeAssessment {
    pub rnti: u32,
    pub pci: u32,
    pub severity: Severity,
    pub findings: Vec<Finding>,
}

/// Stateless rule engine
#[derive(Debug, Clone, Default)]
pub struct InferenceEngine {
    thresholds: InferenceThresholds,
}

#[derive(Clone, Copy)]
enum Direction {
    Downlink,
    Uplink,
}

impl Direction {
    fn label(self) -> &'static str {
        match self {
            Direction::Downlink => "Downlink",
            Direction::Uplink => "Uplink",
        }
    }
}

impl InferenceEngine {
    pub fn new(thresholds: InferenceThresholds) -> Self {
        Self { thresholds }
    }

    /// Evaluate `ue` against its `history` (oldest first).
    ///
    /// Always returns at least one finding.
    pub fn evaluate(&self, ue: &UeMetrics, history: &[MetricSample]) -> Vec<Finding> {
        let mut findings = Vec::new();

        findings.extend(self.drop_rate(Direction::Downlink, ue.downlink.drop_rate));
        findings.extend(self.drop_rate(Direction::Uplink, ue.uplink.drop_rate));
        findings.extend(self.channel_quality(ue.downlink.cqi));

        let dl_series: Vec<f64> = history.iter().map(MetricSample::dl_bitrate_mbps).collect();
        findings.extend(self.bitrate_trend(Direction::Downlink, &dl_series));
        let ul_series: Vec<f64> = history.iter().map(MetricSample::ul_bitrate_mbps).collect();
        findings.extend(self.bitrate_trend(Direction::Uplink, &ul_series));

        findings.extend(self.congestion(ue));

        if findings.is_empty() {
            findings.push(Finding::new(
                "healthy",
                "Nominal",
                Severity::Info,
                "No issues detected on either link".to_string(),
            ));
        }

        findings
    }

    /// Evaluate every UE of `snapshot`, pulling history from `store`
    pub fn assess_snapshot(
        &self,
        snapshot: &Snapshot,
        store: &SnapshotStore,
        history_limit: usize,
    ) -> Vec<UeAssessment> {
        snapshot
            .ues
            .iter()
            .map(|ue| {
                let history = store.history_for(ue.rnti, history_limit);
                let findings = self.evaluate(ue, &history);
                UeAssessment {
                    rnti: ue.rnti,
                    pci: ue.pci,
                    severity: worst_severity(&findings).unwrap_or(Severity::Info),
                    findings,
                }
            })
            .collect()
    }

    fn drop_rate(&self, direction: Direction, drop_rate: f64) -> Option<Finding> {
        let t = &self.thresholds;
        let (alert, warning) = match direction {
            Direction::Downlink => ("dl_drops_alert", "dl_drops_warning"),
            Direction::Uplink => ("ul_drops_alert", "ul_drops_warning"),
        };

        if drop_rate > t.drop_rate_alert {
            Some(Finding::new(
                alert,
                "High packet loss",
                Severity::Alert,
                format!(
                    "{} drop rate {:.1}% exceeds {:.0}%",
                    direction.label(),
                    drop_rate,
                    t.drop_rate_alert
                ),
            ))
        } else if drop_rate > t.drop_rate_warning {
            Some(Finding::new(
                warning,
                "Elevated packet loss",
                Severity::Warning,
                format!(
                    "{} drop rate {:.1}% exceeds {:.0}%",
                    direction.label(),
                    drop_rate,
                    t.drop_rate_warning
                ),
            ))
        } else {
            None
        }
    }

    fn channel_quality(&self, cqi: f64) -> Option<Finding> {
        let t = &self.thresholds;
        if cqi < t.cqi_alert {
            Some(Finding::new(
                "dl_cqi_alert",
                "Poor channel quality",
                Severity::Alert,
                format!("Downlink CQI {:.0} is below {:.0}", cqi, t.cqi_alert),
            ))
        } else if cqi < t.cqi_warning {
            Some(Finding::new(
                "dl_cqi_warning",
                "Degraded channel quality",
                Severity::Warning,
                format!("Downlink CQI {:.0} is below {:.0}", cqi, t.cqi_warning),
            ))
        } else {
            None
        }
    }

    fn bitrate_trend(&self, direction: Direction, series_mbps: &[f64]) -> Option<Finding> {
        if series_mbps.len() < MIN_TREND_SAMPLES {
            return None;
        }

        let t = &self.thresholds;
        let slope = index_slope(series_mbps);
        let (alert, warning) = match direction {
            Direction::Downlink => ("dl_bitrate_trend_alert", "dl_bitrate_trend_warning"),
            Direction::Uplink => ("ul_bitrate_trend_alert", "ul_bitrate_trend_warning"),
        };

        let message = format!(
            "{} bitrate falling {:.2} Mbit/s per sample over {} samples",
            direction.label(),
            -slope,
            series_mbps.len()
        );

        if slope < t.trend_alert_slope {
            Some(Finding::new(alert, "Throughput collapsing", Severity::Alert, message))
        } else if slope < t.trend_warning_slope {
            Some(Finding::new(warning, "Throughput declining", Severity::Warning, message))
        } else {
            None
        }
    }

    fn congestion(&self, ue: &UeMetrics) -> Vec<Finding> {
        let t = &self.thresholds;
        let mut findings = Vec::new();

        if ue.downlink.buffer_status > t.dl_buffer_congestion {
            findings.push(Finding::new(
                "dl_buffer_congestion",
                "Downlink backlog",
                Severity::Info,
                format!(
                    "Downlink buffer {:.0} above {:.0}, possible congestion",
                    ue.downlink.buffer_status, t.dl_buffer_congestion
                ),
            ));
        }

        if ue.uplink.bsr > t.ul_bsr_congestion {
            findings.push(Finding::new(
                "ul_bsr_congestion",
                "Uplink backlog",
                Severity::Info,
                format!(
                    "Uplink BSR {:.0} above {:.0}, possible congestion",
                    ue.uplink.bsr, t.ul_bsr_congestion
                ),
            ));
        }

        findings
    }
}
