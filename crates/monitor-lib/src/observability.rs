//! Observability infrastructure for the RAN monitor
//!
//! Provides:
//! - Prometheus metrics (acquisition latency, store acceptance, ingest buffer, findings)
//! - Structured JSON logging with tracing

use crate::inference::{Severity, UeAssessment};
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, Histogram, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for acquisition latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<MonitorMetricsInner> = OnceLock::new();

struct MonitorMetricsInner {
    acquire_latency_seconds: Histogram,
    snapshots_accepted: IntCounter,
    snapshots_rejected: IntCounter,
    log_entries: IntGauge,
    fetch_errors: IntCounter,
    ues_by_severity: IntGaugeVec,
    ingest_buffer_entries: IntGauge,
    ingest_requests: IntCounterVec,
    forwarded_snapshots: IntCounter,
    forward_errors: IntCounter,
}

impl MonitorMetricsInner {
    fn new() -> Self {
        Self {
            acquire_latency_seconds: register_histogram!(
                "ranmon_acquire_latency_seconds",
                "Time spent acquiring one batch of snapshots",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register acquire_latency_seconds"),

            snapshots_accepted: register_int_counter!(
                "ranmon_snapshots_accepted_total",
                "Snapshots admitted into the store log"
            )
            .expect("Failed to register snapshots_accepted"),

            snapshots_rejected: register_int_counter!(
                "ranmon_snapshots_rejected_total",
                "Snapshots dropped as duplicate, stale or before the flush cutoff"
            )
            .expect("Failed to register snapshots_rejected"),

            log_entries: register_int_gauge!(
                "ranmon_log_entries",
                "Snapshots currently retained in the store log"
            )
            .expect("Failed to register log_entries"),

            fetch_errors: register_int_counter!(
                "ranmon_fetch_errors_total",
                "Acquisition cycles that failed to reach the source"
            )
            .expect("Failed to register fetch_errors"),

            ues_by_severity: register_int_gauge_vec!(
                "ranmon_ues_by_severity",
                "UEs in the latest snapshot grouped by worst finding severity",
                &["severity"]
            )
            .expect("Failed to register ues_by_severity"),

            ingest_buffer_entries: register_int_gauge!(
                "ranmon_ingest_buffer_entries",
                "Snapshots retained by the ingest endpoint"
            )
            .expect("Failed to register ingest_buffer_entries"),

            ingest_requests: register_int_counter_vec!(
                "ranmon_ingest_requests_total",
                "Ingest POST requests by outcome",
                &["outcome"]
            )
            .expect("Failed to register ingest_requests"),

            forwarded_snapshots: register_int_counter!(
                "ranmon_forwarded_snapshots_total",
                "Snapshots posted to the ingest endpoint by a parser"
            )
            .expect("Failed to register forwarded_snapshots"),

            forward_errors: register_int_counter!(
                "ranmon_forward_errors_total",
                "Failed snapshot posts after retries"
            )
            .expect("Failed to register forward_errors"),
        }
    }
}

/// Monitor metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct MonitorMetrics {
    _private: (),
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MonitorMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorMetrics").finish()
    }
}

impl MonitorMetrics {
    /// Create a new metrics handle (registers global metrics on first call)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &MonitorMetricsInner {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new)
    }

    pub fn observe_acquire_latency(&self, duration_secs: f64) {
        self.inner().acquire_latency_seconds.observe(duration_secs);
    }

    /// Record the outcome of one append
    pub fn record_append(&self, accepted: usize, rejected: usize, entries: usize) {
        let inner = self.inner();
        inner.snapshots_accepted.inc_by(accepted as u64);
        inner.snapshots_rejected.inc_by(rejected as u64);
        inner.log_entries.set(entries as i64);
    }

    pub fn set_log_entries(&self, entries: usize) {
        self.inner().log_entries.set(entries as i64);
    }

    pub fn inc_fetch_errors(&self) {
        self.inner().fetch_errors.inc();
    }

    /// Replace the per-severity UE counts with those of `assessments`
    pub fn set_severity_counts(&self, assessments: &[UeAssessment]) {
        for severity in [Severity::Info, Severity::Warning, Severity::Alert] {
            let count = assessments.iter().filter(|a| a.severity == severity).count();
            let label = severity.to_string();
            self.inner()
                .ues_by_severity
                .with_label_values(&[label.as_str()])
                .set(count as i64);
        }
    }

    pub fn set_ingest_buffer_entries(&self, entries: usize) {
        self.inner().ingest_buffer_entries.set(entries as i64);
    }

    pub fn inc_ingest_requests(&self, outcome: &str) {
        self.inner()
            .ingest_requests
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn inc_forwarded(&self, snapshots: usize) {
        self.inner().forwarded_snapshots.inc_by(snapshots as u64);
    }

    pub fn inc_forward_errors(&self) {
        self.inner().forward_errors.inc();
    }
}

/// Structured logger for monitor events
///
/// Provides consistent event-tagged logging for acquisition cycles,
/// store operations and health assessments.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Log process startup
    pub fn log_startup(&self, version: &str, mode: &str) {
        info!(
            event = "monitor_started",
            instance = %self.instance,
            version = %version,
            mode = %mode,
            "RAN monitor started"
        );
    }

    /// Log process shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "monitor_shutdown",
            instance = %self.instance,
            reason = %reason,
            "RAN monitor shutting down"
        );
    }

    /// Log a completed acquisition cycle
    pub fn log_cycle(
        &self,
        mode: &str,
        accepted: usize,
        rejected: usize,
        entries: usize,
        elapsed_ms: u128,
    ) {
        info!(
            event = "cycle_complete",
            instance = %self.instance,
            mode = %mode,
            accepted = accepted,
            rejected = rejected,
            entries = entries,
            elapsed_ms = elapsed_ms,
            "Acquisition cycle complete"
        );
    }

    /// Log a failed acquisition cycle
    pub fn log_fetch_failure(&self, endpoint: &str, error: &str) {
        warn!(
            event = "fetch_failed",
            instance = %self.instance,
            endpoint = %endpoint,
            error = %error,
            "No new data this cycle"
        );
    }

    /// Log an operator flush
    pub fn log_flush(&self, dropped: usize, cutoff_ms: i64) {
        warn!(
            event = "store_flushed",
            instance = %self.instance,
            dropped = dropped,
            cutoff_ms = cutoff_ms,
            "Store flushed and paused"
        );
    }

    /// Log one UE assessment; warnings and alerts are logged at warn level
    pub fn log_assessment(&self, assessment: &UeAssessment) {
        let codes: Vec<&str> = assessment.findings.iter().map(|f| f.code).collect();
        match assessment.severity {
            Severity::Info => {
                info!(
                    event = "findings_evaluated",
                    instance = %self.instance,
                    rnti = assessment.rnti,
                    pci = assessment.pci,
                    severity = %assessment.severity,
                    codes = ?codes,
                    "UE evaluated"
                );
            }
            Severity::Warning | Severity::Alert => {
                warn!(
                    event = "findings_evaluated",
                    instance = %self.instance,
                    rnti = assessment.rnti,
                    pci = assessment.pci,
                    severity = %assessment.severity,
                    codes = ?codes,
                    "UE degraded"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::Finding;

    #[test]
    fn test_monitor_metrics_creation() {
        let metrics = MonitorMetrics::new();

        metrics.observe_acquire_latency(0.004);
        metrics.record_append(3, 1, 3);
        metrics.inc_fetch_errors();
        metrics.set_ingest_buffer_entries(10);
        metrics.inc_ingest_requests("ok");
        metrics.inc_forwarded(2);
        metrics.set_severity_counts(&[]);

        // A second handle shares the registry
        MonitorMetrics::new().set_log_entries(4);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("gnb-lab-1");
        assert_eq!(logger.instance(), "gnb-lab-1");

        logger.log_assessment(&UeAssessment {
            rnti: 70,
            pci: 1,
            severity: Severity::Info,
            findings: Vec::<Finding>::new(),
        });
    }
}
