//! Rule-based health inference for UEs
//!
//! This module provides:
//! - Threshold rules on drop rate and channel quality
//! - Throughput trend detection over recent history
//! - Congestion hints from buffer occupancy
//! - A fallback "healthy" finding when nothing fires

mod engine;
mod trend;

pub use engine::{InferenceEngine, InferenceThresholds, UeAssessment};
pub use trend::{index_slope, MIN_TREND_SAMPLES};

use serde::{Deserialize, Serialize};

/// Finding severity, ordered info < warning < alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Alert,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Alert => write!(f, "alert"),
        }
    }
}

/// One rule's classified output for one UE
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    /// Stable rule code, e.g. `dl_drops_alert`
    pub code: &'static str,
    pub title: &'static str,
    pub message: String,
    pub severity: Severity,
}

impl Finding {
    fn new(code: &'static str, title: &'static str, severity: Severity, message: String) -> Self {
        Self {
            code,
            title,
            message,
            severity,
        }
    }
}

/// Highest severity among `findings`
pub fn worst_severity(findings: &[Finding]) -> Option<Severity> {
    findings.iter().map(|f| f.severity).max()
}
