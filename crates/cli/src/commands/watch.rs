//! Live monitoring: poll into the persisted store and re-render findings

use anyhow::Result;
use colored::Colorize;
use monitor_lib::{
    ComponentStatus, CycleOutcome, CycleReport, HealthRegistry, PollerBuilder, SnapshotStore,
    SourceMode, StoreConfig, StructuredLogger, UeAssessment,
};
use serde::Serialize;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::output::{format_age, print_assessments, print_warning, OutputFormat};

const CLI_VERSION: &str = env!("CARGO_PKG_VERSION");
const INSTANCE: &str = "ranmon-cli";

/// Options for `ranmon watch`
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Persisted as the store mode before polling starts
    pub mode: Option<SourceMode>,
    /// Persisted as the store endpoint before polling starts
    pub endpoint: Option<String>,
    pub interval: Duration,
    pub capacity: usize,
    pub history: usize,
    /// Stop after this many rendered cycles
    pub cycles: Option<u64>,
}

/// One JSON line per cycle
#[derive(Serialize)]
struct CycleLine<'a> {
    cycle: u64,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    accepted: usize,
    entries: usize,
    assessments: &'a [UeAssessment],
}

impl<'a> CycleLine<'a> {
    fn from_report(report: &'a CycleReport) -> Self {
        let (outcome, error, accepted) = match &report.outcome {
            CycleOutcome::Paused => ("paused", None, 0),
            CycleOutcome::Appended { accepted, .. } => ("appended", None, *accepted),
            CycleOutcome::Failed { error, .. } => ("failed", Some(error.as_str()), 0),
        };
        Self {
            cycle: report.cycle,
            outcome,
            error,
            accepted,
            entries: report.entries,
            assessments: &report.assessments,
        }
    }
}

/// Run the poller until Ctrl-C (or `cycles` reports), rendering each cycle
pub async fn watch(state_dir: PathBuf, options: WatchOptions, format: OutputFormat) -> Result<()> {
    let store = Arc::new(SnapshotStore::open(StoreConfig {
        capacity: options.capacity,
        state_dir: Some(state_dir),
        ..Default::default()
    }));
    if let Some(mode) = options.mode {
        store.set_mode(mode);
    }
    if let Some(endpoint) = &options.endpoint {
        store.set_endpoint(endpoint.as_str());
    }

    let logger = StructuredLogger::new(INSTANCE);
    logger.log_startup(CLI_VERSION, &store.mode().to_string());

    let health = HealthRegistry::new();
    let poller = PollerBuilder::new()
        .store(store.clone())
        .health(health.clone())
        .interval(options.interval)
        .history_limit(options.history)
        .instance(INSTANCE)
        .build()?;
    let handle = poller.spawn();
    let mut reports = handle.reports();

    let mut rendered = 0u64;
    let reason = loop {
        tokio::select! {
            changed = reports.changed() => {
                if changed.is_err() {
                    break "poller stopped";
                }
                let report = reports.borrow_and_update().clone();
                if let Some(report) = report {
                    let status = health.health().await.status;
                    render(&report, &store, status, format)?;
                    rendered += 1;
                    if options.cycles.is_some_and(|n| rendered >= n) {
                        break "cycle limit reached";
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                break "interrupted";
            }
        }
    };

    debug!(rendered = rendered, reason = reason, "Stopping watch");
    logger.log_shutdown(reason);
    handle.shutdown().await?;
    Ok(())
}

fn render(
    report: &CycleReport,
    store: &SnapshotStore,
    status: ComponentStatus,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(&CycleLine::from_report(report))?);
        }
        OutputFormat::Table => {
            if std::io::stdout().is_terminal() {
                // Clear screen and home the cursor
                print!("\x1B[2J\x1B[H");
            }

            let stats = store.stats();
            println!(
                "{} #{}  mode {}  entries {}/{}  {}  [{}]",
                "Cycle".bold(),
                report.cycle,
                stats.mode.to_string().cyan(),
                report.entries,
                stats.capacity,
                outcome_label(&report.outcome),
                status_label(status)
            );
            if let Some(age) = stats.last_update_age_ms {
                println!("{}", format!("last update {} ago", format_age(age)).dimmed());
            }
            println!();

            if let CycleOutcome::Failed { error, .. } = &report.outcome {
                print_warning(&format!("Fetch from {} failed: {}", stats.endpoint, error));
            }
            print_assessments(&report.assessments, format)?;
        }
    }
    Ok(())
}

fn status_label(status: ComponentStatus) -> String {
    match status {
        ComponentStatus::Healthy => "healthy".green().to_string(),
        ComponentStatus::Degraded => "degraded".yellow().to_string(),
        ComponentStatus::Unhealthy => "unhealthy".red().to_string(),
    }
}

fn outcome_label(outcome: &CycleOutcome) -> String {
    match outcome {
        CycleOutcome::Paused => "paused".yellow().to_string(),
        CycleOutcome::Appended {
            accepted, rejected, ..
        } => format!("+{} accepted, {} rejected", accepted, rejected)
            .green()
            .to_string(),
        CycleOutcome::Failed { .. } => "fetch failed".red().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cycle_line_for_failure() {
        let report = CycleReport {
            cycle: 4,
            outcome: CycleOutcome::Failed {
                mode: SourceMode::Api,
                error: "connection refused".to_string(),
            },
            entries: 0,
            assessments: Vec::new(),
        };

        let json = serde_json::to_value(CycleLine::from_report(&report)).unwrap();

        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["error"], "connection refused");
        assert_eq!(json["cycle"], 4);
    }

    #[tokio::test]
    async fn test_watch_mock_cycles_persist_snapshots() {
        let dir = TempDir::new().unwrap();
        let options = WatchOptions {
            mode: Some(SourceMode::Mock),
            endpoint: None,
            interval: Duration::from_millis(20),
            capacity: 100,
            history: 10,
            cycles: Some(2),
        };

        watch(dir.path().to_path_buf(), options, OutputFormat::Json)
            .await
            .unwrap();

        let store = SnapshotStore::open(StoreConfig {
            state_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        });
        assert!(!store.is_empty());
        assert_eq!(store.mode(), SourceMode::Mock);
    }
}
