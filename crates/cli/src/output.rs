//! Output formatting utilities

use chrono::{TimeZone, Utc};
use clap::ValueEnum;
use colored::Colorize;
use monitor_lib::{Severity, Snapshot, UeAssessment};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

/// Print a table from a list of rows
pub fn print_rows<T: Tabled>(rows: Vec<T>) {
    if rows.is_empty() {
        println!("{}", "No items found".yellow());
        return;
    }
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a millisecond timestamp as UTC wall-clock time
pub fn format_timestamp(ms: i64) -> String {
    match Utc.timestamp_millis_opt(ms).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        None => ms.to_string(),
    }
}

/// RNTIs are conventionally shown in hex
pub fn format_rnti(rnti: u32) -> String {
    format!("0x{:04x}", rnti)
}

/// Format bits per second as Mbit/s
pub fn format_mbps(bps: f64) -> String {
    format!("{:.2}", bps / monitor_lib::BITS_PER_MBIT)
}

/// Format milliseconds as a short age string
pub fn format_age(ms: i64) -> String {
    if ms >= 60_000 {
        format!("{}m{}s", ms / 60_000, (ms % 60_000) / 1000)
    } else if ms >= 1000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{}ms", ms)
    }
}

/// Color severity based on value
pub fn color_severity(severity: Severity) -> String {
    let text = severity.to_string();
    match severity {
        Severity::Info => text.green().to_string(),
        Severity::Warning => text.yellow().to_string(),
        Severity::Alert => text.red().bold().to_string(),
    }
}

/// Row for the per-UE findings table
#[derive(Tabled)]
struct FindingRow {
    #[tabled(rename = "RNTI")]
    rnti: String,
    #[tabled(rename = "PCI")]
    pci: u32,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Finding")]
    title: String,
    #[tabled(rename = "Detail")]
    message: String,
}

/// Row for the per-UE metrics table
#[derive(Tabled)]
struct UeRow {
    #[tabled(rename = "RNTI")]
    rnti: String,
    #[tabled(rename = "PCI")]
    pci: u32,
    #[tabled(rename = "DL CQI")]
    dl_cqi: String,
    #[tabled(rename = "DL MCS")]
    dl_mcs: String,
    #[tabled(rename = "DL Mbps")]
    dl_mbps: String,
    #[tabled(rename = "DL Drop %")]
    dl_drop: String,
    #[tabled(rename = "UL SINR")]
    ul_sinr: String,
    #[tabled(rename = "UL Mbps")]
    ul_mbps: String,
    #[tabled(rename = "UL Drop %")]
    ul_drop: String,
}

/// Render assessments, one table row per finding
pub fn print_assessments(assessments: &[UeAssessment], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_json(assessments)?,
        OutputFormat::Table => {
            if assessments.is_empty() {
                print_warning("No UEs in the latest snapshot");
                return Ok(());
            }

            let rows = assessments
                .iter()
                .flat_map(|a| {
                    a.findings.iter().map(move |f| FindingRow {
                        rnti: format_rnti(a.rnti),
                        pci: a.pci,
                        severity: color_severity(f.severity),
                        title: f.title.to_string(),
                        message: f.message.clone(),
                    })
                })
                .collect();
            print_rows::<FindingRow>(rows);

            let alerts = assessments
                .iter()
                .filter(|a| a.severity == Severity::Alert)
                .count();
            let warnings = assessments
                .iter()
                .filter(|a| a.severity == Severity::Warning)
                .count();
            println!(
                "\n{} UEs, {} alert, {} warning",
                assessments.len(),
                alerts.to_string().red(),
                warnings.to_string().yellow()
            );
        }
    }
    Ok(())
}

/// Render one snapshot with its UE metrics
pub fn print_snapshot(snapshot: &Snapshot, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_json(snapshot)?,
        OutputFormat::Table => {
            println!("{}", "Latest Snapshot".bold());
            println!("{}", "=".repeat(50));
            println!("Source:     {}", snapshot.source.cyan());
            println!("Timestamp:  {}", format_timestamp(snapshot.timestamp));
            println!("UEs:        {}", snapshot.ues.len());
            println!();

            let rows = snapshot
                .ues
                .iter()
                .map(|ue| UeRow {
                    rnti: format_rnti(ue.rnti),
                    pci: ue.pci,
                    dl_cqi: format!("{:.1}", ue.downlink.cqi),
                    dl_mcs: format!("{:.0}", ue.downlink.mcs),
                    dl_mbps: format_mbps(ue.downlink.bitrate),
                    dl_drop: format!("{:.1}", ue.downlink.drop_rate),
                    ul_sinr: format!("{:.1}", ue.uplink.pusch_sinr),
                    ul_mbps: format_mbps(ue.uplink.bitrate),
                    ul_drop: format!("{:.1}", ue.uplink.drop_rate),
                })
                .collect();
            print_rows::<UeRow>(rows);
        }
    }
    Ok(())
}
