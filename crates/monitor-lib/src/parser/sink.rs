//! Local output sinks for parsed snapshots

use crate::models::Snapshot;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Column order of the CSV sink
pub const CSV_COLUMNS: &[&str] = &[
    "timestamp",
    "source",
    "pci",
    "rnti",
    "dl_cqi",
    "dl_ri",
    "dl_mcs",
    "dl_bitrate",
    "dl_packets_ok",
    "dl_packets_nok",
    "dl_drop_rate",
    "dl_buffer_status",
    "ul_pusch_sinr",
    "ul_rsrp",
    "ul_ri",
    "ul_mcs",
    "ul_bitrate",
    "ul_packets_ok",
    "ul_packets_nok",
    "ul_drop_rate",
    "ul_bsr",
    "ul_timing_advance",
    "ul_phr",
];

fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {:?}", path))
}

/// Writes one compact JSON snapshot per line
pub struct NdjsonSink {
    out: Box<dyn Write + Send>,
}

impl NdjsonSink {
    pub fn stdout() -> Self {
        Self {
            out: Box::new(io::stdout()),
        }
    }

    /// Append to `path`, creating it and its parent directory if needed
    pub fn file(path: &Path) -> Result<Self> {
        Ok(Self {
            out: Box::new(open_append(path)?),
        })
    }

    /// `-` or an empty string selects stdout
    pub fn open(target: &str) -> Result<Self> {
        if target.trim().is_empty() || target == "-" {
            Ok(Self::stdout())
        } else {
            Self::file(Path::new(target))
        }
    }

    pub fn from_writer(out: Box<dyn Write + Send>) -> Self {
        Self { out }
    }

    pub fn write(&mut self, snapshot: &Snapshot) -> Result<()> {
        serde_json::to_writer(&mut self.out, snapshot).context("Failed to encode snapshot")?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }
}

#[derive(Serialize)]
struct CsvRow<'a> {
    timestamp: i64,
    source: &'a str,
    pci: u32,
    rnti: u32,
    dl_cqi: f64,
    dl_ri: f64,
    dl_mcs: f64,
    dl_bitrate: f64,
    dl_packets_ok: f64,
    dl_packets_nok: f64,
    dl_drop_rate: f64,
    dl_buffer_status: f64,
    ul_pusch_sinr: f64,
    ul_rsrp: f64,
    ul_ri: f64,
    ul_mcs: f64,
    ul_bitrate: f64,
    ul_packets_ok: f64,
    ul_packets_nok: f64,
    ul_drop_rate: f64,
    ul_bsr: f64,
    ul_timing_advance: f64,
    ul_phr: f64,
}

/// Flattens snapshots into one CSV row per UE
pub struct CsvSink {
    writer: csv::Writer<File>,
}

impl CsvSink {
    /// Append to `path`; the header is written only when the file is new or empty
    pub fn open(path: &Path) -> Result<Self> {
        let is_new = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
        let file = open_append(path)?;
        let writer = csv::WriterBuilder::new()
            .has_headers(is_new)
            .from_writer(file);
        Ok(Self { writer })
    }

    pub fn write(&mut self, snapshot: &Snapshot) -> Result<()> {
        for ue in &snapshot.ues {
            let (dl, ul) = (&ue.downlink, &ue.uplink);
            self.writer
                .serialize(CsvRow {
                    timestamp: snapshot.timestamp,
                    source: &snapshot.source,
                    pci: ue.pci,
                    rnti: ue.rnti,
                    dl_cqi: dl.cqi,
                    dl_ri: dl.ri,
                    dl_mcs: dl.mcs,
                    dl_bitrate: dl.bitrate,
                    dl_packets_ok: dl.packets_ok,
                    dl_packets_nok: dl.packets_nok,
                    dl_drop_rate: dl.drop_rate,
                    dl_buffer_status: dl.buffer_status,
                    ul_pusch_sinr: ul.pusch_sinr,
                    ul_rsrp: ul.rsrp,
                    ul_ri: ul.ri,
                    ul_mcs: ul.mcs,
                    ul_bitrate: ul.bitrate,
                    ul_packets_ok: ul.packets_ok,
                    ul_packets_nok: ul.packets_nok,
                    ul_drop_rate: ul.drop_rate,
                    ul_bsr: ul.bsr,
                    ul_timing_advance: ul.timing_advance,
                    ul_phr: ul.phr,
                })
                .context("Failed to write CSV row")?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
