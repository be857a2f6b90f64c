//! Vendor log parsers
//!
//! Turns base-station console output into [`Snapshot`]s:
//! - srsRAN gNB console metric rows
//! - OAI gNB periodic MAC statistics (stateful, per RNTI)
//!
//! Parsers are driven line by line. [`ParseSession`] wires a parser to an
//! input file, the local sinks and an optional forwarder.

mod oai;
mod session;
mod sink;
mod srsran;

pub use oai::{OaiParser, OAI_SOURCE};
pub use session::{ParseSession, ParseSummary};
pub use sink::{CsvSink, NdjsonSink, CSV_COLUMNS};
pub use srsran::{convert_value, parse_row, SrsranParser, SRSRAN_SOURCE};

use crate::models::Snapshot;
use serde::Serialize;

/// Decode an RNTI token.
///
/// After an optional `0x` prefix, a token made only of decimal digits is
/// read as base 10; anything else is read as hex.
pub fn parse_rnti(token: &str) -> Option<u32> {
    let token = token.trim();
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    if digits.is_empty() {
        return None;
    }
    if digits.bytes().all(|b| b.is_ascii_digit()) {
        digits.parse().ok()
    } else {
        u32::from_str_radix(digits, 16).ok()
    }
}

/// Line-oriented snapshot parser
pub trait LineParser: Send {
    /// Feed one raw line observed at `now_ms`; returns a snapshot when the
    /// line completes one
    fn parse_line(&mut self, line: &str, now_ms: i64) -> Option<Snapshot>;

    /// Diagnostic counters accumulated so far
    fn counters(&self) -> &ParseCounters;
}

/// Which vendor format to parse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vendor {
    Srsran,
    Oai,
}

impl Vendor {
    /// A fresh parser for this format labelled `source`
    pub fn parser(self, source: Option<String>) -> Box<dyn LineParser> {
        match self {
            Vendor::Srsran => Box::new(SrsranParser::new(
                source.unwrap_or_else(|| SRSRAN_SOURCE.to_string()),
            )),
            Vendor::Oai => Box::new(OaiParser::new(
                source.unwrap_or_else(|| OAI_SOURCE.to_string()),
            )),
        }
    }
}

/// Per-parser line statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseCounters {
    pub lines: u64,
    pub ignored: u64,
    /// srsRAN metric rows
    pub rows: u64,
    pub header: u64,
    pub cqi: u64,
    pub dlsch: u64,
    pub ulsch: u64,
    pub dl_bytes: u64,
    pub ul_bytes: u64,
    pub lcid: u64,
    pub snapshots: u64,
}

/// Hands out strictly increasing millisecond timestamps.
///
/// Several snapshots parsed within the same millisecond would otherwise be
/// collapsed by timestamp deduplication downstream.
#[derive(Debug, Clone, Default)]
pub(crate) struct SnapshotClock {
    last: Option<i64>,
}

impl SnapshotClock {
    pub(crate) fn stamp(&mut self, now_ms: i64) -> i64 {
        let ts = match self.last {
            Some(last) if now_ms <= last => last + 1,
            _ => now_ms,
        };
        self.last = Some(ts);
        ts
    }
}
