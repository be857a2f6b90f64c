//! srsRAN gNB console metrics
//!
//! One console row carries a full UE record:
//!
//! ```text
//!  pci rnti | cqi ri mcs brate ok nok (%) dl_bs | pusch mcs brate ok nok (%) bsr
//!    1 4601 |  15  1  28  1.4k 10   0  0%     0 |  22.1  20  2.5M  5   0  0%  300
//! ```

use super::{parse_rnti, LineParser, ParseCounters, SnapshotClock};
use crate::models::{Snapshot, UeMetrics};
use regex::Regex;
use std::sync::OnceLock;

/// Source label for srsRAN snapshots
pub const SRSRAN_SOURCE: &str = "srsRAN";

fn row_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(concat!(
            r"^\s*(\d+)\s+([0-9a-fA-F]+)\s+(?:\|\s*)?",
            r"(\S+)\s+(\d+)\s+(\d+)\s+(\S+)\s+(\d+)\s+(\d+)\s+(\S+)\s+(\S+)\s*\|\s*",
            r"(\S+)\s+(\d+)\s+(\S+)\s+(\d+)\s+(\d+)\s+(\S+)\s+(\S+)",
        ))
        .expect("srsRAN row pattern is valid")
    })
}

/// Convert one console token to a number.
///
/// `1.4k` is 1400, `2.5M` is 2 500 000, `12%` is 12 and `n/a` is absent.
pub fn convert_value(token: &str) -> Option<f64> {
    let token = token.trim();
    if token.eq_ignore_ascii_case("n/a") {
        return None;
    }

    let (digits, scale) = if let Some(v) = token.strip_suffix(['k', 'K']) {
        (v, 1e3)
    } else if let Some(v) = token.strip_suffix('M') {
        (v, 1e6)
    } else if let Some(v) = token.strip_suffix('%') {
        (v, 1.0)
    } else {
        (token, 1.0)
    };

    digits
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v * scale)
}

/// Decode one metrics row into a UE record
pub fn parse_row(line: &str) -> Option<UeMetrics> {
    let caps = row_pattern().captures(line)?;
    let num = |i: usize| caps.get(i).and_then(|m| convert_value(m.as_str())).unwrap_or(0.0);

    let pci = caps.get(1)?.as_str().parse::<u32>().ok()?;
    let rnti = parse_rnti(caps.get(2)?.as_str())?;

    let mut ue = UeMetrics::new(pci, rnti);
    ue.downlink.cqi = num(3);
    ue.downlink.ri = num(4);
    ue.downlink.mcs = num(5);
    ue.downlink.bitrate = num(6);
    ue.downlink.packets_ok = num(7);
    ue.downlink.packets_nok = num(8);
    ue.downlink.drop_rate = num(9);
    ue.downlink.buffer_status = num(10);
    ue.uplink.pusch_sinr = num(11);
    ue.uplink.mcs = num(12);
    ue.uplink.bitrate = num(13);
    ue.uplink.packets_ok = num(14);
    ue.uplink.packets_nok = num(15);
    ue.uplink.drop_rate = num(16);
    ue.uplink.bsr = num(17);
    Some(ue)
}

/// Stateless row parser; every metrics row becomes one snapshot
#[derive(Debug, Clone)]
pub struct SrsranParser {
    source: String,
    clock: SnapshotClock,
    counters: ParseCounters,
}

impl Default for SrsranParser {
    fn default() -> Self {
        Self::new(SRSRAN_SOURCE)
    }
}

impl SrsranParser {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            clock: SnapshotClock::default(),
            counters: ParseCounters::default(),
        }
    }
}

impl LineParser for SrsranParser {
    fn parse_line(&mut self, line: &str, now_ms: i64) -> Option<Snapshot> {
        self.counters.lines += 1;

        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("pci") || trimmed.starts_with('-') {
            self.counters.ignored += 1;
            return None;
        }

        match parse_row(trimmed) {
            Some(ue) => {
                self.counters.rows += 1;
                self.counters.snapshots += 1;
                let ts = self.clock.stamp(now_ms);
                Some(Snapshot::new(ts, self.source.clone(), vec![ue]))
            }
            None => {
                self.counters.ignored += 1;
                None
            }
        }
    }

    fn counters(&self) -> &ParseCounters {
        &self.counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROW: &str =
        "   1 4601 |  15   1   28    1.4k   10    2  17%      0 |  22.1   20   2.5M    5    0   0%    300";

    #[test]
    fn test_convert_value() {
        assert_eq!(convert_value("1.4k"), Some(1400.0));
        assert_eq!(convert_value("2.5M"), Some(2_500_000.0));
        assert_eq!(convert_value("12%"), Some(12.0));
        assert_eq!(convert_value("n/a"), None);
        assert_eq!(convert_value("N/A"), None);
        assert_eq!(convert_value("7"), Some(7.0));
        assert_eq!(convert_value("-3.5"), Some(-3.5));
        assert_eq!(convert_value("abc"), None);
    }

    #[test]
    fn test_parse_row() {
        let ue = parse_row(ROW).unwrap();

        assert_eq!(ue.pci, 1);
        assert_eq!(ue.rnti, 4601);
        assert_eq!(ue.downlink.cqi, 15.0);
        assert_eq!(ue.downlink.bitrate, 1400.0);
        assert_eq!(ue.downlink.packets_nok, 2.0);
        assert_eq!(ue.downlink.drop_rate, 17.0);
        assert_eq!(ue.uplink.pusch_sinr, 22.1);
        assert_eq!(ue.uplink.bitrate, 2_500_000.0);
        assert_eq!(ue.uplink.bsr, 300.0);
        assert_eq!(ue.uplink.rsrp, 0.0);
    }

    #[test]
    fn test_parse_row_without_leading_separator() {
        let ue = parse_row("1 4602 15 1 28 3k 10 0 0% 0 | n/a 20 0 5 0 0% 0").unwrap();
        assert_eq!(ue.rnti, 4602);
        assert_eq!(ue.downlink.bitrate, 3000.0);
        assert_eq!(ue.uplink.pusch_sinr, 0.0);
    }

    #[test]
    fn test_headers_and_separators_ignored() {
        let mut parser = SrsranParser::default();

        assert!(parser
            .parse_line(" pci rnti | cqi ri mcs brate ok nok (%) dl_bs | pusch mcs brate ok nok (%) bsr", 1)
            .is_none());
        assert!(parser.parse_line("-----------------DL--------|------UL-----", 1).is_none());
        assert!(parser.parse_line("", 1).is_none());
        assert!(parser.parse_line("random console chatter", 1).is_none());

        let counters = parser.counters();
        assert_eq!(counters.lines, 4);
        assert_eq!(counters.ignored, 4);
        assert_eq!(counters.snapshots, 0);
    }

    #[test]
    fn test_rows_become_snapshots() {
        let mut parser = SrsranParser::default();

        let first = parser.parse_line(ROW, 1_000).unwrap();
        let second = parser.parse_line(ROW, 1_000).unwrap();

        assert_eq!(first.source, SRSRAN_SOURCE);
        assert_eq!(first.ues.len(), 1);
        assert!(second.timestamp > first.timestamp);
        assert_eq!(parser.counters().rows, 2);
    }
}
