//! OAI gNB periodic MAC statistics
//!
//! OAI prints a block of lines per UE every stats period. Values arrive on
//! separate lines, so the parser keeps per-RNTI state and emits a snapshot
//! for the UE when its uplink byte counter or an LCID line is seen.

use super::{parse_rnti, LineParser, ParseCounters, SnapshotClock};
use crate::models::{Snapshot, UeMetrics};
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::trace;

/// Default source label for OAI snapshots
pub const OAI_SOURCE: &str = "OAI";

struct Patterns {
    header: Regex,
    cqi: Regex,
    dlsch: Regex,
    ulsch: Regex,
    ulsch_dtx_first: Regex,
    dl_bytes: Regex,
    ul_bytes: Regex,
    lcid: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let compile = |p: &str| Regex::new(p).expect("OAI stats pattern is valid");
        Patterns {
            header: compile(concat!(
                r"(?i)UE RNTI (?:0x)?(?P<rnti>[0-9a-f]+)\b.*?PH (?P<phr>-?\d+(?:\.\d+)?) dB",
                r".*?PCMAX (?P<pcmax>-?\d+(?:\.\d+)?) dBm",
                r"(?:, average RSRP (?P<rsrp>-?\d+(?:\.\d+)?))?",
            )),
            cqi: compile(r"(?i)UE (?:0x)?(?P<rnti>[0-9a-f]+): CQI (?P<cqi>\d+), RI (?P<ri>\d+)"),
            dlsch: compile(concat!(
                r"(?i)UE (?:0x)?(?P<rnti>[0-9a-f]+): dlsch_rounds (?P<a>\d+)/\d+/\d+/\d+, ",
                r"dlsch_errors (?P<errors>\d+), .*?MCS (?:\(\d+\) )?(?P<mcs>\d+)",
            )),
            ulsch: compile(concat!(
                r"(?i)UE (?:0x)?(?P<rnti>[0-9a-f]+): ulsch_rounds (?P<a>\d+)/\d+/\d+/\d+, ",
                r"ulsch_errors (?P<errors>\d+), .*?MCS (?:\(\d+\) )?(?P<mcs>\d+)",
                r"(?:.*?SNR (?P<snr>-?\d+(?:\.\d+)?) dB)?",
            )),
            ulsch_dtx_first: compile(concat!(
                r"(?i)UE (?:0x)?(?P<rnti>[0-9a-f]+): ulsch_rounds (?P<a>\d+)/\d+/\d+/\d+, ",
                r"ulsch_DTX \d+, ulsch_errors (?P<errors>\d+), .*?MCS (?:\(\d+\) )?(?P<mcs>\d+)",
                r"(?:.*?SNR (?P<snr>-?\d+(?:\.\d+)?) dB)?",
            )),
            dl_bytes: compile(r"(?i)UE (?:0x)?(?P<rnti>[0-9a-f]+): dlsch_total_bytes (?P<bytes>\d+)"),
            ul_bytes: compile(
                r"(?i)UE (?:0x)?(?P<rnti>[0-9a-f]+): ulsch_total_bytes_received (?P<bytes>\d+)",
            ),
            lcid: compile(r"(?i)UE (?:0x)?(?P<rnti>[0-9a-f]+): LCID \d+:"),
        }
    })
}

/// HARQ round and error counters for one direction
#[derive(Debug, Clone, Copy, Default)]
struct LinkCounters {
    rounds: u64,
    errors: u64,
}

impl LinkCounters {
    fn packets_ok(&self) -> f64 {
        self.rounds.saturating_sub(self.errors) as f64
    }

    fn packets_nok(&self) -> f64 {
        self.errors as f64
    }

    fn drop_rate(&self) -> f64 {
        if self.rounds == 0 {
            0.0
        } else {
            self.errors as f64 * 100.0 / self.rounds as f64
        }
    }
}

/// Cumulative byte counter turned into a rate
#[derive(Debug, Clone, Copy, Default)]
struct ByteRate {
    last: Option<(u64, i64)>,
    bitrate: f64,
}

impl ByteRate {
    /// Record `total` bytes seen at `now_ms`; the first sample yields no rate
    fn observe(&mut self, total: u64, now_ms: i64) {
        if let Some((prev_total, prev_ms)) = self.last {
            let dt_s = (now_ms - prev_ms) as f64 / 1000.0;
            if dt_s > 0.0 {
                let delta = total.saturating_sub(prev_total);
                self.bitrate = delta as f64 * 8.0 / dt_s;
            }
        }
        self.last = Some((total, now_ms));
    }
}

#[derive(Debug, Clone, Default)]
struct UeState {
    phr: Option<f64>,
    pcmax: Option<f64>,
    rsrp: Option<f64>,
    cqi: Option<f64>,
    ri: Option<f64>,
    dl_mcs: Option<f64>,
    ul_mcs: Option<f64>,
    ul_snr: Option<f64>,
    dl: LinkCounters,
    ul: LinkCounters,
    dl_rate: ByteRate,
    ul_rate: ByteRate,
}

impl UeState {
    fn to_metrics(&self, rnti: u32) -> UeMetrics {
        let mut ue = UeMetrics::new(0, rnti);

        ue.downlink.cqi = self.cqi.unwrap_or(0.0);
        ue.downlink.ri = self.ri.unwrap_or(0.0);
        ue.downlink.mcs = self.dl_mcs.unwrap_or(0.0);
        ue.downlink.bitrate = self.dl_rate.bitrate.round();
        ue.downlink.packets_ok = self.dl.packets_ok();
        ue.downlink.packets_nok = self.dl.packets_nok();
        ue.downlink.drop_rate = self.dl.drop_rate();

        ue.uplink.pusch_sinr = self.ul_snr.unwrap_or(0.0);
        ue.uplink.rsrp = self.rsrp.unwrap_or(0.0);
        ue.uplink.mcs = self.ul_mcs.unwrap_or(0.0);
        ue.uplink.bitrate = self.ul_rate.bitrate.round();
        ue.uplink.packets_ok = self.ul.packets_ok();
        ue.uplink.packets_nok = self.ul.packets_nok();
        ue.uplink.drop_rate = self.ul.drop_rate();
        ue.uplink.phr = self.phr.unwrap_or(0.0);
        ue
    }
}

fn rnti_of(caps: &Captures<'_>) -> Option<u32> {
    parse_rnti(caps.name("rnti")?.as_str())
}

fn float_of(caps: &Captures<'_>, name: &str) -> Option<f64> {
    caps.name(name)?.as_str().parse().ok()
}

fn int_of(caps: &Captures<'_>, name: &str) -> Option<u64> {
    caps.name(name)?.as_str().parse().ok()
}

/// Stateful parser for OAI periodic stats
#[derive(Debug, Clone)]
pub struct OaiParser {
    source: String,
    ues: HashMap<u32, UeState>,
    clock: SnapshotClock,
    counters: ParseCounters,
}

impl Default for OaiParser {
    fn default() -> Self {
        Self::new(OAI_SOURCE)
    }
}

impl OaiParser {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ues: HashMap::new(),
            clock: SnapshotClock::default(),
            counters: ParseCounters::default(),
        }
    }

    /// Power class maximum last reported for `rnti`, in dBm
    pub fn pcmax(&self, rnti: u32) -> Option<f64> {
        self.ues.get(&rnti).and_then(|ue| ue.pcmax)
    }

    /// Number of RNTIs with accumulated state
    pub fn tracked_ues(&self) -> usize {
        self.ues.len()
    }

    fn emit(&mut self, rnti: u32, now_ms: i64, reason: &str) -> Option<Snapshot> {
        let ue = self.ues.get(&rnti)?.to_metrics(rnti);
        let ts = self.clock.stamp(now_ms);
        self.counters.snapshots += 1;
        trace!(rnti = rnti, reason = reason, "Emitting OAI snapshot");
        Some(Snapshot::new(ts, self.source.clone(), vec![ue]))
    }
}

impl LineParser for OaiParser {
    fn parse_line(&mut self, line: &str, now_ms: i64) -> Option<Snapshot> {
        self.counters.lines += 1;

        let s = line.trim();
        if s.is_empty() || s.starts_with('[') {
            self.counters.ignored += 1;
            return None;
        }

        let p = patterns();

        if let Some(caps) = p.header.captures(s) {
            let rnti = rnti_of(&caps)?;
            let ue = self.ues.entry(rnti).or_default();
            ue.phr = float_of(&caps, "phr").or(ue.phr);
            ue.pcmax = float_of(&caps, "pcmax").or(ue.pcmax);
            ue.rsrp = float_of(&caps, "rsrp").or(ue.rsrp);
            self.counters.header += 1;
            return None;
        }

        if let Some(caps) = p.cqi.captures(s) {
            let rnti = rnti_of(&caps)?;
            let ue = self.ues.entry(rnti).or_default();
            ue.cqi = float_of(&caps, "cqi");
            ue.ri = float_of(&caps, "ri");
            self.counters.cqi += 1;
            return None;
        }

        if let Some(caps) = p.dlsch.captures(s) {
            let rnti = rnti_of(&caps)?;
            let ue = self.ues.entry(rnti).or_default();
            ue.dl = LinkCounters {
                rounds: int_of(&caps, "a").unwrap_or(0),
                errors: int_of(&caps, "errors").unwrap_or(0),
            };
            ue.dl_mcs = float_of(&caps, "mcs");
            self.counters.dlsch += 1;
            return None;
        }

        if let Some(caps) = p.ulsch.captures(s).or_else(|| p.ulsch_dtx_first.captures(s)) {
            let rnti = rnti_of(&caps)?;
            let ue = self.ues.entry(rnti).or_default();
            ue.ul = LinkCounters {
                rounds: int_of(&caps, "a").unwrap_or(0),
                errors: int_of(&caps, "errors").unwrap_or(0),
            };
            ue.ul_mcs = float_of(&caps, "mcs");
            if let Some(snr) = float_of(&caps, "snr") {
                ue.ul_snr = Some(snr);
            }
            self.counters.ulsch += 1;
            return None;
        }

        if let Some(caps) = p.dl_bytes.captures(s) {
            let rnti = rnti_of(&caps)?;
            let total = int_of(&caps, "bytes")?;
            self.ues.entry(rnti).or_default().dl_rate.observe(total, now_ms);
            self.counters.dl_bytes += 1;
            return None;
        }

        if let Some(caps) = p.ul_bytes.captures(s) {
            let rnti = rnti_of(&caps)?;
            let total = int_of(&caps, "bytes")?;
            self.ues.entry(rnti).or_default().ul_rate.observe(total, now_ms);
            self.counters.ul_bytes += 1;
            return self.emit(rnti, now_ms, "ul_bytes");
        }

        if let Some(caps) = p.lcid.captures(s) {
            let rnti = rnti_of(&caps)?;
            self.ues.entry(rnti).or_default();
            self.counters.lcid += 1;
            return self.emit(rnti, now_ms, "lcid");
        }

        self.counters.ignored += 1;
        None
    }

    fn counters(&self) -> &ParseCounters {
        &self.counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK: &[&str] = &[
        "[NR_MAC]   Frame.Slot 128.0",
        "UE RNTI 4601 CU-UE-ID 1 in-sync PH 52 dB PCMAX 24 dBm, average RSRP -83 (16 meas)",
        "UE 4601: CQI 15, RI 2, PMI (0,0)",
        "UE 4601: dlsch_rounds 200/3/0/0, dlsch_errors 10, pucch0_DTX 2, BLER 0.01 MCS (1) 27",
        "UE 4601: ulsch_rounds 100/1/0/0, ulsch_errors 25, ulsch_DTX 0, BLER 0.02 MCS (1) 20 (Qm 6 deltaMCS 0 dB) NPRB 5  SNR 27.5 dB",
        "UE 4601: dlsch_total_bytes 1000",
        "UE 4601: ulsch_total_bytes_received 500",
    ];

    fn feed(parser: &mut OaiParser, lines: &[&str], now_ms: i64) -> Vec<Snapshot> {
        lines
            .iter()
            .filter_map(|line| parser.parse_line(line, now_ms))
            .collect()
    }

    #[test]
    fn test_block_emits_snapshot_on_ul_bytes() {
        let mut parser = OaiParser::default();
        let snapshots = feed(&mut parser, BLOCK, 10_000);

        assert_eq!(snapshots.len(), 1);
        let snapshot = &snapshots[0];
        assert_eq!(snapshot.source, OAI_SOURCE);
        assert_eq!(snapshot.timestamp, 10_000);

        let ue = &snapshot.ues[0];
        assert_eq!(ue.rnti, 4601);
        assert_eq!(ue.downlink.cqi, 15.0);
        assert_eq!(ue.downlink.ri, 2.0);
        assert_eq!(ue.downlink.mcs, 27.0);
        assert_eq!(ue.downlink.packets_ok, 190.0);
        assert_eq!(ue.downlink.packets_nok, 10.0);
        assert_eq!(ue.downlink.drop_rate, 5.0);
        assert_eq!(ue.uplink.drop_rate, 25.0);
        assert_eq!(ue.uplink.mcs, 20.0);
        assert_eq!(ue.uplink.pusch_sinr, 27.5);
        assert_eq!(ue.uplink.rsrp, -83.0);
        assert_eq!(ue.uplink.phr, 52.0);
        // First byte counter sample has no rate yet
        assert_eq!(ue.downlink.bitrate, 0.0);
        assert_eq!(ue.uplink.bitrate, 0.0);

        assert_eq!(parser.pcmax(4601), Some(24.0));
        let counters = parser.counters();
        assert_eq!(counters.header, 1);
        assert_eq!(counters.ignored, 1);
        assert_eq!(counters.snapshots, 1);
    }

    #[test]
    fn test_bitrate_from_byte_counter_deltas() {
        let mut parser = OaiParser::default();
        feed(&mut parser, BLOCK, 10_000);

        let next = feed(
            &mut parser,
            &[
                "UE 4601: dlsch_total_bytes 251000",
                "UE 4601: ulsch_total_bytes_received 125500",
            ],
            11_000,
        );

        let ue = &next[0].ues[0];
        assert_eq!(ue.downlink.bitrate, 2_000_000.0);
        assert_eq!(ue.uplink.bitrate, 1_000_000.0);
    }

    #[test]
    fn test_simple_ulsch_variant_and_zero_rounds() {
        let mut parser = OaiParser::default();
        let snapshots = feed(
            &mut parser,
            &[
                "UE 0x1a2b: ulsch_rounds 0/0/0/0, ulsch_DTX 0, ulsch_errors 0, BLER 0.00 MCS 9",
                "UE 1a2b: LCID 4: 1024 bytes TX",
            ],
            5,
        );

        assert_eq!(snapshots.len(), 1);
        let ue = &snapshots[0].ues[0];
        assert_eq!(ue.rnti, 0x1a2b);
        assert_eq!(ue.uplink.mcs, 9.0);
        assert_eq!(ue.uplink.drop_rate, 0.0);
        assert_eq!(parser.counters().lcid, 1);
    }

    #[test]
    fn test_multiple_ues_tracked_independently() {
        let mut parser = OaiParser::new("lab");
        let snapshots = feed(
            &mut parser,
            &[
                "UE 4601: CQI 3, RI 1, PMI (0,0)",
                "UE 4602: CQI 12, RI 1, PMI (0,0)",
                "UE 4602: LCID 1: 10 bytes TX",
                "UE 4601: LCID 1: 10 bytes TX",
            ],
            100,
        );

        assert_eq!(parser.tracked_ues(), 2);
        assert_eq!(snapshots[0].ues[0].downlink.cqi, 12.0);
        assert_eq!(snapshots[1].ues[0].downlink.cqi, 3.0);
        assert!(snapshots[1].timestamp > snapshots[0].timestamp);
        assert_eq!(snapshots[0].source, "lab");
    }
}
