//! Parser driver: input file to sinks and forwarder

use super::{CsvSink, LineParser, NdjsonSink, ParseCounters};
use crate::forwarder::{ForwardStats, Forwarder};
use crate::models::Snapshot;
use anyhow::{Context, Result};
use serde::Serialize;
use std::io::SeekFrom;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Delay between polls of a followed file at EOF
const FOLLOW_POLL: Duration = Duration::from_millis(100);

/// Totals reported when a session ends
#[derive(Debug, Clone, Serialize)]
pub struct ParseSummary {
    pub counters: ParseCounters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forward: Option<ForwardStats>,
}

/// One parser plus wherever its snapshots go
pub struct ParseSession {
    parser: Box<dyn LineParser>,
    ndjson: Option<NdjsonSink>,
    csv: Option<CsvSink>,
    forwarder: Option<Forwarder>,
}

impl ParseSession {
    pub fn new(parser: Box<dyn LineParser>) -> Self {
        Self {
            parser,
            ndjson: None,
            csv: None,
            forwarder: None,
        }
    }

    pub fn with_ndjson(mut self, sink: NdjsonSink) -> Self {
        self.ndjson = Some(sink);
        self
    }

    pub fn with_csv(mut self, sink: CsvSink) -> Self {
        self.csv = Some(sink);
        self
    }

    pub fn with_forwarder(mut self, forwarder: Forwarder) -> Self {
        self.forwarder = Some(forwarder);
        self
    }

    pub fn counters(&self) -> &ParseCounters {
        self.parser.counters()
    }

    /// Parse one line, write any snapshot to the sinks and queue it for
    /// forwarding
    pub async fn process_line(&mut self, line: &str) -> Result<Option<Snapshot>> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let snapshot = self.parser.parse_line(line, now_ms);

        if let Some(snapshot) = &snapshot {
            if let Some(sink) = &mut self.ndjson {
                sink.write(snapshot)?;
            }
            if let Some(sink) = &mut self.csv {
                sink.write(snapshot)?;
            }
            if let Some(forwarder) = &mut self.forwarder {
                forwarder.push(snapshot.clone());
            }
        }

        if let Some(forwarder) = &mut self.forwarder {
            forwarder.maybe_flush(false).await;
        }

        Ok(snapshot)
    }

    /// Read `path` to the end, or tail it from its current end when
    /// `follow` is set until `shutdown` fires.
    ///
    /// Buffered posts are flushed before returning, also when reading or
    /// writing fails part way.
    pub async fn run_file(
        mut self,
        path: &Path,
        follow: bool,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<ParseSummary> {
        let mut file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("Input file not found: {:?}", path))?;
        if follow {
            let offset = file
                .seek(SeekFrom::End(0))
                .await
                .context("Failed to seek to end of input")?;
            debug!(offset = offset, "Tailing from end of file");
        }
        let mut reader = BufReader::new(file);

        info!(path = ?path, follow = follow, "Reading base station output");

        let result = self.pump(&mut reader, follow, &mut shutdown).await;
        let summary = self.finish().await;
        result.map(|()| summary)
    }

    async fn pump(
        &mut self,
        reader: &mut BufReader<tokio::fs::File>,
        follow: bool,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<()> {
        let mut pending = String::new();
        loop {
            let read = tokio::select! {
                read = reader.read_line(&mut pending) => read.context("Failed to read input")?,
                _ = shutdown.recv() => {
                    debug!("Parse session interrupted");
                    return Ok(());
                }
            };

            if read == 0 || !pending.ends_with('\n') {
                if !follow {
                    if !pending.is_empty() {
                        let line = std::mem::take(&mut pending);
                        self.process_line(&line).await?;
                    }
                    return Ok(());
                }
                if let Some(forwarder) = &mut self.forwarder {
                    forwarder.maybe_flush(false).await;
                }
                tokio::select! {
                    _ = tokio::time::sleep(FOLLOW_POLL) => continue,
                    _ = shutdown.recv() => return Ok(()),
                }
            }

            let line = std::mem::take(&mut pending);
            self.process_line(&line).await?;
        }
    }

    /// Flush the forwarder and report totals
    pub async fn finish(mut self) -> ParseSummary {
        let forward = match &mut self.forwarder {
            Some(forwarder) => Some(forwarder.finish().await),
            None => None,
        };
        let counters = self.parser.counters().clone();

        info!(
            lines = counters.lines,
            snapshots = counters.snapshots,
            ignored = counters.ignored,
            "Parse session finished"
        );

        ParseSummary { counters, forward }
    }
}
