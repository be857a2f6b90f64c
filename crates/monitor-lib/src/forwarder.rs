//! Snapshot forwarding to a remote ingest endpoint
//!
//! Parsed snapshots are buffered and POSTed at most once per send interval.
//! Transient failures (connection errors, 429, 5xx) are retried with
//! exponential backoff; anything else fails the send immediately.

use crate::models::Snapshot;
use crate::observability::MonitorMetrics;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Which buffered snapshots a send carries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendOrder {
    /// Keep only the newest snapshot and send it
    #[default]
    Latest,
    /// Send the oldest snapshot first, one per interval
    Fifo,
    /// Send everything buffered as one array
    Batch,
}

impl std::fmt::Display for SendOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendOrder::Latest => write!(f, "latest"),
            SendOrder::Fifo => write!(f, "fifo"),
            SendOrder::Batch => write!(f, "batch"),
        }
    }
}

impl FromStr for SendOrder {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "latest" => Ok(SendOrder::Latest),
            "fifo" => Ok(SendOrder::Fifo),
            "batch" => Ok(SendOrder::Batch),
            other => anyhow::bail!("unknown send order '{}', expected latest, fifo or batch", other),
        }
    }
}

/// Configuration for the forwarder
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// Ingest endpoint URL
    pub url: String,
    /// Minimum time between sends (default: 1 second)
    pub send_interval: Duration,
    /// Per-request timeout (default: 5 seconds)
    pub timeout: Duration,
    /// Retries after the first attempt on transient failures (default: 3)
    pub max_retries: u32,
    /// First retry delay, doubled on each retry (default: 500 ms)
    pub backoff_base: Duration,
    pub order: SendOrder,
}

impl ForwarderConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            send_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(5),
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
            order: SendOrder::default(),
        }
    }
}

/// Forwarding counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ForwardStats {
    pub posted_requests: u64,
    pub posted_snapshots: u64,
    pub errors: u64,
}

/// Outcome of one POST attempt chain
#[derive(Debug)]
enum PostError {
    /// Worth retrying
    Transient(anyhow::Error),
    Permanent(anyhow::Error),
}

/// Buffers snapshots and POSTs them on schedule
pub struct Forwarder {
    client: reqwest::Client,
    config: ForwarderConfig,
    buffer: VecDeque<Snapshot>,
    last_send: Option<Instant>,
    stats: ForwardStats,
    metrics: MonitorMetrics,
}

impl Forwarder {
    pub fn new(config: ForwarderConfig) -> Result<Self> {
        url::Url::parse(&config.url)
            .with_context(|| format!("Invalid forward URL: {}", config.url))?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("ranmon/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            config,
            buffer: VecDeque::new(),
            last_send: None,
            stats: ForwardStats::default(),
            metrics: MonitorMetrics::new(),
        })
    }

    pub fn config(&self) -> &ForwarderConfig {
        &self.config
    }

    pub fn stats(&self) -> ForwardStats {
        self.stats
    }

    /// Snapshots waiting to be sent
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Queue a snapshot according to the send order
    pub fn push(&mut self, snapshot: Snapshot) {
        if self.config.order == SendOrder::Latest {
            self.buffer.clear();
        }
        self.buffer.push_back(snapshot);
    }

    fn is_due(&self) -> bool {
        match self.last_send {
            None => true,
            Some(last) => last.elapsed() >= self.config.send_interval,
        }
    }

    /// Send if the interval has elapsed (or `force`), returning the number
    /// of snapshots delivered
    pub async fn maybe_flush(&mut self, force: bool) -> usize {
        if self.buffer.is_empty() || !(force || self.is_due()) {
            return 0;
        }

        match self.config.order {
            SendOrder::Latest | SendOrder::Fifo => self.send_one().await,
            SendOrder::Batch => self.send_batch().await,
        }
    }

    /// Send everything still buffered, ignoring the interval
    pub async fn finish(&mut self) -> ForwardStats {
        let mut rounds = self.buffer.len();
        while !self.buffer.is_empty() && rounds > 0 {
            if self.maybe_flush(true).await == 0 {
                break;
            }
            rounds -= 1;
        }

        info!(
            posted_requests = self.stats.posted_requests,
            posted_snapshots = self.stats.posted_snapshots,
            errors = self.stats.errors,
            undelivered = self.buffer.len(),
            "Forwarder finished"
        );
        self.stats
    }

    async fn send_one(&mut self) -> usize {
        let item = match self.config.order {
            SendOrder::Fifo => self.buffer.pop_front(),
            _ => {
                let newest = self.buffer.pop_back();
                self.buffer.clear();
                newest
            }
        };
        let Some(item) = item else {
            return 0;
        };

        self.last_send = Some(Instant::now());
        match self.post_with_retry(&item).await {
            Ok(()) => {
                self.record_success(1);
                1
            }
            Err(e) => {
                self.record_failure(1, &e);
                if self.config.order == SendOrder::Fifo {
                    self.buffer.push_front(item);
                }
                0
            }
        }
    }

    async fn send_batch(&mut self) -> usize {
        let payload: Vec<Snapshot> = self.buffer.iter().cloned().collect();

        self.last_send = Some(Instant::now());
        match self.post_with_retry(&payload).await {
            Ok(()) => {
                self.buffer.clear();
                self.record_success(payload.len());
                payload.len()
            }
            Err(e) => {
                self.record_failure(payload.len(), &e);
                0
            }
        }
    }

    fn record_success(&mut self, snapshots: usize) {
        self.stats.posted_requests += 1;
        self.stats.posted_snapshots += snapshots as u64;
        self.metrics.inc_forwarded(snapshots);
        debug!(
            url = %self.config.url,
            snapshots = snapshots,
            order = %self.config.order,
            "Posted snapshots"
        );
    }

    fn record_failure(&mut self, snapshots: usize, error: &anyhow::Error) {
        self.stats.errors += 1;
        self.metrics.inc_forward_errors();
        warn!(
            url = %self.config.url,
            snapshots = snapshots,
            error = %error,
            "Failed to post snapshots, will retry after interval"
        );
    }

    async fn post_with_retry<T: Serialize + ?Sized>(&self, body: &T) -> Result<()> {
        let mut attempt = 0u32;
        let mut delay = self.config.backoff_base;

        loop {
            match self.post_once(body).await {
                Ok(()) => return Ok(()),
                Err(PostError::Permanent(e)) => return Err(e),
                Err(PostError::Transient(e)) => {
                    attempt += 1;
                    if attempt > self.config.max_retries {
                        return Err(e.context(format!("Gave up after {} retries", self.config.max_retries)));
                    }
                    debug!(
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient post failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }

    async fn post_once<T: Serialize + ?Sized>(&self, body: &T) -> Result<(), PostError> {
        let response = self
            .client
            .post(&self.config.url)
            .json(body)
            .send()
            .await
            .map_err(|e| PostError::Transient(anyhow::Error::new(e).context("POST failed")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let error = anyhow::anyhow!("Ingest endpoint returned {}", status);
        if status.as_u16() == 429 || status.is_server_error() {
            Err(PostError::Transient(error))
        } else {
            Err(PostError::Permanent(error))
        }
    }
}
