//! Periodic snapshot acquisition
//!
//! The poller owns the single repeating acquisition task. Each tick, unless
//! the store is paused, it asks the source selected by the store's mode for
//! a batch and appends it. Cycles run one after another inside the task, so
//! two appends never race.

use crate::health::{components, HealthRegistry};
use crate::inference::{InferenceEngine, UeAssessment};
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::source::SourceSet;
use crate::store::{SnapshotStore, SourceMode, DEFAULT_HISTORY_LIMIT};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Configuration for the poller
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Time between acquisition cycles (default: 3 seconds)
    pub interval: Duration,
    /// History samples handed to the inference engine per UE
    pub history_limit: usize,
    /// Instance label used in structured logs
    pub instance: String,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            history_limit: DEFAULT_HISTORY_LIMIT,
            instance: "ranmon".to_string(),
        }
    }
}

/// What happened in one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The store was paused; the source was not contacted
    Paused,
    /// A batch was acquired and offered to the store
    Appended {
        mode: SourceMode,
        accepted: usize,
        rejected: usize,
    },
    /// The source could not be reached; the store is unchanged
    Failed { mode: SourceMode, error: String },
}

/// Result of one cycle plus the assessment of the newest snapshot
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle: u64,
    pub outcome: CycleOutcome,
    pub entries: usize,
    pub assessments: Vec<UeAssessment>,
}

/// Drives acquisition into a shared snapshot store
pub struct Poller {
    store: Arc<SnapshotStore>,
    sources: SourceSet,
    engine: InferenceEngine,
    health: Option<HealthRegistry>,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
    config: PollerConfig,
    cycles: u64,
    reports: watch::Sender<Option<CycleReport>>,
}

impl Poller {
    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    /// Receive the report of every completed cycle
    pub fn subscribe(&self) -> watch::Receiver<Option<CycleReport>> {
        self.reports.subscribe()
    }

    /// Run exactly one acquisition cycle
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.cycles += 1;
        self.store.sync_control_state();

        let outcome = if self.store.is_paused() {
            debug!("Store paused, skipping acquisition");
            if let Some(health) = &self.health {
                health
                    .set_degraded(components::STORE, "Acquisition paused")
                    .await;
            }
            CycleOutcome::Paused
        } else {
            if let Some(health) = &self.health {
                health.set_healthy(components::STORE).await;
            }
            self.acquire_and_append().await
        };

        let assessments = match self.store.latest() {
            Some(latest) => {
                self.engine
                    .assess_snapshot(&latest, &self.store, self.config.history_limit)
            }
            None => Vec::new(),
        };
        self.metrics.set_severity_counts(&assessments);

        let report = CycleReport {
            cycle: self.cycles,
            outcome,
            entries: self.store.len(),
            assessments,
        };
        self.reports.send_replace(Some(report.clone()));
        report
    }

    async fn acquire_and_append(&self) -> CycleOutcome {
        let mode = self.store.mode();
        let endpoint = self.store.endpoint();
        let source = match mode {
            SourceMode::Mock => &self.sources.mock,
            SourceMode::Api => &self.sources.remote,
        };

        let start = Instant::now();
        let result = source.acquire(&endpoint).await;
        let elapsed = start.elapsed();
        self.metrics.observe_acquire_latency(elapsed.as_secs_f64());

        match result {
            Ok(batch) => {
                let outcome = self.store.append(batch);
                let entries = self.store.len();
                self.metrics
                    .record_append(outcome.accepted, outcome.rejected, entries);
                self.logger.log_cycle(
                    &mode.to_string(),
                    outcome.accepted,
                    outcome.rejected,
                    entries,
                    elapsed.as_millis(),
                );

                if let Some(health) = &self.health {
                    health.set_healthy(components::POLLER).await;
                    if outcome.accepted > 0 {
                        health
                            .record_update(chrono::Utc::now().timestamp_millis())
                            .await;
                    }
                }

                CycleOutcome::Appended {
                    mode,
                    accepted: outcome.accepted,
                    rejected: outcome.rejected,
                }
            }
            Err(e) => {
                let error = format!("{:#}", e);
                self.metrics.inc_fetch_errors();
                self.logger.log_fetch_failure(&endpoint, &error);

                if let Some(health) = &self.health {
                    health
                        .set_degraded(components::POLLER, format!("Acquisition failed: {}", error))
                        .await;
                }

                CycleOutcome::Failed { mode, error }
            }
        }
    }

    /// Run cycles until a shutdown signal arrives
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            mode = %self.store.mode(),
            paused = self.store.is_paused(),
            "Starting poller"
        );

        if let Some(health) = &self.health {
            health.register(components::POLLER).await;
            health.register(components::STORE).await;
        }

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                _ = shutdown.recv() => {
                    info!(cycles = self.cycles, "Shutting down poller");
                    break;
                }
            }
        }
    }

    /// Start the repeating task in the background
    pub fn spawn(self) -> PollerHandle {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let reports = self.subscribe();
        let task = tokio::spawn(self.run(shutdown_rx));

        PollerHandle {
            shutdown_tx,
            reports,
            task,
        }
    }
}

/// Handle to a running poller
pub struct PollerHandle {
    shutdown_tx: broadcast::Sender<()>,
    reports: watch::Receiver<Option<CycleReport>>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn reports(&self) -> watch::Receiver<Option<CycleReport>> {
        self.reports.clone()
    }

    /// Stop the repeating task and wait for the in-flight cycle to finish
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown_tx.send(());
        self.task.await?;
        Ok(())
    }
}

/// Builder for wiring a poller
pub struct PollerBuilder {
    store: Option<Arc<SnapshotStore>>,
    sources: Option<SourceSet>,
    engine: InferenceEngine,
    health: Option<HealthRegistry>,
    config: PollerConfig,
}

impl Default for PollerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PollerBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            sources: None,
            engine: InferenceEngine::default(),
            health: None,
            config: PollerConfig::default(),
        }
    }

    pub fn store(mut self, store: Arc<SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn sources(mut self, sources: SourceSet) -> Self {
        self.sources = Some(sources);
        self
    }

    pub fn engine(mut self, engine: InferenceEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn history_limit(mut self, limit: usize) -> Self {
        self.config.history_limit = limit;
        self
    }

    pub fn instance(mut self, instance: impl Into<String>) -> Self {
        self.config.instance = instance.into();
        self
    }

    /// Build the poller. Sources default to [`SourceSet::standard`].
    pub fn build(self) -> Result<Poller> {
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("Snapshot store not set"))?;
        if self.config.interval.is_zero() {
            anyhow::bail!("Poll interval must be greater than zero");
        }
        let sources = match self.sources {
            Some(sources) => sources,
            None => SourceSet::standard()?,
        };

        let (reports, _) = watch::channel(None);

        Ok(Poller {
            store,
            sources,
            engine: self.engine,
            health: self.health,
            metrics: MonitorMetrics::new(),
            logger: StructuredLogger::new(self.config.instance.clone()),
            config: self.config,
            cycles: 0,
            reports,
        })
    }
}
