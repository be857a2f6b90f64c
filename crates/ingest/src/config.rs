//! Ingest server configuration

use anyhow::Result;
use serde::Deserialize;
use tracing::warn;

/// Ingest server configuration, read from `INGEST_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Snapshots retained for `GET ?all=1`
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Route serving GET and POST
    #[serde(default = "default_route")]
    pub route: String,

    /// Seconds without a POST before health reports stale data
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,

    /// Instance label for structured logs
    #[serde(default = "default_instance")]
    pub instance: String,
}

fn default_port() -> u16 {
    8080
}

fn default_capacity() -> usize {
    monitor_lib::store::DEFAULT_CAPACITY
}

fn default_route() -> String {
    "/api/ingest".to_string()
}

fn default_stale_after() -> u64 {
    30
}

fn default_instance() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "ran-ingest".to_string())
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            capacity: default_capacity(),
            route: default_route(),
            stale_after_secs: default_stale_after(),
            instance: default_instance(),
        }
    }
}

impl IngestConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("INGEST").try_parsing(true))
            .build()?;

        let mut loaded = config.try_deserialize::<IngestConfig>().unwrap_or_else(|e| {
            warn!(error = %e, "Invalid INGEST_* configuration, using defaults");
            IngestConfig::default()
        });

        if !loaded.route.starts_with('/') {
            loaded.route = format!("/{}", loaded.route);
        }
        loaded.capacity = loaded.capacity.max(1);
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IngestConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.capacity, 1000);
        assert_eq!(config.route, "/api/ingest");
    }
}
