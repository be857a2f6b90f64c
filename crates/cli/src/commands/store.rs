//! Store-related CLI commands

use anyhow::{Context, Result};
use colored::Colorize;
use monitor_lib::{SnapshotStore, SourceMode, StoreConfig, StructuredLogger};
use std::path::Path;

use crate::output::{format_age, format_timestamp, print_info, print_json, print_success, OutputFormat};

/// Open the persisted store rooted at `state_dir`
pub fn open(state_dir: &Path) -> SnapshotStore {
    SnapshotStore::open(StoreConfig {
        state_dir: Some(state_dir.to_path_buf()),
        ..Default::default()
    })
}

/// Show store state
pub fn show_status(store: &SnapshotStore, state_dir: &Path, format: OutputFormat) -> Result<()> {
    let stats = store.stats();

    match format {
        OutputFormat::Json => print_json(&stats)?,
        OutputFormat::Table => {
            println!("{}", "Snapshot Store".bold());
            println!("{}", "=".repeat(50));
            println!("State dir:    {}", state_dir.display().to_string().cyan());
            println!("Entries:      {} / {}", stats.entries, stats.capacity);
            println!("Mode:         {}", stats.mode.to_string().cyan());
            println!("Endpoint:     {}", stats.endpoint);

            let paused = if stats.paused {
                "yes".yellow()
            } else {
                "no".green()
            };
            println!("Paused:       {}", paused);

            if let Some(ts) = stats.latest_timestamp {
                println!(
                    "Latest:       {} ({})",
                    format_timestamp(ts),
                    stats.latest_source.as_deref().unwrap_or("unknown")
                );
                let age = chrono::Utc::now().timestamp_millis() - ts;
                println!("Data age:     {}", format_age(age.max(0)).dimmed());
            }
            if let Some(cutoff) = stats.flush_cutoff {
                println!("Flushed at:   {}", format_timestamp(cutoff).dimmed());
            }
        }
    }

    Ok(())
}

pub fn pause(store: &SnapshotStore) {
    store.pause();
    print_success("Acquisition paused");
}

pub fn resume(store: &SnapshotStore) {
    store.resume();
    print_success(&format!("Acquisition resumed in {} mode", store.mode()));
}

/// Drop every snapshot and pause in API mode
pub fn flush(store: &SnapshotStore) {
    let dropped = store.len();
    let cutoff = chrono::Utc::now().timestamp_millis();
    store.flush_at(cutoff);

    StructuredLogger::new("ranmon-cli").log_flush(dropped, cutoff);
    print_success(&format!("Flushed {} snapshots", dropped));
    print_info("Store is now paused in api mode; run `ranmon store resume` to continue");
}

pub fn set_mode(store: &SnapshotStore, mode: SourceMode) {
    store.set_mode(mode);
    print_success(&format!("Mode set to {}", mode));
}

pub fn set_endpoint(store: &SnapshotStore, url: &str) -> Result<()> {
    url::Url::parse(url).with_context(|| format!("Invalid endpoint URL: {}", url))?;
    store.set_endpoint(url);
    print_success(&format!("Endpoint set to {}", url));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use monitor_lib::Snapshot;
    use tempfile::TempDir;

    #[test]
    fn test_state_survives_reopen() {
        let dir = TempDir::new().unwrap();

        let store = open(dir.path());
        store.set_mode(SourceMode::Api);
        pause(&store);
        set_endpoint(&store, "http://gnb-1:8080/api/ingest").unwrap();
        drop(store);

        let reopened = open(dir.path());
        assert_eq!(reopened.mode(), SourceMode::Api);
        assert!(reopened.is_paused());
        assert_eq!(reopened.endpoint(), "http://gnb-1:8080/api/ingest");
    }

    #[test]
    fn test_flush_clears_and_pauses() {
        let dir = TempDir::new().unwrap();
        let store = open(dir.path());
        store.append(vec![Snapshot::new(1, "OAI", vec![])]);

        flush(&store);

        let reopened = open(dir.path());
        assert!(reopened.is_empty());
        assert!(reopened.is_paused());
        assert_eq!(reopened.mode(), SourceMode::Api);
        assert!(reopened.flush_cutoff().is_some());
    }

    #[test]
    fn test_invalid_endpoint_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = open(dir.path());

        assert!(set_endpoint(&store, "not a url").is_err());
        assert_eq!(store.endpoint(), monitor_lib::store::DEFAULT_ENDPOINT);
    }
}
