//! Integration tests for the snapshot store
//!
//! These tests verify:
//! - Monotonic, idempotent acceptance
//! - Capacity bound and FIFO eviction
//! - Flush cutoff, pause and mode switch
//! - Persistence round trip and corrupt-state recovery

use super::*;
use crate::models::{Snapshot, UeMetrics};
use tempfile::TempDir;

/// Helper to create a snapshot with one UE
fn create_test_snapshot(timestamp: i64) -> Snapshot {
    let mut ue = UeMetrics::new(1, 70);
    ue.downlink.bitrate = 1_000_000.0 + timestamp as f64;
    Snapshot::new(timestamp, "srsRAN", vec![ue])
}

fn timestamps(store: &SnapshotStore) -> Vec<i64> {
    store.log().iter().map(|s| s.timestamp).collect()
}

fn persistent_config(dir: &TempDir, capacity: usize) -> StoreConfig {
    StoreConfig {
        capacity,
        state_dir: Some(dir.path().to_path_buf()),
        ..Default::default()
    }
}

mod acceptance_tests {
    use super::*;

    #[test]
    fn test_append_accepts_increasing_timestamps() {
        let store = SnapshotStore::in_memory(100);

        let outcome = store.append(vec![create_test_snapshot(1), create_test_snapshot(2)]);

        assert_eq!(outcome, AppendOutcome { accepted: 2, rejected: 0 });
        assert_eq!(timestamps(&store), vec![1, 2]);
        assert_eq!(store.watermark(), Some(2));
    }

    #[test]
    fn test_append_at_or_below_watermark_is_noop() {
        let store = SnapshotStore::in_memory(100);
        store.append(vec![create_test_snapshot(10)]);
        let version = store.version();

        let outcome = store.append(vec![create_test_snapshot(10), create_test_snapshot(3)]);

        assert_eq!(outcome.accepted, 0);
        assert_eq!(outcome.rejected, 2);
        assert_eq!(store.version(), version);
        assert_eq!(timestamps(&store), vec![10]);
    }

    #[test]
    fn test_out_of_order_batch_keeps_log_monotonic() {
        let store = SnapshotStore::in_memory(100);

        store.append(vec![
            create_test_snapshot(5),
            create_test_snapshot(3),
            create_test_snapshot(7),
            create_test_snapshot(7),
            create_test_snapshot(9),
        ]);

        assert_eq!(timestamps(&store), vec![5, 7, 9]);
    }

    #[test]
    fn test_idempotent_reingest() {
        let batch: Vec<Snapshot> = (1..=20).map(create_test_snapshot).collect();

        let once = SnapshotStore::in_memory(100);
        once.append(batch.clone());

        let twice = SnapshotStore::in_memory(100);
        twice.append(batch.clone());
        twice.append(batch);

        assert_eq!(*once.log(), *twice.log());
    }

    #[test]
    fn test_empty_batch_does_not_bump_version() {
        let store = SnapshotStore::in_memory(10);
        store.append(Vec::new());
        assert_eq!(store.version(), 0);
        assert!(store.is_empty());
    }
}

mod capacity_tests {
    use super::*;

    #[test]
    fn test_capacity_bound_keeps_most_recent() {
        let store = SnapshotStore::in_memory(1000);

        for ts in 1..=1200 {
            store.append(vec![create_test_snapshot(ts)]);
        }

        let log = store.log();
        assert_eq!(log.len(), 1000);
        assert_eq!(log[0].timestamp, 201);
        assert_eq!(log[999].timestamp, 1200);
    }

    #[test]
    fn test_single_batch_larger_than_capacity() {
        let store = SnapshotStore::in_memory(5);

        store.append((1..=12).map(create_test_snapshot).collect());

        assert_eq!(timestamps(&store), vec![8, 9, 10, 11, 12]);
        assert_eq!(store.watermark(), Some(12));
    }

    #[test]
    fn test_readers_keep_consistent_view() {
        let store = SnapshotStore::in_memory(3);
        store.append(vec![create_test_snapshot(1), create_test_snapshot(2)]);

        let before = store.log();
        store.append(vec![create_test_snapshot(3), create_test_snapshot(4)]);

        assert_eq!(before.len(), 2);
        assert_eq!(timestamps(&store), vec![2, 3, 4]);
    }
}

mod flush_tests {
    use super::*;

    #[test]
    fn test_flush_rejects_data_before_cutoff() {
        let store = SnapshotStore::in_memory(100);
        store.append(vec![create_test_snapshot(100)]);

        store.flush_at(1_000);
        store.append(vec![create_test_snapshot(500), create_test_snapshot(1_000)]);

        assert!(store.is_empty());
        assert_eq!(store.flush_cutoff(), Some(1_000));
        assert_eq!(store.watermark(), Some(1_000));
    }

    #[test]
    fn test_flush_then_old_snapshot_leaves_log_empty() {
        let store = SnapshotStore::in_memory(100);
        let before_flush = chrono::Utc::now().timestamp_millis() - 1;

        store.flush();
        store.append(vec![create_test_snapshot(before_flush)]);

        assert!(store.is_empty());
    }

    #[test]
    fn test_flush_pauses_and_switches_to_api() {
        let store = SnapshotStore::in_memory(100);
        store.set_mode(SourceMode::Mock);

        store.flush_at(50);

        assert!(store.is_paused());
        assert_eq!(store.mode(), SourceMode::Api);
    }

    #[test]
    fn test_append_after_cutoff_is_accepted() {
        let store = SnapshotStore::in_memory(100);
        store.flush_at(50);

        store.append(vec![create_test_snapshot(51)]);

        assert_eq!(timestamps(&store), vec![51]);
    }

    #[test]
    fn test_flush_bumps_version_and_invalidates_history() {
        let store = SnapshotStore::in_memory(100);
        store.append(vec![create_test_snapshot(1), create_test_snapshot(2)]);
        assert_eq!(store.history_for(70, 10).len(), 2);

        store.flush_at(10);

        assert!(store.history_for(70, 10).is_empty());
    }
}

mod accessor_tests {
    use super::*;

    #[test]
    fn test_latest_accessors() {
        let store = SnapshotStore::in_memory(100);
        assert!(store.latest().is_none());
        assert!(store.latest_source().is_none());

        store.append(vec![
            create_test_snapshot(1),
            Snapshot::new(2, "OAI", vec![UeMetrics::new(3, 80)]),
        ]);

        assert_eq!(store.latest_timestamp(), Some(2));
        assert_eq!(store.latest_source().as_deref(), Some("OAI"));
        assert_eq!(store.latest().unwrap().ues[0].rnti, 80);
    }

    #[test]
    fn test_history_tracks_log_growth() {
        let store = SnapshotStore::in_memory(100);
        store.append((1..=4).map(create_test_snapshot).collect());
        assert_eq!(store.history_for(70, 10).len(), 4);

        store.append((5..=15).map(create_test_snapshot).collect());
        let history = store.history_for(70, 10);

        assert_eq!(history.len(), 10);
        assert_eq!(history.first().unwrap().timestamp, 6);
        assert_eq!(history.last().unwrap().timestamp, 15);
        assert_eq!(store.known_rntis(), vec![70]);
    }

    #[test]
    fn test_pause_resume_gate() {
        let store = SnapshotStore::in_memory(10);
        assert!(!store.is_paused());

        store.pause();
        assert!(store.is_paused());

        // Direct appends stay possible while paused
        store.append(vec![create_test_snapshot(1)]);
        assert_eq!(store.len(), 1);

        store.resume();
        assert!(!store.is_paused());
    }

    #[test]
    fn test_stats_reflect_state() {
        let store = SnapshotStore::in_memory(10);
        store.set_endpoint("http://gnb-ingest:8080/api/ingest");
        store.append(vec![create_test_snapshot(42)]);

        let stats = store.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.capacity, 10);
        assert_eq!(stats.latest_timestamp, Some(42));
        assert_eq!(stats.endpoint, "http://gnb-ingest:8080/api/ingest");
        assert!(stats.last_update_age_ms.is_some());
    }

    #[test]
    fn test_source_mode_parse() {
        assert_eq!("API".parse::<SourceMode>().unwrap(), SourceMode::Api);
        assert_eq!("mock".parse::<SourceMode>().unwrap(), SourceMode::Mock);
        assert!("file".parse::<SourceMode>().is_err());
    }
}

mod persistence_tests {
    use super::*;

    #[test]
    fn test_state_survives_reopen() {
        let dir = TempDir::new().unwrap();

        {
            let store = SnapshotStore::open(persistent_config(&dir, 100));
            store.append((1..=5).map(create_test_snapshot).collect());
            store.set_mode(SourceMode::Api);
            store.set_endpoint("http://10.0.0.2:8080/api/ingest");
            store.pause();
        }

        let store = SnapshotStore::open(persistent_config(&dir, 100));
        assert_eq!(timestamps(&store), vec![1, 2, 3, 4, 5]);
        assert_eq!(store.watermark(), Some(5));
        assert_eq!(store.mode(), SourceMode::Api);
        assert_eq!(store.endpoint(), "http://10.0.0.2:8080/api/ingest");
        assert!(store.is_paused());

        // Restored watermark still deduplicates
        store.append(vec![create_test_snapshot(5)]);
        assert_eq!(store.len(), 5);
    }

    #[test]
    fn test_restore_is_bounded_by_capacity() {
        let dir = TempDir::new().unwrap();

        {
            let store = SnapshotStore::open(persistent_config(&dir, 100));
            store.append((1..=50).map(create_test_snapshot).collect());
        }

        let store = SnapshotStore::open(persistent_config(&dir, 10));
        assert_eq!(store.len(), 10);
        assert_eq!(store.log()[0].timestamp, 41);
    }

    #[test]
    fn test_flush_cutoff_survives_reopen() {
        let dir = TempDir::new().unwrap();

        {
            let store = SnapshotStore::open(persistent_config(&dir, 100));
            store.append(vec![create_test_snapshot(10)]);
            store.flush_at(1_000);
        }

        let store = SnapshotStore::open(persistent_config(&dir, 100));
        assert!(store.is_empty());
        assert!(store.is_paused());
        assert_eq!(store.mode(), SourceMode::Api);

        store.append(vec![create_test_snapshot(999)]);
        assert!(store.is_empty());
    }

    #[test]
    fn test_corrupt_snapshots_start_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("snapshots.json"), b"[{\"timestamp\":").unwrap();
        std::fs::write(dir.path().join("mode.json"), b"\"api\"").unwrap();

        let store = SnapshotStore::open(persistent_config(&dir, 100));

        assert!(store.is_empty());
        assert_eq!(store.watermark(), None);
        // Other keys are read independently
        assert_eq!(store.mode(), SourceMode::Api);
    }

    #[test]
    fn test_unwritable_state_dir_keeps_memory_authoritative() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let store = SnapshotStore::open(StoreConfig {
            capacity: 10,
            state_dir: Some(blocker),
            ..Default::default()
        });

        store.append(vec![create_test_snapshot(1)]);
        assert_eq!(store.len(), 1);
    }
}

mod shared_state_dir_tests {
    use super::*;

    #[test]
    fn test_flush_from_other_handle_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let running = SnapshotStore::open(persistent_config(&dir, 100));
        running.append(vec![create_test_snapshot(1), create_test_snapshot(2)]);

        let operator = SnapshotStore::open(persistent_config(&dir, 100));
        operator.flush_at(1_000);

        // The running handle has not synced yet and still believes it is live
        assert!(!running.is_paused());
        let outcome = running.append(vec![create_test_snapshot(500), create_test_snapshot(1_010)]);

        assert_eq!(outcome, AppendOutcome { accepted: 1, rejected: 1 });
        assert_eq!(timestamps(&running), vec![1_010]);
        assert_eq!(running.flush_cutoff(), Some(1_000));

        let reopened = SnapshotStore::open(persistent_config(&dir, 100));
        assert_eq!(timestamps(&reopened), vec![1_010]);
    }

    #[test]
    fn test_sync_adopts_flush_pause_and_mode() {
        let dir = TempDir::new().unwrap();
        let running = SnapshotStore::open(persistent_config(&dir, 100));
        running.append(vec![create_test_snapshot(1), create_test_snapshot(2)]);
        let version = running.version();

        let operator = SnapshotStore::open(persistent_config(&dir, 100));
        operator.flush_at(1_000);

        assert!(running.sync_control_state());
        assert!(running.is_empty());
        assert!(running.is_paused());
        assert_eq!(running.mode(), SourceMode::Api);
        assert_eq!(running.watermark(), Some(1_000));
        assert!(running.version() > version);
        assert!(running.history_for(70, 10).is_empty());

        // Nothing new on disk
        assert!(!running.sync_control_state());
    }

    #[test]
    fn test_sync_picks_up_resume_and_endpoint() {
        let dir = TempDir::new().unwrap();
        let running = SnapshotStore::open(persistent_config(&dir, 100));
        running.pause();

        let operator = SnapshotStore::open(persistent_config(&dir, 100));
        operator.resume();
        operator.set_endpoint("http://10.0.0.9:8080/api/ingest");

        assert!(running.sync_control_state());
        assert!(!running.is_paused());
        assert_eq!(running.endpoint(), "http://10.0.0.9:8080/api/ingest");
    }

    #[test]
    fn test_sync_is_noop_without_state_dir() {
        let store = SnapshotStore::in_memory(10);
        store.append(vec![create_test_snapshot(1)]);

        assert!(!store.sync_control_state());
        assert_eq!(store.len(), 1);
    }
}
