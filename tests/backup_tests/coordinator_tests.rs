//! Backup Tests
//!
//! Tests verify:
//! - Backup file naming per source
//! - Backup contents match SHOW at the time of the request
//! - Writes after the request do not leak into the file
//! - Concurrent writers never exceed the configured bound
//! - A backup waits while every slot is taken

use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use pipekv::backup::{write_snapshot, BackupCoordinator, BackupSource};
use pipekv::pool::Semaphore;
use pipekv::StorageEngine;
use tempfile::tempdir;

fn ready_store() -> StorageEngine {
    let store = StorageEngine::new();
    store.init().unwrap();
    store
}

fn fill(store: &StorageEngine, count: usize) {
    let pairs = (0..count)
        .map(|i| (format!("k{}", i), format!("v{}", i)))
        .collect();
    store.write(pairs).unwrap();
}

// =============================================================================
// Naming Tests
// =============================================================================

#[test]
fn test_job_source_naming() {
    let dir = tempdir().unwrap();
    let mut source = BackupSource::for_job(&dir.path().join("test.job"));

    assert_eq!(source.next_path(), dir.path().join("test-1.bck"));
    assert_eq!(source.next_path(), dir.path().join("test-2.bck"));
    assert_eq!(source.backups_done(), 2);
}

#[test]
fn test_named_source_naming() {
    let dir = tempdir().unwrap();
    let mut source = BackupSource::named(dir.path(), "session-7");

    assert_eq!(source.next_path(), dir.path().join("session-7-1.bck"));
}

// =============================================================================
// Content Tests
// =============================================================================

#[test]
fn test_write_snapshot_matches_show() {
    let dir = tempdir().unwrap();
    let store = ready_store();
    store
        .write(vec![
            ("b".to_string(), "2".to_string()),
            ("a".to_string(), "1".to_string()),
        ])
        .unwrap();

    let path = dir.path().join("snap.bck");
    write_snapshot(&path, &store.show().unwrap()).unwrap();

    assert_eq!(fs::read_to_string(&path).unwrap(), "(a, 1)\n(b, 2)\n");
}

#[test]
fn test_backup_is_point_in_time() {
    let dir = tempdir().unwrap();
    let store = ready_store();
    let coordinator = BackupCoordinator::new(1);
    let mut source = BackupSource::for_job(&dir.path().join("job.job"));

    store.write(vec![("a".to_string(), "before".to_string())]).unwrap();
    let job = coordinator.backup(&store, &mut source).unwrap();
    store.write(vec![("a".to_string(), "after".to_string())]).unwrap();
    store.write(vec![("b".to_string(), "new".to_string())]).unwrap();
    coordinator.wait_idle();

    assert_eq!(job.seq, 1);
    assert_eq!(job.path, dir.path().join("job-1.bck"));
    assert_eq!(fs::read_to_string(&job.path).unwrap(), "(a, before)\n");
    assert_eq!(coordinator.completed(), 1);
    assert_eq!(coordinator.failed(), 0);
}

#[test]
fn test_backup_of_empty_store() {
    let dir = tempdir().unwrap();
    let store = ready_store();
    let coordinator = BackupCoordinator::new(2);
    let mut source = BackupSource::named(dir.path(), "empty");

    let job = coordinator.backup(&store, &mut source).unwrap();
    coordinator.wait_idle();

    assert_eq!(fs::read_to_string(&job.path).unwrap(), "");
}

#[test]
fn test_failed_write_is_counted() {
    let dir = tempdir().unwrap();
    let store = ready_store();
    let coordinator = BackupCoordinator::new(1);
    let mut source = BackupSource::named(&dir.path().join("missing-dir"), "x");

    coordinator.backup(&store, &mut source).unwrap();
    coordinator.wait_idle();

    assert_eq!(coordinator.failed(), 1);
    assert_eq!(coordinator.in_flight(), 0);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_backups_respect_bound() {
    let dir = tempdir().unwrap();
    let store = Arc::new(ready_store());
    fill(&store, 200);
    let coordinator = Arc::new(BackupCoordinator::new(2));

    let mut handles = vec![];
    for t in 0..6 {
        let store = Arc::clone(&store);
        let coordinator = Arc::clone(&coordinator);
        let dir = dir.path().to_path_buf();
        handles.push(thread::spawn(move || {
            let mut source = BackupSource::named(&dir, &format!("t{}", t));
            for _ in 0..3 {
                coordinator.backup(&store, &mut source).unwrap();
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }
    coordinator.wait_idle();

    assert!(coordinator.peak_in_flight() >= 1);
    assert!(coordinator.peak_in_flight() <= 2);
    assert_eq!(coordinator.completed(), 18);
    assert_eq!(coordinator.in_flight(), 0);

    for t in 0..6 {
        for n in 1..=3 {
            let path = dir.path().join(format!("t{}-{}.bck", t, n));
            assert_eq!(fs::read_to_string(path).unwrap().lines().count(), 200);
        }
    }
}

#[test]
fn test_extra_backup_waits_for_free_slot() {
    let dir = tempdir().unwrap();
    let store = Arc::new(ready_store());
    fill(&store, 10);

    let slots = Semaphore::new(2);
    let first = slots.acquire();
    let second = slots.acquire();
    let coordinator = Arc::new(BackupCoordinator::with_slots(Arc::clone(&slots)));

    let backup_store = Arc::clone(&store);
    let backup_coordinator = Arc::clone(&coordinator);
    let backup_dir = dir.path().to_path_buf();
    let handle = thread::spawn(move || {
        let mut source = BackupSource::named(&backup_dir, "blocked");
        backup_coordinator.backup(&backup_store, &mut source).unwrap()
    });

    thread::sleep(Duration::from_millis(50));
    assert!(!handle.is_finished());
    assert!(!dir.path().join("blocked-1.bck").exists());

    drop(first);
    let job = handle.join().unwrap();
    drop(second);
    coordinator.wait_idle();

    assert_eq!(job.path, dir.path().join("blocked-1.bck"));
    assert_eq!(fs::read_to_string(&job.path).unwrap().lines().count(), 10);
    assert_eq!(slots.available(), 2);
}

#[test]
fn test_writes_proceed_during_backups() {
    let dir = tempdir().unwrap();
    let store = Arc::new(ready_store());
    fill(&store, 100);
    let coordinator = Arc::new(BackupCoordinator::new(1));

    let backup_store = Arc::clone(&store);
    let backup_coordinator = Arc::clone(&coordinator);
    let backup_dir = dir.path().to_path_buf();
    let backups = thread::spawn(move || {
        let mut source = BackupSource::named(&backup_dir, "bg");
        for _ in 0..5 {
            backup_coordinator.backup(&backup_store, &mut source).unwrap();
        }
    });

    for i in 0..100 {
        store
            .write(vec![(format!("w{}", i), "x".to_string())])
            .unwrap();
    }

    backups.join().unwrap();
    coordinator.wait_idle();

    assert_eq!(store.len().unwrap(), 200);
    for n in 1..=5 {
        let lines = fs::read_to_string(dir.path().join(format!("bg-{}.bck", n)))
            .unwrap()
            .lines()
            .count();
        assert!((100..=200).contains(&lines));
    }
}
