//! Backup coordinator
//!
//! Hands snapshots to writer threads, at most `max_backups` at a time.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use super::{write_snapshot, BackupSource};
use crate::error::Result;
use crate::pool::Semaphore;
use crate::store::StorageEngine;

/// A snapshot handed to a writer thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupJob {
    /// Coordinator-wide sequence number
    pub seq: u64,

    /// File the snapshot is written to
    pub path: PathBuf,
}

/// Counters shared with writer threads
#[derive(Default)]
struct BackupStats {
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Bounds and tracks concurrent snapshot writers
///
/// ## Flow
/// 1. Take a backup slot, blocking while all are in use
/// 2. Copy the table under shared locks on every partition
/// 3. Release the locks (writers resume here)
/// 4. Serialize the copy on a dedicated thread, which frees the slot
pub struct BackupCoordinator {
    slots: Arc<Semaphore>,
    stats: Arc<BackupStats>,
    next_seq: AtomicU64,
    writers: Mutex<Vec<JoinHandle<()>>>,
}

impl BackupCoordinator {
    pub fn new(max_backups: usize) -> Self {
        Self::with_slots(Semaphore::new(max_backups.max(1)))
    }

    /// Coordinator drawing backup slots from an existing semaphore
    pub fn with_slots(slots: Arc<Semaphore>) -> Self {
        Self {
            slots,
            stats: Arc::new(BackupStats::default()),
            next_seq: AtomicU64::new(1),
            writers: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot `store` into the next backup file of `source`
    ///
    /// Returns once the copy is taken; the file is written in the background.
    pub fn backup(&self, store: &StorageEngine, source: &mut BackupSource) -> Result<BackupJob> {
        let permit = self.slots.acquire();

        let snapshot = store.show()?;
        let job = BackupJob {
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            path: source.next_path(),
        };

        let running = self.stats.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.stats.peak_in_flight.fetch_max(running, Ordering::AcqRel);

        let stats = Arc::clone(&self.stats);
        let thread_job = job.clone();
        let spawned = thread::Builder::new()
            .name(format!("backup-{}", job.seq))
            .spawn(move || {
                match write_snapshot(&thread_job.path, &snapshot) {
                    Ok(()) => {
                        stats.completed.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(
                            "Backup {} written to {} ({} pairs)",
                            thread_job.seq,
                            thread_job.path.display(),
                            snapshot.len()
                        );
                    }
                    Err(e) => {
                        stats.failed.fetch_add(1, Ordering::Relaxed);
                        tracing::error!(
                            "Failure creating backup {} at {}: {}",
                            thread_job.seq,
                            thread_job.path.display(),
                            e
                        );
                    }
                }
                stats.in_flight.fetch_sub(1, Ordering::AcqRel);
                drop(permit);
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.stats.in_flight.fetch_sub(1, Ordering::AcqRel);
                return Err(e.into());
            }
        };

        let mut writers = self.writers.lock();
        writers.retain(|writer| !writer.is_finished());
        writers.push(handle);

        Ok(job)
    }

    /// Block until every started backup has been written
    pub fn wait_idle(&self) {
        let writers: Vec<JoinHandle<()>> = self.writers.lock().drain(..).collect();
        for writer in writers {
            if writer.join().is_err() {
                tracing::error!("Backup writer panicked");
            }
        }
        self.slots.wait_idle();
    }

    pub fn max_backups(&self) -> usize {
        self.slots.capacity()
    }

    /// Writers currently running
    pub fn in_flight(&self) -> usize {
        self.stats.in_flight.load(Ordering::Acquire)
    }

    /// Highest number of writers ever running at once
    pub fn peak_in_flight(&self) -> usize {
        self.stats.peak_in_flight.load(Ordering::Acquire)
    }

    pub fn completed(&self) -> u64 {
        self.stats.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.stats.failed.load(Ordering::Relaxed)
    }
}
