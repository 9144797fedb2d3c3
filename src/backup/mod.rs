//! Backup Module
//!
//! Point-in-time snapshots of the store written to `.bck` files.
//!
//! ## Responsibilities
//! - Bound the number of snapshot writers in flight (extra requests block)
//! - Copy the table under shared locks, then release them before any I/O
//! - Name backups after the job or session that asked for them
//!
//! ## File Format
//! Same text as SHOW, one pair per line:
//! ```text
//! (key, value)
//! (key2, value2)
//! ```

mod coordinator;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub use coordinator::{BackupCoordinator, BackupJob};

use crate::error::Result;
use crate::store::Snapshot;

/// Extension of backup files
pub const BACKUP_EXTENSION: &str = "bck";

/// Where the backups of one command source go
///
/// `dir/name.job` produces `dir/name-1.bck`, `dir/name-2.bck`, ...
#[derive(Debug, Clone)]
pub struct BackupSource {
    stem: PathBuf,
    done: usize,
}

impl BackupSource {
    /// Backups of a job script, written next to it
    pub fn for_job(job_path: &Path) -> Self {
        Self {
            stem: job_path.with_extension(""),
            done: 0,
        }
    }

    /// Backups named `name-N.bck` inside `dir`
    pub fn named(dir: &Path, name: &str) -> Self {
        Self {
            stem: dir.join(name),
            done: 0,
        }
    }

    /// Reserve the next backup number and return its path
    pub fn next_path(&mut self) -> PathBuf {
        self.done += 1;
        Self::numbered(&self.stem, self.done)
    }

    /// Backups requested by this source so far
    pub fn backups_done(&self) -> usize {
        self.done
    }

    fn numbered(stem: &Path, n: usize) -> PathBuf {
        let mut name = stem.as_os_str().to_os_string();
        name.push(format!("-{}.{}", n, BACKUP_EXTENSION));
        PathBuf::from(name)
    }
}

/// Write a snapshot to `path`, replacing any previous file
pub fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    snapshot.write_to(&mut writer)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}
