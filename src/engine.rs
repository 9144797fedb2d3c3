//! Engine Module
//!
//! The context object shared by every session worker and job worker.
//!
//! ## Responsibilities
//! - Own the storage engine and the backup coordinator
//! - Execute decoded commands and render their textual results
//! - Tie their lifecycles together (open -> serve -> close)

use std::io::Write;
use std::sync::Arc;
use std::thread;

use crate::backup::{BackupCoordinator, BackupSource};
use crate::config::Config;
use crate::error::Result;
use crate::protocol::{render_missing, render_read, Command, HELP_TEXT, WAIT_MESSAGE};
use crate::store::StorageEngine;

/// Everything a worker needs to serve commands
///
/// Built once at startup and shared behind an `Arc`.
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// The in-memory table (internal per-partition locks)
    store: Arc<StorageEngine>,

    /// Bounds concurrent snapshot writers
    backups: BackupCoordinator,
}

impl Engine {
    /// Validate `config` and bring up an initialized store
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(StorageEngine::new());
        store.init()?;

        let backups = BackupCoordinator::new(config.max_backups);

        tracing::debug!(
            "Engine ready (max_backups={}, max_sessions={})",
            config.max_backups,
            config.max_sessions
        );

        Ok(Self {
            config,
            store,
            backups,
        })
    }

    /// Execute a command, writing its textual result to `out`
    ///
    /// `source` names the backup files a BACKUP produces.
    pub fn execute<W: Write + ?Sized>(
        &self,
        command: Command,
        source: &mut BackupSource,
        out: &mut W,
    ) -> Result<()> {
        match command {
            Command::Write { pairs } => {
                self.store.write(pairs)?;
            }
            Command::Read { keys } => {
                let results = self.store.read(keys)?;
                out.write_all(render_read(&results).as_bytes())?;
            }
            Command::Delete { keys } => {
                let missing = self.store.delete(keys)?;
                out.write_all(render_missing(&missing).as_bytes())?;
            }
            Command::Show => {
                self.store.show()?.write_to(out)?;
            }
            Command::Wait { delay } => {
                if !delay.is_zero() {
                    out.write_all(WAIT_MESSAGE.as_bytes())?;
                    out.flush()?;
                    thread::sleep(delay);
                }
            }
            Command::Backup => {
                let job = self.backups.backup(&self.store, source)?;
                tracing::debug!("Backup {} started for {}", job.seq, job.path.display());
            }
            Command::Help => {
                out.write_all(HELP_TEXT.as_bytes())?;
            }
        }

        Ok(())
    }

    /// Wait for in-flight backups, then free the table
    pub fn close(&self) -> Result<()> {
        self.backups.wait_idle();
        self.store.terminate()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn store(&self) -> &Arc<StorageEngine> {
        &self.store
    }

    pub fn backups(&self) -> &BackupCoordinator {
        &self.backups
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
