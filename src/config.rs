//! Configuration for PipeKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{KvsError, Result};

/// Main configuration for a PipeKV server
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Batch Job Configuration
    // -------------------------------------------------------------------------
    /// Directory scanned for `*.job` scripts at startup.
    /// Output and backup files are written next to each script:
    ///   {jobs_dir}/
    ///     ├── name.job       (input script)
    ///     ├── name.out       (command output)
    ///     └── name-N.bck     (N-th backup taken by the script)
    pub jobs_dir: PathBuf,

    /// Number of job scripts processed concurrently
    pub max_job_threads: usize,

    // -------------------------------------------------------------------------
    // Backup Configuration
    // -------------------------------------------------------------------------
    /// Max snapshot writers in flight at once; extra requests block
    pub max_backups: usize,

    /// Where backups requested by client sessions are written
    pub backup_dir: PathBuf,

    // -------------------------------------------------------------------------
    // Session Configuration
    // -------------------------------------------------------------------------
    /// Well-known registration pipe clients send connect requests to
    pub register_pipe: PathBuf,

    /// Max simultaneously active sessions (admission gate permits)
    pub max_sessions: usize,

    /// Session-handler threads in the admission pool
    pub session_workers: usize,

    /// Pending connect requests buffered between listener and workers
    pub admission_queue_capacity: usize,

    /// Notification frames buffered per subscriber before frames are dropped
    pub notification_queue_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            jobs_dir: PathBuf::from("./jobs"),
            max_job_threads: 4,
            max_backups: 1,
            backup_dir: PathBuf::from("."),
            register_pipe: PathBuf::from("/tmp/pipekv_register"),
            max_sessions: 8,
            session_workers: 8,
            admission_queue_capacity: 10,
            notification_queue_depth: 64,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject configurations that would leave a pool with nothing to run on
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("max_job_threads", self.max_job_threads),
            ("max_backups", self.max_backups),
            ("max_sessions", self.max_sessions),
            ("session_workers", self.session_workers),
            ("admission_queue_capacity", self.admission_queue_capacity),
            ("notification_queue_depth", self.notification_queue_depth),
        ];

        for (name, value) in checks {
            if value == 0 {
                return Err(KvsError::Config(format!("{} must be at least 1", name)));
            }
        }

        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the directory scanned for job scripts
    pub fn jobs_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.jobs_dir = path.into();
        self
    }

    /// Set the number of concurrently processed job scripts
    pub fn max_job_threads(mut self, count: usize) -> Self {
        self.config.max_job_threads = count;
        self
    }

    /// Set the maximum number of concurrent backups
    pub fn max_backups(mut self, count: usize) -> Self {
        self.config.max_backups = count;
        self
    }

    /// Set the directory for session-originated backups
    pub fn backup_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.backup_dir = path.into();
        self
    }

    /// Set the registration pipe path
    pub fn register_pipe(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.register_pipe = path.into();
        self
    }

    /// Set the maximum number of simultaneously active sessions
    pub fn max_sessions(mut self, count: usize) -> Self {
        self.config.max_sessions = count;
        self
    }

    /// Set the number of session-handler threads
    pub fn session_workers(mut self, count: usize) -> Self {
        self.config.session_workers = count;
        self
    }

    /// Set the capacity of the pending connect queue
    pub fn admission_queue_capacity(mut self, count: usize) -> Self {
        self.config.admission_queue_capacity = count;
        self
    }

    /// Set the per-subscriber notification buffer depth
    pub fn notification_queue_depth(mut self, depth: usize) -> Self {
        self.config.notification_queue_depth = depth;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
