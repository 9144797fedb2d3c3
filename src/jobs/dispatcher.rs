//! Job dispatcher
//!
//! Feeds job files through the shared worker pool.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backup::BackupSource;
use crate::engine::Engine;
use crate::error::{KvsError, Result};
use crate::pool::WorkerPool;
use crate::protocol::parse_line;

/// Extension of job scripts
pub const JOB_EXTENSION: &str = "job";

/// Extension of job output files
pub const OUTPUT_EXTENSION: &str = "out";

/// Runs every job script of a directory
pub struct JobDispatcher;

impl JobDispatcher {
    /// Execute every `.job` file in `jobs_dir` with at most `max_threads`
    /// running at once
    ///
    /// Blocks while every worker is busy. Returns after all jobs finished
    /// and every backup they requested is on disk.
    pub fn run(engine: Arc<Engine>, jobs_dir: &Path, max_threads: usize) -> Result<usize> {
        let jobs = Self::list_jobs(jobs_dir)?;
        tracing::info!(
            "Dispatching {} jobs from {} ({} threads)",
            jobs.len(),
            jobs_dir.display(),
            max_threads
        );

        let worker_engine = Arc::clone(&engine);
        let pool = WorkerPool::spawn("job", max_threads, 0, move |worker, path: PathBuf| {
            tracing::debug!("Worker {} running {}", worker, path.display());
            if let Err(e) = process_job(&worker_engine, &path) {
                tracing::error!("Job {} failed: {}", path.display(), e);
            }
        })?;

        let total = jobs.len();
        for path in jobs {
            pool.submit(path)?;
        }
        pool.shutdown();

        engine.backups().wait_idle();
        tracing::info!("All {} jobs done", total);
        Ok(total)
    }

    /// `.job` files directly inside `dir`, sorted by name
    pub fn list_jobs(dir: &Path) -> Result<Vec<PathBuf>> {
        if !dir.is_dir() {
            return Err(KvsError::Config(format!(
                "jobs directory {} does not exist",
                dir.display()
            )));
        }

        let mut jobs = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let is_job = path.extension().map_or(false, |ext| ext == JOB_EXTENSION);
            if is_job && path.is_file() {
                jobs.push(path);
            }
        }
        jobs.sort();
        Ok(jobs)
    }
}

/// Execute one job script, writing its results to the `.out` sibling
///
/// Lines that do not parse, or that the store rejects, are logged and
/// skipped; the rest of the script still runs.
pub fn process_job(engine: &Engine, path: &Path) -> Result<()> {
    let input = BufReader::new(File::open(path)?);
    let mut output = BufWriter::new(File::create(path.with_extension(OUTPUT_EXTENSION))?);
    let mut backups = BackupSource::for_job(path);

    for (number, line) in input.lines().enumerate() {
        let line = line?;
        let command = match parse_line(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!("{}:{}: {}", path.display(), number + 1, e);
                continue;
            }
        };

        match engine.execute(command, &mut backups, &mut output) {
            Ok(()) => {}
            Err(e @ (KvsError::Io(_) | KvsError::NotInitialized)) => return Err(e),
            Err(e) => tracing::warn!("{}:{}: {}", path.display(), number + 1, e),
        }
    }

    output.flush()?;
    tracing::debug!(
        "Finished {} ({} backups)",
        path.display(),
        backups.backups_done()
    );
    Ok(())
}
