//! PipeKV Server Binary
//!
//! Runs the batch jobs of a directory while serving clients that register
//! through a named pipe.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use clap::Parser;
use pipekv::jobs::JobDispatcher;
use pipekv::session::{FifoTransport, SessionAdmission};
use pipekv::{Config, Engine};
use tracing_subscriber::{fmt, EnvFilter};

/// PipeKV Server
#[derive(Parser, Debug)]
#[command(name = "pipekv-server")]
#[command(about = "In-memory key-value store served over named pipes")]
#[command(version)]
struct Args {
    /// Directory holding the `.job` scripts to run
    jobs_dir: PathBuf,

    /// Maximum concurrent backups
    max_backups: usize,

    /// Maximum concurrent job threads
    max_threads: usize,

    /// Registration pipe clients connect through (must already exist)
    register_pipe: PathBuf,

    /// Maximum simultaneously active sessions
    #[arg(long, default_value = "8")]
    max_sessions: usize,

    /// Session worker threads
    #[arg(long, default_value = "8")]
    session_workers: usize,

    /// Directory for backups requested by sessions
    #[arg(long, default_value = ".")]
    backup_dir: PathBuf,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pipekv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("PipeKV Server v{}", pipekv::VERSION);
    tracing::info!("Jobs directory: {}", args.jobs_dir.display());
    tracing::info!("Registration pipe: {}", args.register_pipe.display());

    // Build config from args
    let config = Config::builder()
        .jobs_dir(&args.jobs_dir)
        .max_backups(args.max_backups)
        .max_job_threads(args.max_threads)
        .register_pipe(&args.register_pipe)
        .max_sessions(args.max_sessions)
        .session_workers(args.session_workers)
        .backup_dir(&args.backup_dir)
        .build();

    // Open engine
    let engine = match Engine::open(config.clone()) {
        Ok(e) => Arc::new(e),
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Engine initialized successfully");

    // Start session admission
    let admission = match SessionAdmission::start(Arc::clone(&engine), Arc::new(FifoTransport)) {
        Ok(a) => a,
        Err(e) => {
            tracing::error!("Failed to start session admission: {}", e);
            std::process::exit(1);
        }
    };

    let register_pipe = config.register_pipe.clone();
    let listener = thread::Builder::new()
        .name("registration".to_string())
        .spawn(move || {
            // Every writer closing the pipe ends one listen pass; reopen and go on
            loop {
                let mut pipe = match FifoTransport::open_registration(&register_pipe) {
                    Ok(pipe) => pipe,
                    Err(e) => {
                        tracing::error!(
                            "Cannot open registration pipe {}: {}",
                            register_pipe.display(),
                            e
                        );
                        break;
                    }
                };

                match admission.listen(&mut pipe) {
                    Ok(admitted) => tracing::debug!("Registration pass admitted {}", admitted),
                    Err(e) => {
                        tracing::error!("Registration listener failed: {}", e);
                        break;
                    }
                }
            }
            admission.shutdown();
        });

    let listener = match listener {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!("Failed to start registration listener: {}", e);
            std::process::exit(1);
        }
    };

    // Run batch jobs
    match JobDispatcher::run(Arc::clone(&engine), &config.jobs_dir, config.max_job_threads) {
        Ok(count) => tracing::info!("Processed {} job files", count),
        Err(e) => tracing::error!("Job dispatch failed: {}", e),
    }

    // Keep serving sessions
    if listener.join().is_err() {
        tracing::error!("Registration listener panicked");
    }

    if let Err(e) = engine.close() {
        tracing::error!("Failed to close engine: {}", e);
    }

    tracing::info!("Server stopped");
}
