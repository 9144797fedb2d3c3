//! Jobs Module
//!
//! Batch execution of `.job` scripts found in the jobs directory.
//!
//! ## Flow
//! ```text
//!   jobs_dir/*.job (sorted)
//!          │
//!          ▼
//!   ┌─────────────┐  rendezvous  ┌──────────────────────────┐
//!   │ dispatcher  │─────────────►│ job workers (max_threads)│
//!   └─────────────┘              └────────────┬─────────────┘
//!                                             │ one line at a time
//!                                             ▼
//!                                   Engine::execute -> name.out
//! ```
//! Backups requested by `dir/name.job` are written to `dir/name-<n>.bck`.

mod dispatcher;

pub use dispatcher::{process_job, JobDispatcher, JOB_EXTENSION, OUTPUT_EXTENSION};
