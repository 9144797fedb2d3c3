//! # PipeKV
//!
//! A multi-client, in-memory key-value store with:
//! - Per-client named-pipe sessions behind a bounded admission gate
//! - Per-partition reader/writer locks taken in a global order
//! - Key subscriptions with asynchronous change notifications
//! - Non-blocking snapshots written by a bounded set of backup threads
//! - Batch execution of `.job` scripts on a shared worker pool
//! - A client library that creates the pipes and drives a session
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────┐      ┌──────────────────────────┐
//! │   Registration Channel   │      │       jobs_dir/*.job     │
//! │  (connect messages)      │      │                          │
//! └────────────┬─────────────┘      └────────────┬─────────────┘
//!              │                                 │
//! ┌────────────▼─────────────┐      ┌────────────▼─────────────┐
//! │    Session Admission     │      │      Job Dispatcher      │
//! │ (gate + queue + workers) │      │  (bounded worker pool)   │
//! └────────────┬─────────────┘      └────────────┬─────────────┘
//!              │                                 │
//!              └───────────────┬─────────────────┘
//!                              ▼
//!                   ┌─────────────────────┐
//!                   │       Engine        │
//!                   └──────────┬──────────┘
//!                 ┌────────────┼─────────────┐
//!                 ▼            ▼             ▼
//!          ┌────────────┐ ┌──────────┐ ┌────────────┐
//!          │  Storage   │ │  Notify  │ │  Backups   │
//!          │ (36 parts) │ │ (sinks)  │ │ (.bck)     │
//!          └────────────┘ └──────────┘ └────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod pool;
pub mod protocol;
pub mod subscription;
pub mod store;
pub mod backup;
pub mod session;
pub mod client;
pub mod jobs;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{KvsError, Result};
pub use config::Config;
pub use engine::Engine;
pub use store::StorageEngine;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of PipeKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
