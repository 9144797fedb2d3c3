//! Error types for PipeKV
//!
//! Provides a unified error type for all operations. Key misses are not
//! errors: they travel back to clients as per-key result codes.

use thiserror::Error;

/// Result type alias using KvsError
pub type Result<T> = std::result::Result<T, KvsError>;

/// Unified error type for PipeKV operations
#[derive(Debug, Error)]
pub enum KvsError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("KVS state has already been initialized")]
    AlreadyInitialized,

    #[error("KVS state must be initialized")]
    NotInitialized,

    // -------------------------------------------------------------------------
    // Input Errors
    // -------------------------------------------------------------------------
    #[error("Invalid key: {0:?}")]
    InvalidKey(String),

    #[error("Invalid value for key {key:?}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Parse error: {0}")]
    Parse(String),

    // -------------------------------------------------------------------------
    // Session Errors
    // -------------------------------------------------------------------------
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}
