//! Command definitions
//!
//! Opcodes of the session protocol and the decoded commands executed
//! against the store.

use std::time::Duration;

use crate::error::{KvsError, Result};

/// Session protocol opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    Connect = 0x01,
    Disconnect = 0x02,
    Subscribe = 0x03,
    Unsubscribe = 0x04,
    Command = 0x05,
}

impl TryFrom<u8> for OpCode {
    type Error = KvsError;

    fn try_from(byte: u8) -> Result<Self> {
        match byte {
            0x01 => Ok(OpCode::Connect),
            0x02 => Ok(OpCode::Disconnect),
            0x03 => Ok(OpCode::Subscribe),
            0x04 => Ok(OpCode::Unsubscribe),
            0x05 => Ok(OpCode::Command),
            _ => Err(KvsError::Protocol(format!("Unknown opcode: 0x{:02x}", byte))),
        }
    }
}

/// A decoded store command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Write (or overwrite) key-value pairs
    Write { pairs: Vec<(String, String)> },

    /// Read the values of keys
    Read { keys: Vec<String> },

    /// Delete keys, reporting the ones that were missing
    Delete { keys: Vec<String> },

    /// Dump every pair
    Show,

    /// Sleep the issuing worker
    Wait { delay: Duration },

    /// Snapshot the store to a backup file
    Backup,

    /// Print usage
    Help,
}

/// Channel ids a client asked the server to open for its session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub request_channel: String,
    pub response_channel: String,
    pub notification_channel: String,
}
