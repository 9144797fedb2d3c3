//! Store Module
//!
//! The partitioned in-memory table behind every session and job.
//!
//! ## Responsibilities
//! - Map each key to exactly one partition
//! - Guard each partition with its own reader/writer lock
//! - Acquire the locks of multi-key operations in one global order
//! - Hand write/delete events to the notification publisher
//!
//! ## Partitioning
//! Keys are routed by their first character, case-insensitively:
//! `a..=z` -> 0..=25, `0..=9` -> 26..=35. Keys starting with anything else
//! are rejected.
//!
//! ## Deadlock Avoidance
//! ```text
//!   keys ──sort by (partition, key)──► plan ──lock ascending──► apply ──► unlock
//! ```
//! Two operations touching overlapping partitions always request them in
//! the same relative order, so no cycle of waiters can form. SHOW and
//! backups take every partition in that same order.

mod partition;
mod table;

use std::io::{self, Write};

pub use partition::Entry;
pub use table::StorageEngine;

use crate::error::{KvsError, Result};
use crate::protocol::{render_show_line, MAX_STRING_SIZE};

/// Number of partitions (fixed for the process lifetime)
pub const PARTITION_COUNT: usize = 36;

/// Partition a key belongs to, or `None` for keys outside the alphabet
pub fn partition_index(key: &str) -> Option<usize> {
    let first = *key.as_bytes().first()?;
    match first.to_ascii_lowercase() {
        c @ b'a'..=b'z' => Some((c - b'a') as usize),
        c @ b'0'..=b'9' => Some(26 + (c - b'0') as usize),
        _ => None,
    }
}

/// Validate a key and return its partition
pub(crate) fn partition_of(key: &str) -> Result<usize> {
    if key.len() > MAX_STRING_SIZE {
        return Err(KvsError::InvalidKey(key.to_string()));
    }
    partition_index(key).ok_or_else(|| KvsError::InvalidKey(key.to_string()))
}

pub(crate) fn check_value(key: &str, value: &str) -> Result<()> {
    if value.len() > MAX_STRING_SIZE {
        return Err(KvsError::InvalidValue {
            key: key.to_string(),
            reason: format!("{} bytes exceeds the {} byte limit", value.len(), MAX_STRING_SIZE),
        });
    }
    Ok(())
}

/// Point-in-time copy of every pair, in partition then insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pairs: Vec<(String, String)>,
}

impl Snapshot {
    pub(crate) fn new(pairs: Vec<(String, String)>) -> Self {
        Self { pairs }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Dump as `(key, value)` lines
    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        for (key, value) in &self.pairs {
            writer.write_all(render_show_line(key, value).as_bytes())?;
        }
        Ok(())
    }

    pub fn render(&self) -> String {
        self.iter().map(|(k, v)| render_show_line(k, v)).collect()
    }
}

impl IntoIterator for Snapshot {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.into_iter()
    }
}
