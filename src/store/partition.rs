//! Partition implementation
//!
//! One shard of the key space: a hash map plus the insertion order used by
//! SHOW, behind a single reader/writer lock.

use std::collections::{BTreeMap, HashMap};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::subscription::SubscriberList;

/// A stored pair and its subscribers
#[derive(Debug)]
pub struct Entry {
    value: String,
    seq: u64,
    subscribers: SubscriberList,
}

impl Entry {
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn subscribers(&self) -> &SubscriberList {
        &self.subscribers
    }

    /// Replace the value in place, keeping position and subscribers
    pub(crate) fn replace_value(&mut self, value: String) {
        self.value = value;
    }
}

/// Contents of one partition
#[derive(Debug, Default)]
pub(crate) struct PartitionData {
    entries: HashMap<String, Entry>,
    /// Insertion sequence -> key
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl PartitionData {
    pub(crate) fn get(&self, key: &str) -> Option<&Entry> {
        self.entries.get(key)
    }

    pub(crate) fn get_mut(&mut self, key: &str) -> Option<&mut Entry> {
        self.entries.get_mut(key)
    }

    /// Create an entry with no subscribers; the key must be absent
    pub(crate) fn insert_new(&mut self, key: String, value: String) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, key.clone());
        self.entries.insert(
            key,
            Entry {
                value,
                seq,
                subscribers: SubscriberList::new(),
            },
        );
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }

    /// Entries in insertion order
    pub(crate) fn iter_ordered(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.order
            .values()
            .filter_map(|key| self.entries.get_key_value(key.as_str()))
            .map(|(k, e)| (k.as_str(), e))
    }

    /// Remove every entry, returning them in insertion order
    pub(crate) fn drain(&mut self) -> Vec<(String, Entry)> {
        let order = std::mem::take(&mut self.order);
        let mut entries = std::mem::take(&mut self.entries);
        order
            .into_values()
            .filter_map(|key| entries.remove_entry(&key))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// A lock-guarded partition
#[derive(Debug, Default)]
pub(crate) struct Partition {
    data: RwLock<PartitionData>,
}

impl Partition {
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, PartitionData> {
        self.data.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, PartitionData> {
        self.data.write()
    }
}
