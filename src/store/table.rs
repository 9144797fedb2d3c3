//! Storage engine
//!
//! Partitioned table with sorted lock acquisition.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use super::partition::{Partition, PartitionData};
use super::{check_value, partition_index, partition_of, Snapshot, PARTITION_COUNT};
use crate::error::{KvsError, Result};
use crate::subscription::{NotificationPublisher, NotificationSink, SinkId, SubscriptionRegistry};

const UNINITIALIZED: u8 = 0;
const READY: u8 = 1;
const TERMINATED: u8 = 2;

/// The in-memory key-value table
///
/// ## Concurrency Model: Per-Partition Reader/Writer Locks
///
/// - **WRITE / DELETE**: exclusive locks on every partition they touch
/// - **READ / SUBSCRIBE / UNSUBSCRIBE**: shared locks
/// - **SHOW / snapshot**: shared locks on all partitions
///
/// Locks are always requested in ascending partition order and released
/// together once the operation is done.
///
/// ## Lifecycle
/// `new` -> `init` (exactly once) -> operations -> `terminate`.
/// Any operation outside the ready state fails with `NotInitialized`.
pub struct StorageEngine {
    partitions: Box<[Partition]>,
    lifecycle: AtomicU8,
    registry: SubscriptionRegistry,
    publisher: NotificationPublisher,
}

/// Write guards held by one operation, ascending by partition
type WriteLocks<'a> = Vec<(usize, RwLockWriteGuard<'a, PartitionData>)>;

/// Read guards held by one operation, ascending by partition
type ReadLocks<'a> = Vec<(usize, RwLockReadGuard<'a, PartitionData>)>;

impl StorageEngine {
    /// Create an engine; it must be `init`ed before use
    pub fn new() -> Self {
        let partitions = (0..PARTITION_COUNT)
            .map(|_| Partition::default())
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            partitions,
            lifecycle: AtomicU8::new(UNINITIALIZED),
            registry: SubscriptionRegistry::new(),
            publisher: NotificationPublisher::new(),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Make the engine ready; fails if it was ever initialized before
    pub fn init(&self) -> Result<()> {
        self.lifecycle
            .compare_exchange(UNINITIALIZED, READY, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| {
                tracing::error!("KVS state has already been initialized");
                KvsError::AlreadyInitialized
            })
    }

    /// Free every entry; the engine cannot be used afterwards
    pub fn terminate(&self) -> Result<()> {
        self.lifecycle
            .compare_exchange(READY, TERMINATED, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| {
                tracing::error!("KVS state must be initialized");
                KvsError::NotInitialized
            })?;

        let mut locks = self.lock_exclusive(0..PARTITION_COUNT);
        let mut freed = 0;
        for (_, data) in locks.iter_mut() {
            for (key, entry) in data.drain() {
                self.registry.release_key(&key, entry.subscribers());
                freed += 1;
            }
        }
        self.registry.clear();

        tracing::debug!("Store terminated, {} entries freed", freed);
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.lifecycle.load(Ordering::Acquire) == READY
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.is_ready() {
            Ok(())
        } else {
            tracing::error!("KVS state must be initialized");
            Err(KvsError::NotInitialized)
        }
    }

    // =========================================================================
    // Key-Value Operations
    // =========================================================================

    /// Write every pair, creating missing keys
    ///
    /// Overwriting an existing key notifies its subscribers. When a key
    /// appears more than once, its last value wins.
    pub fn write(&self, pairs: Vec<(String, String)>) -> Result<()> {
        self.ensure_ready()?;

        // Reversed so that the stable sort puts the last occurrence first
        let mut plan = Vec::with_capacity(pairs.len());
        for (key, value) in pairs.into_iter().rev() {
            let index = partition_of(&key)?;
            check_value(&key, &value)?;
            plan.push((index, key, value));
        }
        plan.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));
        plan.dedup_by(|later, kept| later.1 == kept.1);

        let mut locks = self.lock_exclusive(plan.iter().map(|(index, _, _)| *index));
        let mut items = plan.into_iter().peekable();

        for (index, data) in locks.iter_mut() {
            while let Some((_, key, value)) = items.next_if(|item| item.0 == *index) {
                match data.get_mut(&key) {
                    Some(entry) => {
                        entry.replace_value(value);
                        self.publisher
                            .changed(&self.registry, &key, entry.value(), entry.subscribers());
                    }
                    None => data.insert_new(key, value),
                }
            }
        }

        Ok(())
    }

    /// Read every key; missing keys map to `None`
    ///
    /// Results come back in lock order: by partition, then by key.
    pub fn read(&self, keys: Vec<String>) -> Result<Vec<(String, Option<String>)>> {
        self.ensure_ready()?;

        let plan = Self::plan_keys(keys)?;
        let locks = self.lock_shared(plan.iter().map(|(index, _)| *index));
        let mut items = plan.into_iter().peekable();
        let mut results = Vec::new();

        for (index, data) in locks.iter() {
            while let Some((_, key)) = items.next_if(|item| item.0 == *index) {
                let value = data.get(&key).map(|entry| entry.value().to_string());
                results.push((key, value));
            }
        }

        Ok(results)
    }

    /// Delete every key, returning the ones that did not exist
    ///
    /// Subscribers of a deleted key are told before its list is cleared.
    pub fn delete(&self, keys: Vec<String>) -> Result<Vec<String>> {
        self.ensure_ready()?;

        let plan = Self::plan_keys(keys)?;
        let mut locks = self.lock_exclusive(plan.iter().map(|(index, _)| *index));
        let mut items = plan.into_iter().peekable();
        let mut missing = Vec::new();

        for (index, data) in locks.iter_mut() {
            while let Some((_, key)) = items.next_if(|item| item.0 == *index) {
                match data.remove(&key) {
                    Some(entry) => {
                        self.publisher
                            .deleted(&self.registry, &key, entry.subscribers());
                        self.registry.release_key(&key, entry.subscribers());
                    }
                    None => missing.push(key),
                }
            }
        }

        Ok(missing)
    }

    /// Copy every pair under shared locks on all partitions
    ///
    /// The locks are released as soon as the copy is taken.
    pub fn show(&self) -> Result<Snapshot> {
        self.ensure_ready()?;

        let locks = self.lock_shared(0..PARTITION_COUNT);
        let pairs = locks
            .iter()
            .flat_map(|(_, data)| {
                data.iter_ordered()
                    .map(|(key, entry)| (key.to_string(), entry.value().to_string()))
            })
            .collect();

        Ok(Snapshot::new(pairs))
    }

    /// Total number of keys
    pub fn len(&self) -> Result<usize> {
        self.ensure_ready()?;
        let locks = self.lock_shared(0..PARTITION_COUNT);
        Ok(locks.iter().map(|(_, data)| data.len()).sum())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Subscribe `sink` to `key`; false when the key does not exist
    ///
    /// Subscribing twice is a no-op that still reports success.
    pub fn subscribe(&self, key: &str, sink: &Arc<NotificationSink>) -> Result<bool> {
        self.ensure_ready()?;

        let Some(index) = partition_index(key) else {
            return Ok(false);
        };

        let data = self.partitions[index].read();
        match data.get(key) {
            Some(entry) => {
                self.registry.attach(key, entry.subscribers(), sink);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Unsubscribe `sink` from `key`; false when either is absent
    pub fn unsubscribe(&self, key: &str, sink: SinkId) -> Result<bool> {
        self.ensure_ready()?;

        let Some(index) = partition_index(key) else {
            return Ok(false);
        };

        let data = self.partitions[index].read();
        Ok(data
            .get(key)
            .map(|entry| self.registry.detach(key, entry.subscribers(), sink))
            .unwrap_or(false))
    }

    /// Drop every subscription held by `sink`, returning how many there were
    ///
    /// Takes one partition lock at a time, so it runs alongside ordinary
    /// traffic on other partitions.
    pub fn remove_all_subscriptions_for(&self, sink: SinkId) -> Result<usize> {
        self.ensure_ready()?;

        let mut keys: Vec<(usize, String)> = self
            .registry
            .take_keys(sink)
            .into_iter()
            .filter_map(|key| partition_index(&key).map(|index| (index, key)))
            .collect();
        keys.sort();

        let mut removed = 0;
        for (index, key) in keys {
            let data = self.partitions[index].read();
            if let Some(entry) = data.get(&key) {
                if self.registry.detach(&key, entry.subscribers(), sink) {
                    removed += 1;
                }
            }
        }

        tracing::debug!("Removed {} subscriptions of {}", removed, sink);
        Ok(removed)
    }

    /// Number of subscribers of `key`, or `None` if the key does not exist
    pub fn subscriber_count(&self, key: &str) -> Result<Option<usize>> {
        self.ensure_ready()?;

        let Some(index) = partition_index(key) else {
            return Ok(None);
        };
        let data = self.partitions[index].read();
        Ok(data.get(key).map(|entry| entry.subscribers().len()))
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn publisher(&self) -> &NotificationPublisher {
        &self.publisher
    }

    // =========================================================================
    // Lock Ordering
    // =========================================================================

    /// Validate keys, sort them into lock order and drop duplicates
    fn plan_keys(keys: Vec<String>) -> Result<Vec<(usize, String)>> {
        let mut plan = keys
            .into_iter()
            .map(|key| partition_of(&key).map(|index| (index, key)))
            .collect::<Result<Vec<_>>>()?;
        plan.sort();
        plan.dedup();
        Ok(plan)
    }

    /// Exclusively lock each distinct partition, in ascending order
    fn lock_exclusive(&self, indices: impl IntoIterator<Item = usize>) -> WriteLocks<'_> {
        Self::ascending(indices)
            .into_iter()
            .map(|index| (index, self.partitions[index].write()))
            .collect()
    }

    /// Share-lock each distinct partition, in ascending order
    fn lock_shared(&self, indices: impl IntoIterator<Item = usize>) -> ReadLocks<'_> {
        Self::ascending(indices)
            .into_iter()
            .map(|index| (index, self.partitions[index].read()))
            .collect()
    }

    fn ascending(indices: impl IntoIterator<Item = usize>) -> Vec<usize> {
        let mut indices: Vec<usize> = indices.into_iter().collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}
