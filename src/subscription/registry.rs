//! Subscription registry
//!
//! Owns every add/remove of a subscription. Subscriber lists live inside
//! store entries; the registry keeps the reverse index in step with them.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{NotificationSink, SinkId};

/// Subscribers of one key
#[derive(Default)]
pub struct SubscriberList {
    sinks: Mutex<Vec<Arc<NotificationSink>>>,
}

impl SubscriberList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sinks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.lock().is_empty()
    }

    pub fn contains(&self, sink: SinkId) -> bool {
        self.sinks.lock().iter().any(|s| s.id() == sink)
    }

    /// Run `f` over the subscribers with the list locked
    pub(crate) fn with_sinks<R>(&self, f: impl FnOnce(&mut Vec<Arc<NotificationSink>>) -> R) -> R {
        f(&mut self.sinks.lock())
    }
}

impl std::fmt::Debug for SubscriberList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<SinkId> = self.sinks.lock().iter().map(|s| s.id()).collect();
        f.debug_list().entries(ids).finish()
    }
}

/// Reverse index from sink to the keys it is subscribed to
#[derive(Default)]
pub struct SubscriptionRegistry {
    index: Mutex<HashMap<SinkId, BTreeSet<String>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `sink` to `key`'s list unless it is already there
    ///
    /// Returns false when the sink was already subscribed.
    pub fn attach(&self, key: &str, list: &SubscriberList, sink: &Arc<NotificationSink>) -> bool {
        list.with_sinks(|sinks| {
            if sinks.iter().any(|s| s.id() == sink.id()) {
                return false;
            }
            sinks.push(Arc::clone(sink));
            self.index
                .lock()
                .entry(sink.id())
                .or_default()
                .insert(key.to_string());
            true
        })
    }

    /// Remove `sink` from `key`'s list
    ///
    /// Returns false when the sink was not subscribed.
    pub fn detach(&self, key: &str, list: &SubscriberList, sink: SinkId) -> bool {
        list.with_sinks(|sinks| {
            let Some(pos) = sinks.iter().position(|s| s.id() == sink) else {
                return false;
            };
            sinks.remove(pos);
            self.forget(sink, key);
            true
        })
    }

    /// Empty `key`'s list, dropping every sink's index entry for it
    pub fn release_key(&self, key: &str, list: &SubscriberList) {
        list.with_sinks(|sinks| {
            for sink in sinks.drain(..) {
                self.forget(sink.id(), key);
            }
        });
    }

    /// Remove and return every key `sink` is indexed under
    pub fn take_keys(&self, sink: SinkId) -> Vec<String> {
        self.index
            .lock()
            .remove(&sink)
            .map(|keys| keys.into_iter().collect())
            .unwrap_or_default()
    }

    /// Keys `sink` is currently subscribed to
    pub fn keys_of(&self, sink: SinkId) -> Vec<String> {
        self.index
            .lock()
            .get(&sink)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of sinks holding at least one subscription
    pub fn subscriber_count(&self) -> usize {
        self.index.lock().len()
    }

    /// Drop the whole index (store teardown)
    pub fn clear(&self) {
        self.index.lock().clear();
    }

    /// Drop one (sink, key) index entry; caller holds the key's list lock
    pub(crate) fn forget(&self, sink: SinkId, key: &str) {
        let mut index = self.index.lock();
        if let Some(keys) = index.get_mut(&sink) {
            keys.remove(key);
            if keys.is_empty() {
                index.remove(&sink);
            }
        }
    }
}
