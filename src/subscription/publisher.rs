//! Notification publisher
//!
//! Formats change/deletion events and fans them out to a key's subscribers.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;

use super::{Delivery, SubscriberList, SubscriptionRegistry};
use crate::protocol::{encode_notification, Notification};

/// Fans notifications out to subscriber sinks
///
/// Called with the key's partition write lock held, which orders the
/// frames of one key identically for every subscriber.
#[derive(Default)]
pub struct NotificationPublisher {
    queued: AtomicU64,
    dropped: AtomicU64,
}

impl NotificationPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `(key, value)` after a write to an existing key
    pub fn changed(&self, registry: &SubscriptionRegistry, key: &str, value: &str, list: &SubscriberList) {
        let notification = Notification::Changed {
            key: key.to_string(),
            value: value.to_string(),
        };
        self.publish(registry, &notification, list);
    }

    /// Publish `(key, DELETED)` before a key is removed
    pub fn deleted(&self, registry: &SubscriptionRegistry, key: &str, list: &SubscriberList) {
        let notification = Notification::Deleted {
            key: key.to_string(),
        };
        self.publish(registry, &notification, list);
    }

    /// Frames handed to sink queues so far
    pub fn queued(&self) -> u64 {
        self.queued.load(Ordering::Relaxed)
    }

    /// Frames discarded because a subscriber fell behind
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn publish(&self, registry: &SubscriptionRegistry, notification: &Notification, list: &SubscriberList) {
        if list.is_empty() {
            return;
        }

        let frame: Bytes = match encode_notification(notification) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Cannot encode notification for {:?}: {}", notification.key(), e);
                return;
            }
        };

        list.with_sinks(|sinks| {
            sinks.retain(|sink| match sink.send(frame.clone()) {
                Delivery::Queued => {
                    self.queued.fetch_add(1, Ordering::Relaxed);
                    true
                }
                Delivery::Dropped => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        "Subscriber {} is lagging, dropped notification for {:?}",
                        sink.id(),
                        notification.key()
                    );
                    true
                }
                Delivery::Dead => {
                    tracing::debug!("Unlinking dead subscriber {} from {:?}", sink.id(), notification.key());
                    registry.forget(sink.id(), notification.key());
                    false
                }
            });
        });
    }
}
