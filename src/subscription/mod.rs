//! Subscription Module
//!
//! Key-level pub/sub: who is subscribed to what, and delivery of change and
//! deletion events.
//!
//! ## Responsibilities
//! - Per-key subscriber lists, each behind its own lock so subscription
//!   churn never waits on value mutation in other keys
//! - Reverse index (sink -> keys) so a disconnecting session is unlinked
//!   without scanning the whole table
//! - Best-effort, in-order fan-out: each subscriber drains its own bounded
//!   queue on a dedicated writer thread
//!
//! ## Lock Order
//! partition lock -> subscriber list lock -> reverse index lock

mod sink;
mod registry;
mod publisher;

pub use sink::{Delivery, NotificationSink, SinkId};
pub use registry::{SubscriberList, SubscriptionRegistry};
pub use publisher::NotificationPublisher;
