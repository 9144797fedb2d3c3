//! Notification sinks
//!
//! A sink is the server-side handle of one client's notification channel.

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use crossbeam::channel::{self, Sender, TrySendError};
use parking_lot::Mutex;

use crate::error::Result;

/// Next sink id (process-wide, never reused)
static NEXT_SINK_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a sink in subscriber lists and the reverse index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SinkId(u64);

impl std::fmt::Display for SinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sink-{}", self.0)
    }
}

/// Outcome of handing a frame to a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Frame is queued for the writer thread
    Queued,

    /// Queue was full; the frame was discarded
    Dropped,

    /// Sink is closed or its channel failed
    Dead,
}

/// Write side of one subscriber's notification channel
///
/// Frames go through a bounded queue to a writer thread that owns the
/// channel, so a slow reader only ever stalls its own thread.
pub struct NotificationSink {
    id: SinkId,
    queue: Mutex<Option<Sender<Bytes>>>,
    alive: Arc<AtomicBool>,
    dropped: AtomicU64,
}

impl NotificationSink {
    /// Wrap `writer` in a sink and start its writer thread
    ///
    /// The returned handle finishes once the sink is closed and every
    /// queued frame has been written (or the channel failed).
    pub fn spawn<W>(writer: W, depth: usize) -> Result<(Arc<Self>, JoinHandle<()>)>
    where
        W: Write + Send + 'static,
    {
        let id = SinkId(NEXT_SINK_ID.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = channel::bounded::<Bytes>(depth.max(1));
        let alive = Arc::new(AtomicBool::new(true));

        let thread_alive = Arc::clone(&alive);
        let handle = thread::Builder::new()
            .name(format!("notify-{}", id.0))
            .spawn(move || {
                let mut writer = writer;
                for frame in receiver.iter() {
                    if let Err(e) = writer.write_all(&frame).and_then(|_| writer.flush()) {
                        tracing::debug!("Notification channel of {} failed: {}", id, e);
                        thread_alive.store(false, Ordering::Release);
                        return;
                    }
                }
            })?;

        let sink = Arc::new(Self {
            id,
            queue: Mutex::new(Some(sender)),
            alive,
            dropped: AtomicU64::new(0),
        });

        Ok((sink, handle))
    }

    pub fn id(&self) -> SinkId {
        self.id
    }

    /// Hand a frame to the writer thread without blocking
    pub fn send(&self, frame: Bytes) -> Delivery {
        if !self.is_alive() {
            return Delivery::Dead;
        }

        let queue = self.queue.lock();
        let Some(sender) = queue.as_ref() else {
            return Delivery::Dead;
        };

        match sender.try_send(frame) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Delivery::Dropped
            }
            Err(TrySendError::Disconnected(_)) => {
                self.alive.store(false, Ordering::Release);
                Delivery::Dead
            }
        }
    }

    /// Whether frames can still be delivered
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Frames discarded because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stop accepting frames; the writer thread exits after draining
    pub fn close(&self) {
        self.queue.lock().take();
        self.alive.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for NotificationSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationSink")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .field("dropped", &self.dropped())
            .finish()
    }
}
