//! Bounded Concurrency Primitives
//!
//! Shared by session admission, batch job dispatch and backups.
//!
//! ## Responsibilities
//! - `WorkerPool`: fixed set of named threads fed through a bounded channel
//! - `Semaphore`: counting permits with RAII guards that may cross threads

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Sender};
use parking_lot::{Condvar, Mutex};

use crate::error::{KvsError, Result};

// =============================================================================
// Worker Pool
// =============================================================================

/// Fixed-size pool of worker threads consuming tasks of type `T`
///
/// `submit` blocks while the task queue is full, so the producer is
/// throttled to the pool's pace. A queue capacity of zero makes every
/// submission a rendezvous with an idle worker.
pub struct WorkerPool<T: Send + 'static> {
    name: String,
    sender: Option<Sender<T>>,
    workers: Vec<JoinHandle<()>>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Spawn `workers` threads running `handler` for every submitted task
    ///
    /// The handler receives the worker index alongside the task.
    pub fn spawn<F>(name: &str, workers: usize, queue_capacity: usize, handler: F) -> Result<Self>
    where
        F: Fn(usize, T) + Send + Sync + 'static,
    {
        if workers == 0 {
            return Err(KvsError::Config(format!(
                "pool '{}' needs at least one worker",
                name
            )));
        }

        let (sender, receiver) = channel::bounded::<T>(queue_capacity);
        let handler = Arc::new(handler);
        let mut handles = Vec::with_capacity(workers);

        for index in 0..workers {
            let receiver = receiver.clone();
            let handler = Arc::clone(&handler);
            let thread_name = format!("{}-{}", name, index);

            let handle = thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || {
                    // Ends once the sender is dropped and the queue is drained
                    for task in receiver.iter() {
                        let outcome =
                            panic::catch_unwind(AssertUnwindSafe(|| handler(index, task)));
                        if outcome.is_err() {
                            tracing::error!("Task panicked on worker {}", thread_name);
                        }
                    }
                })?;
            handles.push(handle);
        }

        tracing::debug!("Pool '{}' started with {} workers", name, workers);

        Ok(Self {
            name: name.to_string(),
            sender: Some(sender),
            workers: handles,
        })
    }

    /// Queue a task, blocking while the queue is full
    pub fn submit(&self, task: T) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| KvsError::ChannelClosed(format!("pool '{}' is shut down", self.name)))?;

        sender
            .send(task)
            .map_err(|_| KvsError::ChannelClosed(format!("pool '{}' has no workers", self.name)))
    }

    /// Number of worker threads
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Stop accepting tasks, let workers drain the queue, and join them
    pub fn shutdown(mut self) {
        self.drain();
    }

    fn drain(&mut self) {
        self.sender.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!("Worker of pool '{}' exited abnormally", self.name);
            }
        }
    }
}

impl<T: Send + 'static> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        self.drain();
    }
}

// =============================================================================
// Semaphore
// =============================================================================

/// Counting semaphore with owned permits
pub struct Semaphore {
    permits: Mutex<usize>,
    released: Condvar,
    capacity: usize,
}

impl Semaphore {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            permits: Mutex::new(capacity),
            released: Condvar::new(),
            capacity,
        })
    }

    /// Block until a permit is free and take it
    pub fn acquire(self: &Arc<Self>) -> Permit {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            self.released.wait(&mut permits);
        }
        *permits -= 1;

        Permit {
            semaphore: Arc::clone(self),
        }
    }

    /// Take a permit only if one is free right now
    pub fn try_acquire(self: &Arc<Self>) -> Option<Permit> {
        let mut permits = self.permits.lock();
        if *permits == 0 {
            return None;
        }
        *permits -= 1;

        Some(Permit {
            semaphore: Arc::clone(self),
        })
    }

    /// Block until every permit has been returned
    pub fn wait_idle(&self) {
        let mut permits = self.permits.lock();
        while *permits < self.capacity {
            self.released.wait(&mut permits);
        }
    }

    /// Permits currently free
    pub fn available(&self) -> usize {
        *self.permits.lock()
    }

    /// Permits currently held
    pub fn in_use(&self) -> usize {
        self.capacity - self.available()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn release(&self) {
        let mut permits = self.permits.lock();
        *permits += 1;
        self.released.notify_all();
    }
}

/// A held permit, returned to its semaphore on drop
pub struct Permit {
    semaphore: Arc<Semaphore>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

impl std::fmt::Debug for Permit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Permit")
            .field("capacity", &self.semaphore.capacity)
            .finish()
    }
}
