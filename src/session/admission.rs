//! Session admission
//!
//! Gate, queue and worker pool between the registration channel and live
//! sessions.

use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::{SessionWorker, Transport};
use crate::engine::Engine;
use crate::error::{KvsError, Result};
use crate::pool::{Permit, Semaphore, WorkerPool};
use crate::protocol::{read_connect, ConnectRequest};

/// A connect request that holds a gate permit and waits for a worker
#[derive(Debug)]
pub struct PendingSession {
    pub id: u64,
    pub request: ConnectRequest,
    pub permit: Permit,
}

/// Admits clients into sessions
///
/// Two independent bounds:
/// - **gate**: at most `max_sessions` sessions exist at once; the permit is
///   taken before queueing and returned when the session is dropped
/// - **queue**: at most `admission_queue_capacity` admitted requests wait
///   for a free worker; the listener blocks beyond that
pub struct SessionAdmission {
    gate: Arc<Semaphore>,
    pool: WorkerPool<PendingSession>,
    next_id: AtomicU64,
}

impl SessionAdmission {
    /// Start the session worker pool
    pub fn start(engine: Arc<Engine>, transport: Arc<dyn Transport>) -> Result<Self> {
        let config = engine.config().clone();
        let gate = Semaphore::new(config.max_sessions);

        let pool = WorkerPool::spawn(
            "session",
            config.session_workers,
            config.admission_queue_capacity,
            move |worker, pending: PendingSession| {
                let PendingSession { id, request, permit } = pending;
                tracing::debug!("Worker {} picked up session {}", worker, id);

                match SessionWorker::establish(id, &request, permit, Arc::clone(&engine), transport.as_ref()) {
                    Ok(session) => {
                        if let Err(e) = session.run() {
                            tracing::debug!("Session {} ended with error: {}", id, e);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Session {} aborted while connecting: {}", id, e);
                    }
                }
            },
        )?;

        tracing::info!(
            "Session admission ready ({} workers, {} sessions max, queue {})",
            config.session_workers,
            config.max_sessions,
            config.admission_queue_capacity
        );

        Ok(Self {
            gate,
            pool,
            next_id: AtomicU64::new(1),
        })
    }

    /// Admit one client: wait for a gate permit, then queue the request
    ///
    /// Returns the new session id.
    pub fn admit(&self, request: ConnectRequest) -> Result<u64> {
        let permit = self.gate.acquire();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            "Admitting session {} (request={}, response={}, notify={})",
            id,
            request.request_channel,
            request.response_channel,
            request.notification_channel
        );

        self.pool.submit(PendingSession {
            id,
            request,
            permit,
        })?;
        Ok(id)
    }

    /// Admit every connect message read from `registration` until EOF
    ///
    /// Malformed messages are logged and skipped. Returns the number of
    /// sessions admitted.
    pub fn listen<R: Read>(&self, registration: &mut R) -> Result<usize> {
        let mut admitted = 0;

        loop {
            match read_connect(registration) {
                Ok(request) => {
                    self.admit(request)?;
                    admitted += 1;
                }
                Err(KvsError::Io(ref e)) if e.kind() == ErrorKind::UnexpectedEof => {
                    return Ok(admitted);
                }
                Err(KvsError::Io(e)) => return Err(KvsError::Io(e)),
                Err(e) => {
                    tracing::warn!("Ignoring connect message: {}", e);
                }
            }
        }
    }

    /// Sessions currently holding a gate permit
    pub fn active_sessions(&self) -> usize {
        self.gate.in_use()
    }

    pub fn max_sessions(&self) -> usize {
        self.gate.capacity()
    }

    /// Stop admitting and wait for every session to finish
    pub fn shutdown(self) {
        self.pool.shutdown();
    }
}
