//! Session worker
//!
//! Runs the request/response protocol of one connected client.

use std::io::{BufReader, ErrorKind};
use std::sync::Arc;
use std::thread::JoinHandle;

use super::{ChannelReader, ChannelWriter, Transport};
use crate::backup::BackupSource;
use crate::engine::Engine;
use crate::error::{KvsError, Result};
use crate::pool::Permit;
use crate::protocol::{
    decode_command_line, parse_line, read_command_frame, read_key_field, read_opcode,
    write_command_response, write_response_code, ConnectRequest, OpCode, ResponseCode,
};
use crate::subscription::NotificationSink;

/// Protocol state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Channels are being opened
    Connecting,

    /// Serving requests
    Active,

    /// Disconnected; resources released
    Closed,
}

/// What the loop does after a request
enum Flow {
    Continue,
    Close,
}

/// Opens sessions from dequeued connect requests
pub struct SessionWorker;

impl SessionWorker {
    /// Open the channels of `request` and acknowledge the connect
    ///
    /// Order: response channel, connect ack, request channel, notification
    /// channel. Any failure aborts the session and returns its permit.
    pub fn establish(
        id: u64,
        request: &ConnectRequest,
        permit: Permit,
        engine: Arc<Engine>,
        transport: &dyn Transport,
    ) -> Result<Session> {
        tracing::debug!("Session {} connecting", id);

        let mut response = transport.open_response(&request.response_channel)?;
        write_response_code(&mut response, ResponseCode::ConnectOk)?;

        let request_channel = transport.open_request(&request.request_channel)?;
        let notification = transport.open_notification(&request.notification_channel)?;

        let depth = engine.config().notification_queue_depth;
        let (sink, notifier) = NotificationSink::spawn(notification, depth)?;

        let backup_source = BackupSource::named(&engine.config().backup_dir, &format!("session-{}", id));

        tracing::debug!("Session {} active (notifications via {})", id, sink.id());

        Ok(Session {
            id,
            state: SessionState::Active,
            request: BufReader::new(request_channel),
            response,
            sink,
            notifier: Some(notifier),
            backup_source,
            engine,
            _permit: permit,
        })
    }
}

/// One connected client
pub struct Session {
    id: u64,
    state: SessionState,

    /// Request channel (buffered for efficiency)
    request: BufReader<ChannelReader>,

    /// Response channel
    response: ChannelWriter,

    /// Notification channel, shared with subscriber lists
    sink: Arc<NotificationSink>,

    /// Writer thread of `sink`
    notifier: Option<JoinHandle<()>>,

    /// Names the backups this session requests
    backup_source: BackupSource,

    engine: Arc<Engine>,

    /// Admission gate permit, released when the session is dropped
    _permit: Permit,
}

impl Session {
    /// Serve requests until the client disconnects or a channel fails
    ///
    /// EOF on the request channel counts as a disconnect. Either way the
    /// session's subscriptions are removed before its channels close.
    pub fn run(mut self) -> Result<()> {
        let outcome = loop {
            match self.step() {
                Ok(Flow::Continue) => continue,
                Ok(Flow::Close) => break Ok(()),
                Err(e) => {
                    tracing::warn!("Session {} failed: {}", self.id, e);
                    break Err(e);
                }
            }
        };

        self.close();
        outcome
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Read and execute one request
    fn step(&mut self) -> Result<Flow> {
        let op = match read_opcode(&mut self.request) {
            Ok(op) => op,
            Err(KvsError::Io(ref e)) if e.kind() == ErrorKind::UnexpectedEof => {
                tracing::debug!("Session {} closed its request channel", self.id);
                return Ok(Flow::Close);
            }
            Err(e) => return Err(e),
        };

        match OpCode::try_from(op) {
            Ok(OpCode::Disconnect) => {
                self.engine
                    .store()
                    .remove_all_subscriptions_for(self.sink.id())?;
                write_response_code(&mut self.response, ResponseCode::Disconnected)?;
                tracing::debug!("Session {} disconnected", self.id);
                Ok(Flow::Close)
            }
            Ok(OpCode::Subscribe) => {
                let found = match self.read_key()? {
                    Some(key) => self.engine.store().subscribe(&key, &self.sink)?,
                    None => false,
                };
                let code = if found {
                    ResponseCode::Subscribed
                } else {
                    ResponseCode::SubscribeKeyNotFound
                };
                write_response_code(&mut self.response, code)?;
                Ok(Flow::Continue)
            }
            Ok(OpCode::Unsubscribe) => {
                let removed = match self.read_key()? {
                    Some(key) => self.engine.store().unsubscribe(&key, self.sink.id())?,
                    None => false,
                };
                let code = if removed {
                    ResponseCode::Unsubscribed
                } else {
                    ResponseCode::SubscriptionNotFound
                };
                write_response_code(&mut self.response, code)?;
                Ok(Flow::Continue)
            }
            Ok(OpCode::Command) => {
                // An oversized length desyncs the stream and ends the session
                let payload = read_command_frame(&mut self.request)?;
                match decode_command_line(payload) {
                    Ok(line) => self.run_command(&line)?,
                    Err(e) => self.reject(&e)?,
                }
                Ok(Flow::Continue)
            }
            Ok(OpCode::Connect) | Err(_) => {
                tracing::warn!("Session {}: unexpected opcode 0x{:02x}, ignored", self.id, op);
                Ok(Flow::Continue)
            }
        }
    }

    /// Read a key field; `None` when the field does not decode
    fn read_key(&mut self) -> Result<Option<String>> {
        match read_key_field(&mut self.request) {
            Ok(key) => Ok(Some(key)),
            Err(KvsError::Io(e)) => Err(KvsError::Io(e)),
            Err(e) => {
                tracing::warn!("Session {}: bad key field: {}", self.id, e);
                Ok(None)
            }
        }
    }

    /// Parse and execute one job-script line, replying with its output
    fn run_command(&mut self, line: &str) -> Result<()> {
        let command = match parse_line(line) {
            Ok(Some(command)) => command,
            Ok(None) => {
                return write_command_response(&mut self.response, ResponseCode::CommandOk, b"");
            }
            Err(e) => return self.reject(&e),
        };

        let mut output = Vec::new();
        match self
            .engine
            .execute(command, &mut self.backup_source, &mut output)
        {
            Ok(()) => write_command_response(&mut self.response, ResponseCode::CommandOk, &output),
            Err(e) => self.reject(&e),
        }
    }

    /// Answer a command with `CommandRejected` and the error text
    fn reject(&mut self, error: &KvsError) -> Result<()> {
        tracing::warn!("Session {}: command rejected: {}", self.id, error);
        let text = error.to_string();
        write_command_response(&mut self.response, ResponseCode::CommandRejected, text.as_bytes())
    }

    /// Unlink every subscription, stop the notifier and mark the session closed
    fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }

        if let Err(e) = self
            .engine
            .store()
            .remove_all_subscriptions_for(self.sink.id())
        {
            tracing::warn!("Session {}: cannot remove subscriptions: {}", self.id, e);
        }

        self.sink.close();
        if let Some(notifier) = self.notifier.take() {
            if notifier.join().is_err() {
                tracing::error!("Notifier of session {} panicked", self.id);
            }
        }

        self.state = SessionState::Closed;
        tracing::debug!("Session {} closed", self.id);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
