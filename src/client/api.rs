//! Client session API

use std::ffi::CString;
use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::thread::{self, JoinHandle};

use crate::error::{KvsError, Result};
use crate::protocol::{
    encode_command_request, encode_connect, encode_key_request, read_command_response,
    read_notification, read_response_code, ConnectRequest, Notification, OpCode, ResponseCode,
};
use crate::session::{ChannelReader, ChannelWriter};

/// Opens the client ends of session channels by id
pub trait Connector {
    /// Open the channel responses arrive on
    fn open_response(&self, id: &str) -> io::Result<ChannelReader>;

    /// Open the channel requests are sent on
    fn open_request(&self, id: &str) -> io::Result<ChannelWriter>;

    /// Open the channel notifications arrive on
    fn open_notification(&self, id: &str) -> io::Result<ChannelReader>;
}

/// Client ends of named pipes; ids are their paths
#[derive(Debug, Default, Clone, Copy)]
pub struct FifoConnector;

impl FifoConnector {
    /// Create the three pipes of `request`, replacing stale files
    pub fn create(request: &ConnectRequest) -> io::Result<()> {
        for id in channel_ids(request) {
            make_fifo(Path::new(id))?;
        }
        Ok(())
    }

    /// Remove the three pipes of `request`
    pub fn remove(request: &ConnectRequest) {
        for id in channel_ids(request) {
            if let Err(e) = fs::remove_file(id) {
                if e.kind() != ErrorKind::NotFound {
                    tracing::warn!("Cannot remove {}: {}", id, e);
                }
            }
        }
    }
}

impl Connector for FifoConnector {
    fn open_response(&self, id: &str) -> io::Result<ChannelReader> {
        Ok(Box::new(OpenOptions::new().read(true).open(id)?))
    }

    fn open_request(&self, id: &str) -> io::Result<ChannelWriter> {
        Ok(Box::new(OpenOptions::new().write(true).open(id)?))
    }

    fn open_notification(&self, id: &str) -> io::Result<ChannelReader> {
        Ok(Box::new(OpenOptions::new().read(true).open(id)?))
    }
}

fn channel_ids(request: &ConnectRequest) -> [&str; 3] {
    [
        &request.request_channel,
        &request.response_channel,
        &request.notification_channel,
    ]
}

fn make_fifo(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    let path_cstr = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(ErrorKind::InvalidInput, e))?;

    // SAFETY: mkfifo() is a POSIX call and path_cstr is a valid
    // null-terminated C string that outlives the call.
    let result = unsafe { libc::mkfifo(path_cstr.as_ptr(), 0o666) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// A connected session, seen from the client
///
/// Notifications are handed to a callback on their own thread; everything
/// else is a blocking request/response exchange.
pub struct KvsClient {
    request: ChannelWriter,
    response: ChannelReader,
    notifier: Option<JoinHandle<()>>,
}

impl KvsClient {
    /// Register with the server and open the session channels
    ///
    /// Channels are opened response, request, notification; the server
    /// opens its ends in the same order, so two-sided pipe opens pair up.
    pub fn connect<W, F>(
        registration: &mut W,
        request: &ConnectRequest,
        connector: &dyn Connector,
        mut on_notification: F,
    ) -> Result<Self>
    where
        W: Write,
        F: FnMut(Notification) + Send + 'static,
    {
        registration.write_all(&encode_connect(request)?)?;
        registration.flush()?;

        let mut response = connector.open_response(&request.response_channel)?;
        let request_writer = connector.open_request(&request.request_channel)?;
        let mut notifications = connector.open_notification(&request.notification_channel)?;

        match read_response_code(&mut response)? {
            ResponseCode::ConnectOk => {}
            code => {
                return Err(KvsError::Protocol(format!(
                    "Connect answered with {:?}",
                    code
                )))
            }
        }

        let notifier = thread::Builder::new()
            .name("notifications".to_string())
            .spawn(move || loop {
                match read_notification(&mut notifications) {
                    Ok(notification) => on_notification(notification),
                    Err(KvsError::Io(ref e)) if e.kind() == ErrorKind::UnexpectedEof => {
                        tracing::debug!("Notification channel closed");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("Notification channel failed: {}", e);
                        break;
                    }
                }
            })?;

        tracing::debug!("Connected through {}", request.request_channel);

        Ok(Self {
            request: request_writer,
            response,
            notifier: Some(notifier),
        })
    }

    /// `Subscribed`, or `SubscribeKeyNotFound` when the key does not exist
    pub fn subscribe(&mut self, key: &str) -> Result<ResponseCode> {
        self.send(&encode_key_request(OpCode::Subscribe, key)?)?;
        self.expect(&[ResponseCode::Subscribed, ResponseCode::SubscribeKeyNotFound])
    }

    /// `Unsubscribed`, or `SubscriptionNotFound` when nothing was removed
    pub fn unsubscribe(&mut self, key: &str) -> Result<ResponseCode> {
        self.send(&encode_key_request(OpCode::Unsubscribe, key)?)?;
        self.expect(&[ResponseCode::Unsubscribed, ResponseCode::SubscriptionNotFound])
    }

    /// Run one job-script line on the server and return its output
    pub fn command(&mut self, line: &str) -> Result<(ResponseCode, String)> {
        self.send(&encode_command_request(line)?)?;
        read_command_response(&mut self.response)
    }

    /// End the session and wait for the notification thread to finish
    pub fn disconnect(mut self) -> Result<ResponseCode> {
        self.send(&[OpCode::Disconnect as u8])?;
        let code = self.expect(&[ResponseCode::Disconnected])?;

        // The server closes the notification channel once the session ends
        if let Some(notifier) = self.notifier.take() {
            if notifier.join().is_err() {
                tracing::error!("Notification thread panicked");
            }
        }
        Ok(code)
    }

    fn send(&mut self, frame: &[u8]) -> Result<()> {
        self.request.write_all(frame)?;
        self.request.flush()?;
        Ok(())
    }

    fn expect(&mut self, allowed: &[ResponseCode]) -> Result<ResponseCode> {
        let code = read_response_code(&mut self.response)?;
        if allowed.contains(&code) {
            Ok(code)
        } else {
            Err(KvsError::Protocol(format!("Unexpected response {:?}", code)))
        }
    }
}
