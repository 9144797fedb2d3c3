//! Channel transport
//!
//! Opens the byte channels named in a connect request. Creating and
//! removing the channels is the client's business.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;

/// Read side of a session channel
pub type ChannelReader = Box<dyn Read + Send>;

/// Write side of a session channel
pub type ChannelWriter = Box<dyn Write + Send>;

/// Opens session channels by id
pub trait Transport: Send + Sync {
    /// Open the channel the server writes responses to
    fn open_response(&self, id: &str) -> io::Result<ChannelWriter>;

    /// Open the channel the server reads requests from
    fn open_request(&self, id: &str) -> io::Result<ChannelReader>;

    /// Open the channel the server pushes notifications to
    fn open_notification(&self, id: &str) -> io::Result<ChannelWriter>;
}

/// Channels are named pipes; ids are their paths
#[derive(Debug, Default, Clone, Copy)]
pub struct FifoTransport;

impl FifoTransport {
    /// Open the registration pipe for reading connect messages
    ///
    /// Blocks until a client opens it for writing.
    pub fn open_registration(path: &Path) -> io::Result<File> {
        OpenOptions::new().read(true).open(path)
    }

    fn open_write(id: &str) -> io::Result<ChannelWriter> {
        let file = OpenOptions::new().write(true).open(id)?;
        Ok(Box::new(file))
    }
}

impl Transport for FifoTransport {
    fn open_response(&self, id: &str) -> io::Result<ChannelWriter> {
        Self::open_write(id)
    }

    fn open_request(&self, id: &str) -> io::Result<ChannelReader> {
        let file = OpenOptions::new().read(true).open(id)?;
        Ok(Box::new(file))
    }

    fn open_notification(&self, id: &str) -> io::Result<ChannelWriter> {
        Self::open_write(id)
    }
}

