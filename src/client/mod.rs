//! Client Module
//!
//! The client half of a session.
//!
//! ## Flow
//! 1. Create the request, response and notification pipes
//! 2. Send the connect message over the registration pipe
//! 3. Open the pipes in the order the server opens its ends
//! 4. Print every notification from a dedicated reader thread
//! 5. Issue requests until DISCONNECT or end of input

mod api;
mod input;

pub use api::{Connector, FifoConnector, KvsClient};
pub use input::{parse_client_line, ClientCommand};
