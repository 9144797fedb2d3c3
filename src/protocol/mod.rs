//! Protocol Module
//!
//! Defines the fixed-width session protocol spoken over the three per-client
//! channels, the decoded command model, and the textual command results.
//!
//! ## Connect Message (registration channel)
//! ```text
//! ┌──────────┬──────────────────┬──────────────────┬──────────────────┐
//! │ Op (1)   │ Request id (40)  │ Response id (40) │ Notify id (40)   │
//! └──────────┴──────────────────┴──────────────────┴──────────────────┘
//! ```
//! Channel ids are NUL padded.
//!
//! ### Request Frames (request channel)
//! - 0x02: DISCONNECT  - no payload
//! - 0x03: SUBSCRIBE   - key field (41, NUL padded)
//! - 0x04: UNSUBSCRIBE - key field (41, NUL padded)
//! - 0x05: COMMAND     - len (2, big endian) + one job-script line
//!
//! ### Response Codes (response channel)
//! Two ASCII digits: operation then result.
//! - "10"/"11": connect ok / failed
//! - "20":      disconnected
//! - "30"/"31": subscribe key not found / subscribed
//! - "40"/"41": unsubscribed / subscription not found
//! - "50"/"51": command ok / rejected, followed by len (4, big endian) + text
//!
//! ### Notification Frame (notification channel)
//! ```text
//! ┌─────┬────────────────┬─────┬────────────────┬─────┐
//! │ '(' │ key (41, ' ')  │ ',' │ value (41, ' ') │ ')' │
//! └─────┴────────────────┴─────┴────────────────┴─────┘
//! ```
//! Deleted keys carry the value `DELETED`.

mod command;
mod response;
mod codec;
mod render;
mod script;

pub use command::{Command, ConnectRequest, OpCode};
pub use response::{Notification, ResponseCode};
pub use codec::{
    decode_command_line, decode_connect, decode_key_field, decode_notification,
    encode_command_request, encode_connect, encode_key_field, encode_key_request,
    encode_notification, read_command_frame, read_command_response, read_connect,
    read_key_field, read_notification, read_opcode, read_response_code, write_command_response,
    write_response_code,
};
pub use render::{
    render_missing, render_notification, render_read, render_show_line, HELP_TEXT, WAIT_MESSAGE,
};
pub use script::parse_line;

/// Max length in bytes of a key or value
pub const MAX_STRING_SIZE: usize = 40;

/// Width of a key field in request frames (key plus terminator slot)
pub const KEY_FIELD_WIDTH: usize = MAX_STRING_SIZE + 1;

/// Width of each channel id in the connect message
pub const MAX_PIPE_PATH_LENGTH: usize = 40;

/// Total size of a connect message
pub const CONNECT_MESSAGE_LEN: usize = 1 + 3 * MAX_PIPE_PATH_LENGTH;

/// Total size of a notification frame
pub const NOTIFICATION_FRAME_LEN: usize = 2 * MAX_STRING_SIZE + 5;

/// Max pairs or keys in a single command
pub const MAX_WRITE_SIZE: usize = 256;

/// Max length of a command line sent over a session
pub const MAX_COMMAND_LEN: usize = 16 * 1024;

/// Marker value carried by deletion notifications
pub const DELETED_MARKER: &str = "DELETED";
