//! Client input lines
//!
//! ```text
//! SUBSCRIBE [key]
//! UNSUBSCRIBE [key]
//! DELAY <delay_ms>
//! DISCONNECT
//! ```
//! Any other valid job-script line is sent to the server as a COMMAND.

use std::time::Duration;

use crate::error::{KvsError, Result};
use crate::protocol::{parse_line, MAX_STRING_SIZE};

/// One line of client input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Subscribe(String),
    Unsubscribe(String),
    /// Pause locally before the next line
    Delay(Duration),
    Disconnect,
    /// A job-script line executed by the server
    Remote(String),
}

/// Parse one input line; `Ok(None)` for blank lines and comments
pub fn parse_client_line(line: &str) -> Result<Option<ClientCommand>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let command = match verb {
        "SUBSCRIBE" => ClientCommand::Subscribe(single_key(verb, rest)?),
        "UNSUBSCRIBE" => ClientCommand::Unsubscribe(single_key(verb, rest)?),
        "DELAY" => {
            let delay: u64 = rest
                .parse()
                .map_err(|_| KvsError::Parse(format!("DELAY expects milliseconds, got {:?}", rest)))?;
            ClientCommand::Delay(Duration::from_millis(delay))
        }
        "DISCONNECT" if rest.is_empty() => ClientCommand::Disconnect,
        "DISCONNECT" => return Err(KvsError::Parse("DISCONNECT takes no arguments".to_string())),
        _ => {
            // Validate locally so bad lines never reach the server
            parse_line(line)?;
            ClientCommand::Remote(line.to_string())
        }
    };

    Ok(Some(command))
}

/// `[key]`
fn single_key(verb: &str, rest: &str) -> Result<String> {
    let key = rest
        .strip_prefix('[')
        .and_then(|r| r.strip_suffix(']'))
        .map(str::trim)
        .ok_or_else(|| KvsError::Parse(format!("{} expects [key]", verb)))?;

    if key.is_empty() || key.contains(',') {
        return Err(KvsError::Parse(format!("{} expects exactly one key", verb)));
    }
    if key.len() > MAX_STRING_SIZE {
        return Err(KvsError::InvalidKey(key.to_string()));
    }
    Ok(key.to_string())
}
