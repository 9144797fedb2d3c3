//! Job-script parser
//!
//! One command per line:
//! ```text
//! WRITE [(key,value)(key2,value2)]
//! READ [key,key2]
//! DELETE [key,key2]
//! SHOW
//! WAIT <delay_ms>
//! BACKUP
//! HELP
//! # comment
//! ```

use std::time::Duration;

use super::{Command, MAX_WRITE_SIZE};
use crate::error::{KvsError, Result};

/// Parse one script line
///
/// Returns `Ok(None)` for blank lines and comments.
pub fn parse_line(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let command = match verb {
        "WRITE" => Command::Write {
            pairs: parse_pairs(rest)?,
        },
        "READ" => Command::Read {
            keys: parse_keys(rest)?,
        },
        "DELETE" => Command::Delete {
            keys: parse_keys(rest)?,
        },
        "SHOW" => no_args(verb, rest, Command::Show)?,
        "BACKUP" => no_args(verb, rest, Command::Backup)?,
        "HELP" => no_args(verb, rest, Command::Help)?,
        "WAIT" => {
            let delay: u64 = rest
                .parse()
                .map_err(|_| KvsError::Parse(format!("WAIT expects milliseconds, got {:?}", rest)))?;
            Command::Wait {
                delay: Duration::from_millis(delay),
            }
        }
        _ => return Err(KvsError::Parse(format!("Unknown command {:?}", verb))),
    };

    Ok(Some(command))
}

fn no_args(verb: &str, rest: &str, command: Command) -> Result<Command> {
    if rest.is_empty() {
        Ok(command)
    } else {
        Err(KvsError::Parse(format!("{} takes no arguments", verb)))
    }
}

/// Strip the surrounding `[` `]`
fn bracketed<'a>(verb: &str, rest: &'a str) -> Result<&'a str> {
    rest.strip_prefix('[')
        .and_then(|r| r.strip_suffix(']'))
        .map(str::trim)
        .ok_or_else(|| KvsError::Parse(format!("{} expects a [...] list", verb)))
}

fn check_count(len: usize) -> Result<()> {
    match len {
        0 => Err(KvsError::Parse("Empty list".to_string())),
        n if n > MAX_WRITE_SIZE => Err(KvsError::Parse(format!(
            "Too many entries: {} (max {})",
            n, MAX_WRITE_SIZE
        ))),
        _ => Ok(()),
    }
}

/// `[k1,k2,...]`
fn parse_keys(rest: &str) -> Result<Vec<String>> {
    let inner = bracketed("READ/DELETE", rest)?;

    let keys = inner
        .split(',')
        .map(str::trim)
        .map(|key| {
            if key.is_empty() {
                Err(KvsError::Parse("Empty key in list".to_string()))
            } else {
                Ok(key.to_string())
            }
        })
        .collect::<Result<Vec<_>>>()?;

    check_count(keys.len())?;
    Ok(keys)
}

/// `[(k1,v1)(k2,v2)...]`, pairs optionally separated by commas or spaces
fn parse_pairs(rest: &str) -> Result<Vec<(String, String)>> {
    let mut remaining = bracketed("WRITE", rest)?;
    let mut pairs = Vec::new();

    loop {
        remaining = remaining.trim_start_matches(|c: char| c == ',' || c.is_whitespace());
        if remaining.is_empty() {
            break;
        }

        let body = remaining
            .strip_prefix('(')
            .ok_or_else(|| KvsError::Parse(format!("Expected '(' at {:?}", remaining)))?;
        let close = body
            .find(')')
            .ok_or_else(|| KvsError::Parse("Unterminated pair".to_string()))?;

        let (key, value) = body[..close]
            .split_once(',')
            .ok_or_else(|| KvsError::Parse(format!("Pair {:?} lacks a value", &body[..close])))?;
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() {
            return Err(KvsError::Parse("Empty key in pair".to_string()));
        }

        pairs.push((key.to_string(), value.to_string()));
        remaining = &body[close + 1..];
    }

    check_count(pairs.len())?;
    Ok(pairs)
}
