//! Protocol codec
//!
//! Encoding and decoding of the fixed-width session frames.
//!
//! Every padded field is filled explicitly: a frame never carries bytes
//! left over from a previous, longer value.

use std::io::{Read, Write};

use bytes::{BufMut, Bytes, BytesMut};

use super::{
    ConnectRequest, Notification, OpCode, ResponseCode, CONNECT_MESSAGE_LEN, DELETED_MARKER,
    KEY_FIELD_WIDTH, MAX_COMMAND_LEN, MAX_PIPE_PATH_LENGTH, MAX_STRING_SIZE,
    NOTIFICATION_FRAME_LEN,
};
use crate::error::{KvsError, Result};

/// Padding byte of request fields
const NUL: u8 = 0;

/// Padding byte of notification fields
const SPACE: u8 = b' ';

// =============================================================================
// Field Helpers
// =============================================================================

/// Append `value` to `buf`, padded with `pad` up to `width` bytes
fn put_padded(buf: &mut BytesMut, value: &[u8], width: usize, pad: u8) -> Result<()> {
    if value.len() > width {
        return Err(KvsError::Protocol(format!(
            "Field too long: {} bytes (max {})",
            value.len(),
            width
        )));
    }

    buf.put_slice(value);
    buf.put_bytes(pad, width - value.len());
    Ok(())
}

/// Decode a NUL padded field (everything up to the first NUL)
fn take_nul_padded(field: &[u8]) -> Result<String> {
    let end = field.iter().position(|&b| b == NUL).unwrap_or(field.len());
    String::from_utf8(field[..end].to_vec())
        .map_err(|e| KvsError::Protocol(format!("Field is not valid UTF-8: {}", e)))
}

/// Decode a space padded field
fn take_space_padded(field: &[u8]) -> Result<String> {
    let end = field
        .iter()
        .rposition(|&b| b != SPACE)
        .map(|i| i + 1)
        .unwrap_or(0);
    String::from_utf8(field[..end].to_vec())
        .map_err(|e| KvsError::Protocol(format!("Field is not valid UTF-8: {}", e)))
}

// =============================================================================
// Key Fields
// =============================================================================

/// Encode a key into its NUL padded request field
pub fn encode_key_field(key: &str) -> Result<Bytes> {
    if key.len() > MAX_STRING_SIZE {
        return Err(KvsError::InvalidKey(key.to_string()));
    }

    let mut buf = BytesMut::with_capacity(KEY_FIELD_WIDTH);
    put_padded(&mut buf, key.as_bytes(), KEY_FIELD_WIDTH, NUL)?;
    Ok(buf.freeze())
}

/// Decode a key from its request field
pub fn decode_key_field(field: &[u8]) -> Result<String> {
    if field.len() != KEY_FIELD_WIDTH {
        return Err(KvsError::Protocol(format!(
            "Key field must be {} bytes, got {}",
            KEY_FIELD_WIDTH,
            field.len()
        )));
    }
    take_nul_padded(field)
}

/// Encode a SUBSCRIBE/UNSUBSCRIBE request: opcode + key field
pub fn encode_key_request(op: OpCode, key: &str) -> Result<Bytes> {
    if !matches!(op, OpCode::Subscribe | OpCode::Unsubscribe) {
        return Err(KvsError::Protocol(format!("{:?} does not carry a key", op)));
    }

    let mut buf = BytesMut::with_capacity(1 + KEY_FIELD_WIDTH);
    buf.put_u8(op as u8);
    buf.put_slice(&encode_key_field(key)?);
    Ok(buf.freeze())
}

// =============================================================================
// Connect Message
// =============================================================================

/// Encode a connect message for the registration channel
pub fn encode_connect(request: &ConnectRequest) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(CONNECT_MESSAGE_LEN);
    buf.put_u8(OpCode::Connect as u8);
    for id in [
        &request.request_channel,
        &request.response_channel,
        &request.notification_channel,
    ] {
        put_padded(&mut buf, id.as_bytes(), MAX_PIPE_PATH_LENGTH, NUL)?;
    }
    Ok(buf.freeze())
}

/// Decode a connect message
pub fn decode_connect(bytes: &[u8]) -> Result<ConnectRequest> {
    if bytes.len() != CONNECT_MESSAGE_LEN {
        return Err(KvsError::Protocol(format!(
            "Connect message must be {} bytes, got {}",
            CONNECT_MESSAGE_LEN,
            bytes.len()
        )));
    }

    if OpCode::try_from(bytes[0])? != OpCode::Connect {
        return Err(KvsError::Protocol(format!(
            "Expected CONNECT on registration channel, got 0x{:02x}",
            bytes[0]
        )));
    }

    let field = |i: usize| {
        let start = 1 + i * MAX_PIPE_PATH_LENGTH;
        take_nul_padded(&bytes[start..start + MAX_PIPE_PATH_LENGTH])
    };

    let request = ConnectRequest {
        request_channel: field(0)?,
        response_channel: field(1)?,
        notification_channel: field(2)?,
    };

    if request.request_channel.is_empty()
        || request.response_channel.is_empty()
        || request.notification_channel.is_empty()
    {
        return Err(KvsError::Protocol(
            "Connect message has an empty channel id".to_string(),
        ));
    }

    Ok(request)
}

// =============================================================================
// Notifications
// =============================================================================

/// Encode a notification into its space padded frame
pub fn encode_notification(notification: &Notification) -> Result<Bytes> {
    let (key, value) = match notification {
        Notification::Changed { key, value } => (key.as_str(), value.as_str()),
        Notification::Deleted { key } => (key.as_str(), DELETED_MARKER),
    };

    let mut buf = BytesMut::with_capacity(NOTIFICATION_FRAME_LEN);
    buf.put_u8(b'(');
    put_padded(&mut buf, key.as_bytes(), KEY_FIELD_WIDTH, SPACE)?;
    buf.put_u8(b',');
    put_padded(&mut buf, value.as_bytes(), KEY_FIELD_WIDTH, SPACE)?;
    buf.put_u8(b')');
    Ok(buf.freeze())
}

/// Decode a notification frame
pub fn decode_notification(frame: &[u8]) -> Result<Notification> {
    if frame.len() != NOTIFICATION_FRAME_LEN {
        return Err(KvsError::Protocol(format!(
            "Notification frame must be {} bytes, got {}",
            NOTIFICATION_FRAME_LEN,
            frame.len()
        )));
    }

    let comma = 1 + KEY_FIELD_WIDTH;
    if frame[0] != b'(' || frame[comma] != b',' || frame[NOTIFICATION_FRAME_LEN - 1] != b')' {
        return Err(KvsError::Protocol("Malformed notification frame".to_string()));
    }

    let key = take_space_padded(&frame[1..comma])?;
    let value = take_space_padded(&frame[comma + 1..NOTIFICATION_FRAME_LEN - 1])?;

    if value == DELETED_MARKER {
        Ok(Notification::Deleted { key })
    } else {
        Ok(Notification::Changed { key, value })
    }
}

// =============================================================================
// Command Requests and Responses
// =============================================================================

/// Encode a COMMAND request: opcode + len (2) + script line
pub fn encode_command_request(line: &str) -> Result<Bytes> {
    if line.len() > MAX_COMMAND_LEN {
        return Err(KvsError::Protocol(format!(
            "Command too long: {} bytes (max {})",
            line.len(),
            MAX_COMMAND_LEN
        )));
    }

    let mut buf = BytesMut::with_capacity(3 + line.len());
    buf.put_u8(OpCode::Command as u8);
    buf.put_u16(line.len() as u16);
    buf.put_slice(line.as_bytes());
    Ok(buf.freeze())
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read one opcode byte
///
/// `UnexpectedEof` means the peer closed the channel.
pub fn read_opcode<R: Read>(reader: &mut R) -> Result<u8> {
    let mut op = [0u8; 1];
    reader.read_exact(&mut op)?;
    Ok(op[0])
}

/// Read a key field following a SUBSCRIBE/UNSUBSCRIBE opcode
pub fn read_key_field<R: Read>(reader: &mut R) -> Result<String> {
    let mut field = [0u8; KEY_FIELD_WIDTH];
    reader.read_exact(&mut field)?;
    decode_key_field(&field)
}

/// Read the payload following a COMMAND opcode
///
/// Only the framing is checked here. A length above `MAX_COMMAND_LEN` is
/// an error that leaves the stream out of sync; the bytes themselves are
/// decoded by `decode_command_line`.
pub fn read_command_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let mut len = [0u8; 2];
    reader.read_exact(&mut len)?;
    let len = u16::from_be_bytes(len) as usize;

    if len > MAX_COMMAND_LEN {
        return Err(KvsError::Protocol(format!(
            "Command too long: {} bytes (max {})",
            len, MAX_COMMAND_LEN
        )));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

/// Decode a COMMAND payload into its script line
pub fn decode_command_line(payload: Vec<u8>) -> Result<String> {
    String::from_utf8(payload)
        .map_err(|e| KvsError::Protocol(format!("Command is not valid UTF-8: {}", e)))
}

/// Read a connect message from the registration channel
pub fn read_connect<R: Read>(reader: &mut R) -> Result<ConnectRequest> {
    let mut message = [0u8; CONNECT_MESSAGE_LEN];
    reader.read_exact(&mut message)?;
    decode_connect(&message)
}

/// Write a bare two-byte response code
pub fn write_response_code<W: Write>(writer: &mut W, code: ResponseCode) -> Result<()> {
    writer.write_all(&code.as_bytes())?;
    writer.flush()?;
    Ok(())
}

/// Write a command response: code + len (4) + text
pub fn write_command_response<W: Write>(
    writer: &mut W,
    code: ResponseCode,
    text: &[u8],
) -> Result<()> {
    let mut buf = BytesMut::with_capacity(6 + text.len());
    buf.put_slice(&code.as_bytes());
    buf.put_u32(text.len() as u32);
    buf.put_slice(text);

    writer.write_all(&buf)?;
    writer.flush()?;
    Ok(())
}

/// Read a two-byte response code
pub fn read_response_code<R: Read>(reader: &mut R) -> Result<ResponseCode> {
    let mut code = [0u8; 2];
    reader.read_exact(&mut code)?;
    ResponseCode::from_bytes(code).ok_or_else(|| {
        KvsError::Protocol(format!(
            "Unknown response code: {:?}",
            String::from_utf8_lossy(&code)
        ))
    })
}

/// Read a command response (code + len + text)
pub fn read_command_response<R: Read>(reader: &mut R) -> Result<(ResponseCode, String)> {
    let code = read_response_code(reader)?;
    if !code.has_payload() {
        return Err(KvsError::Protocol(format!(
            "Expected a command response, got {:?}",
            code
        )));
    }

    let mut len = [0u8; 4];
    reader.read_exact(&mut len)?;
    let mut text = vec![0u8; u32::from_be_bytes(len) as usize];
    reader.read_exact(&mut text)?;

    let text = String::from_utf8(text)
        .map_err(|e| KvsError::Protocol(format!("Response is not valid UTF-8: {}", e)))?;
    Ok((code, text))
}

/// Read one notification frame
pub fn read_notification<R: Read>(reader: &mut R) -> Result<Notification> {
    let mut frame = [0u8; NOTIFICATION_FRAME_LEN];
    reader.read_exact(&mut frame)?;
    decode_notification(&frame)
}
