//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! ## Wire Format
//!
//! ### Transport Frame
//! Every message on a connection is length-prefixed:
//! ```text
//! ┌──────────┬─────────────────────────────┐
//! │ Len (4)  │  Body (request or response) │
//! └──────────┴─────────────────────────────┘
//! ```
//!
//! ### Request Body
//! ```text
//! ┌──────────┬────────┬─────────┬────────┬──────────┬───────────────────────┐
//! │DbLen (2) │   Db   │CmdLen(1)│  Cmd   │ Argc (2) │ Argc × [Len (4) │ Arg] │
//! └──────────┴────────┴─────────┴────────┴──────────┴───────────────────────┘
//! ```
//!
//! ### Response Body
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │Status(1) │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Value Lists (MGET, RANGE, DBLIST payloads)
//! ```text
//! ┌──────────┬─────────────────────────┐
//! │Count (4) │ Count × [Len (4) │ Item]│
//! └──────────┴─────────────────────────┘
//! ```
//!
//! All integers are big-endian.

use std::io::{Read, Write};

use crate::error::{ElevatorError, Result};
use super::{Request, Response, Status};

/// Response header size: 1 byte status + 4 bytes length
pub const RESPONSE_HEADER_SIZE: usize = 5;

/// Maximum frame size (16 MB)
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

// =============================================================================
// Byte cursor
// =============================================================================

/// Bounds-checked reader over a frame body
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        let remaining = self.bytes.len() - self.pos;
        if remaining < len {
            return Err(ElevatorError::Protocol(format!(
                "Incomplete {}: expected {} bytes, got {}",
                what, len, remaining
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    fn u16(&mut self, what: &str) -> Result<u16> {
        let b = self.take(2, what)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self, what: &str) -> Result<u32> {
        let b = self.take(4, what)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn finish(&self, what: &str) -> Result<()> {
        let trailing = self.bytes.len() - self.pos;
        if trailing != 0 {
            return Err(ElevatorError::Protocol(format!(
                "{}: {} trailing bytes",
                what, trailing
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Request Encoding/Decoding
// =============================================================================

/// Encode a request body
///
/// Database names must fit in a u16 length and command ids in a u8 length;
/// `Client::request` checks both before calling this.
pub fn encode_request(request: &Request) -> Vec<u8> {
    let args_len: usize = request.args.iter().map(|a| 4 + a.len()).sum();
    let mut body =
        Vec::with_capacity(2 + request.db.len() + 1 + request.command.len() + 2 + args_len);

    body.extend_from_slice(&(request.db.len() as u16).to_be_bytes());
    body.extend_from_slice(request.db.as_bytes());
    body.push(request.command.len() as u8);
    body.extend_from_slice(request.command.as_bytes());
    body.extend_from_slice(&(request.args.len() as u16).to_be_bytes());
    for arg in &request.args {
        body.extend_from_slice(&(arg.len() as u32).to_be_bytes());
        body.extend_from_slice(arg);
    }

    body
}

/// Decode a request body
pub fn decode_request(bytes: &[u8]) -> Result<Request> {
    if bytes.len() > MAX_FRAME_SIZE as usize {
        return Err(ElevatorError::Protocol(format!(
            "Request too large: {} bytes (max {})",
            bytes.len(),
            MAX_FRAME_SIZE
        )));
    }

    let mut cursor = Cursor::new(bytes);

    let db_len = cursor.u16("database name length")? as usize;
    let db = std::str::from_utf8(cursor.take(db_len, "database name")?)
        .map_err(|_| ElevatorError::Protocol("Database name is not valid UTF-8".to_string()))?
        .to_string();

    let cmd_len = cursor.u8("command length")? as usize;
    if cmd_len == 0 {
        return Err(ElevatorError::Protocol("Empty command identifier".to_string()));
    }
    let command = cursor.take(cmd_len, "command")?;
    if !command.iter().all(|b| b.is_ascii_graphic()) {
        return Err(ElevatorError::Protocol(
            "Command identifier must be printable ASCII".to_string(),
        ));
    }
    let command = String::from_utf8_lossy(command).to_ascii_uppercase();

    let argc = cursor.u16("argument count")? as usize;
    let mut args = Vec::with_capacity(argc.min(64));
    for i in 0..argc {
        let len = cursor.u32("argument length")? as usize;
        let arg = cursor.take(len, &format!("argument {}", i))?;
        args.push(arg.to_vec());
    }

    cursor.finish("Request")?;

    Ok(Request { db, command, args })
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Encode a response body
///
/// Format: status (1) + payload_len (4) + payload
pub fn encode_response(response: &Response) -> Vec<u8> {
    let payload = response.payload.as_deref().unwrap_or(&[]);
    let payload_len = payload.len() as u32;

    let mut message = Vec::with_capacity(RESPONSE_HEADER_SIZE + payload.len());
    message.push(response.status as u8);
    message.extend_from_slice(&payload_len.to_be_bytes());
    message.extend_from_slice(payload);

    message
}

/// Decode a response body
pub fn decode_response(bytes: &[u8]) -> Result<Response> {
    let mut cursor = Cursor::new(bytes);

    let status_byte = cursor.u8("response status")?;
    let status = Status::from_u8(status_byte).ok_or_else(|| {
        ElevatorError::Protocol(format!("Unknown response status: 0x{:02x}", status_byte))
    })?;

    let payload_len = cursor.u32("response length")?;
    if payload_len > MAX_FRAME_SIZE {
        return Err(ElevatorError::Protocol(format!(
            "Response payload too large: {} bytes (max {})",
            payload_len, MAX_FRAME_SIZE
        )));
    }

    let payload = cursor.take(payload_len as usize, "response payload")?;
    cursor.finish("Response")?;

    let payload = if payload.is_empty() {
        None
    } else {
        Some(payload.to_vec())
    };

    Ok(Response { status, payload })
}

// =============================================================================
// Value lists
// =============================================================================

/// Encode a list of values into a single payload
pub fn encode_values(items: &[Vec<u8>]) -> Vec<u8> {
    let total: usize = items.iter().map(|i| 4 + i.len()).sum();
    let mut payload = Vec::with_capacity(4 + total);
    payload.extend_from_slice(&(items.len() as u32).to_be_bytes());
    for item in items {
        payload.extend_from_slice(&(item.len() as u32).to_be_bytes());
        payload.extend_from_slice(item);
    }
    payload
}

/// Decode a payload produced by `encode_values`
pub fn decode_values(payload: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut cursor = Cursor::new(payload);
    let count = cursor.u32("value count")? as usize;
    let mut items = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let len = cursor.u32("value length")? as usize;
        items.push(cursor.take(len, "value")?.to_vec());
    }
    cursor.finish("Value list")?;
    Ok(items)
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read one length-prefixed frame from a stream
///
/// Blocks until a complete frame is received or an error occurs
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let mut header = [0u8; 4];
    reader.read_exact(&mut header)?;

    let len = u32::from_be_bytes(header);
    if len > MAX_FRAME_SIZE {
        return Err(ElevatorError::Protocol(format!(
            "Frame too large: {} bytes (max {})",
            len, MAX_FRAME_SIZE
        )));
    }

    let mut body = vec![0u8; len as usize];
    if len > 0 {
        reader.read_exact(&mut body)?;
    }
    Ok(body)
}

/// Write one length-prefixed frame to a stream
pub fn write_frame<W: Write>(writer: &mut W, body: &[u8]) -> Result<()> {
    writer.write_all(&(body.len() as u32).to_be_bytes())?;
    writer.write_all(body)?;
    writer.flush()?;
    Ok(())
}
