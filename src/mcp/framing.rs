//! Line framing and decoding of input lines into JSON-RPC messages.
//!
//! The read loop in [`super::server`] decides what to do with a line that is
//! too large or fails to decode.

use crate::errors::{BridgeError, BridgeResult};
use crate::mcp::types::JsonRpcRequest;
use serde_json::Value;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Lines above this size are discarded without being buffered.
pub const MAX_LINE_BYTES: usize = 10 * 1024 * 1024;

/// Outcome of [`read_line_bounded`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineRead {
    /// A line (possibly without trailing newline at EOF) is in the buffer.
    Line,
    /// The line exceeded the limit; it was skipped up to its newline.
    TooLarge,
    Eof,
}

/// Read one newline-terminated line into `buf`, never holding more than
/// `max_bytes` of it in memory.
///
/// An oversized line is consumed through its newline (or EOF) and reported as
/// [`LineRead::TooLarge`], leaving the reader at the start of the next line.
pub async fn read_line_bounded<R>(reader: &mut R, buf: &mut Vec<u8>, max_bytes: usize) -> io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(if buf.is_empty() { LineRead::Eof } else { LineRead::Line });
        }

        match available.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                let consumed = pos + 1;
                if buf.len() + pos > max_bytes {
                    reader.consume(consumed);
                    buf.clear();
                    return Ok(LineRead::TooLarge);
                }
                buf.extend_from_slice(&available[..consumed]);
                reader.consume(consumed);
                return Ok(LineRead::Line);
            }
            None => {
                let len = available.len();
                if buf.len() + len > max_bytes {
                    reader.consume(len);
                    buf.clear();
                    skip_line(reader).await?;
                    return Ok(LineRead::TooLarge);
                }
                buf.extend_from_slice(available);
                reader.consume(len);
            }
        }
    }
}

/// Discard input up to and including the next newline, or to EOF.
async fn skip_line<R>(reader: &mut R) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(());
        }
        match available.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                reader.consume(pos + 1);
                return Ok(());
            }
            None => {
                let len = available.len();
                reader.consume(len);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// A request expecting exactly one response.
    Request(JsonRpcRequest),
    /// A message without `id`; never answered.
    Notification { method: String },
}

/// Decode a single non-empty input line.
///
/// # Errors
///
/// Returns [`BridgeError::Protocol`] for invalid JSON, batches, non-object
/// values, a missing `method`, or an `id` that is not a string or an integer.
pub fn decode_line(line: &str) -> BridgeResult<Incoming> {
    let value: Value = serde_json::from_str(line.trim())
        .map_err(|e| BridgeError::Protocol(format!("invalid JSON: {}", e)))?;

    let object = match &value {
        Value::Object(object) => object,
        Value::Array(_) => {
            return Err(BridgeError::Protocol("batch messages are not supported".into()))
        }
        _ => return Err(BridgeError::Protocol("message is not a JSON object".into())),
    };

    let method = object
        .get("method")
        .and_then(Value::as_str)
        .ok_or_else(|| BridgeError::Protocol("missing method".into()))?;

    if !object.contains_key("id") {
        return Ok(Incoming::Notification {
            method: method.to_string(),
        });
    }

    serde_json::from_value::<JsonRpcRequest>(value)
        .map(Incoming::Request)
        .map_err(|e| BridgeError::Protocol(format!("invalid request: {}", e)))
}
