//! Request and Response Types
//!
//! Requests arrive as arrays of bulk strings and are decoded into a [`Frame`].
//! Responses are one of four [`Reply`] shapes, each with a fixed wire form:
//!
//! - Simple string: `+OK\r\n`
//! - Bulk string: `$5\r\nhello\r\n`
//! - Null bulk string: `$-1\r\n`
//! - Error: `-ERR unknown command\r\n`

use bytes::Bytes;
use std::fmt;

/// The CRLF terminator used in RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// One decoded client request.
///
/// The first token is the command name, the rest are its arguments.
/// A frame always holds at least one token; the decoder rejects empty arrays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    tokens: Vec<Bytes>,
}

impl Frame {
    /// Builds a frame from decoded tokens, or `None` if there are none.
    pub fn new(tokens: Vec<Bytes>) -> Option<Self> {
        if tokens.is_empty() {
            None
        } else {
            Some(Self { tokens })
        }
    }

    /// The command name token, exactly as sent.
    pub fn name(&self) -> &Bytes {
        &self.tokens[0]
    }

    /// Arguments following the command name.
    pub fn args(&self) -> &[Bytes] {
        &self.tokens[1..]
    }

    /// Number of tokens including the command name.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Encodes the frame as an array of bulk strings, the form clients send.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(prefix::ARRAY);
        buf.extend_from_slice(self.tokens.len().to_string().as_bytes());
        buf.extend_from_slice(CRLF);
        for token in &self.tokens {
            write_bulk(&mut buf, token);
        }
        buf
    }
}

#[cfg(test)]
impl<T: Into<Bytes>> FromIterator<T> for Frame {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Frame::new(iter.into_iter().map(Into::into).collect())
            .expect("a frame needs at least one token")
    }
}

/// A typed response produced by the command dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Short status text that never contains CRLF.
    /// Format: `+<string>\r\n`
    SimpleString(String),

    /// Binary-safe, length-prefixed payload.
    /// Format: `$<length>\r\n<data>\r\n`
    BulkString(Bytes),

    /// Missing value.
    /// Format: `$-1\r\n`
    NullBulk,

    /// Command-level failure. The connection stays open.
    /// Format: `-<error message>\r\n`
    Error(String),
}

impl Reply {
    pub fn simple_string(s: impl Into<String>) -> Self {
        Reply::SimpleString(s.into())
    }

    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        Reply::BulkString(data.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        Reply::Error(s.into())
    }

    pub fn null() -> Self {
        Reply::NullBulk
    }

    /// Common response for successful operations
    pub fn ok() -> Self {
        Reply::SimpleString("OK".to_string())
    }

    /// Common response for PING
    pub fn pong() -> Self {
        Reply::SimpleString("PONG".to_string())
    }

    /// Serializes the reply to bytes for sending over the wire.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the reply into an existing buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            Reply::SimpleString(s) => {
                buf.push(prefix::SIMPLE_STRING);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Reply::BulkString(data) => write_bulk(buf, data),
            Reply::NullBulk => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(b"-1");
                buf.extend_from_slice(CRLF);
            }
            Reply::Error(s) => {
                buf.push(prefix::ERROR);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }
}

fn write_bulk(buf: &mut Vec<u8>, data: &[u8]) {
    buf.push(prefix::BULK_STRING);
    buf.extend_from_slice(data.len().to_string().as_bytes());
    buf.extend_from_slice(CRLF);
    buf.extend_from_slice(data);
    buf.extend_from_slice(CRLF);
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::SimpleString(s) => write!(f, "{}", s),
            Reply::BulkString(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
            },
            Reply::NullBulk => write!(f, "(nil)"),
            Reply::Error(s) => write!(f, "(error) {}", s),
        }
    }
}
