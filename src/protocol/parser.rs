//! Incremental Request Decoder
//!
//! Turns buffered client bytes into [`Frame`]s. Requests are arrays of bulk
//! strings:
//!
//! ```text
//! *<N>\r\n
//! $<len1>\r\n<token1>\r\n
//! ...
//! $<lenN>\r\n<tokenN>\r\n
//! ```
//!
//! ## How the Parser Works
//!
//! The parser reads from a buffer and returns either:
//! - `Ok(Some((frame, consumed)))` - A whole frame was decoded from the first `consumed` bytes
//! - `Ok(None)` - The frame is incomplete, read more data and try again
//! - `Err(ParseError)` - The bytes can never form a valid frame
//!
//! The caller owns the buffer, only appends to it while a frame is incomplete,
//! and advances it by `consumed` after each frame. Once an error is returned
//! the position in the stream is lost, so the connection must be dropped.
//!
//! Decoding happens in two passes. The first walks the headers without
//! copying anything and remembers how far it got, so a frame that arrives in
//! many small reads is scanned once overall. Tokens are copied out only when
//! the whole frame is present.
//!
//! Token payloads are read by length only. They may contain any byte,
//! including `\r` and `\n`.

use crate::protocol::types::{prefix, Frame};
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur while decoding a request.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// A byte other than the expected type prefix
    #[error("unexpected byte {found:#04x}, expected {expected:#04x}")]
    UnexpectedByte { expected: u8, found: u8 },

    /// Array or bulk length that is not a decimal integer
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Negative bulk string length (null bulk strings are not valid in requests)
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Negative array length
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// `*0` or a blank inline line
    #[error("empty command")]
    EmptyFrame,

    /// Protocol violation (missing delimiter, etc.)
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// A length exceeds the allowed maximum
    #[error("message too large: {size} (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum number of tokens in one frame
pub const MAX_FRAME_TOKENS: usize = 1024 * 1024;

/// Decoder options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParserConfig {
    /// Accept a plain text line such as `SET name Ariz\r\n` as a frame,
    /// split on whitespace. When off, any leading byte other than `*` is an error.
    pub allow_inline: bool,
}

/// Longest accepted `*<N>` / `$<L>` header line, terminator excluded
const MAX_LENGTH_LINE: usize = 32;

/// Longest accepted inline request line (same as Redis)
pub const MAX_INLINE_SIZE: usize = 64 * 1024;

/// How far the header scan of an incomplete array got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScanProgress {
    /// Declared token count
    count: usize,
    /// Offset of the first token header
    body_start: usize,
    /// Tokens known to be complete
    scanned: usize,
    /// Offset just past the last complete token
    offset: usize,
}

/// Location of one complete bulk string inside the buffer.
struct BulkSpan {
    data_start: usize,
    data_end: usize,
    next: usize,
}

/// A request decoder.
///
/// Keeps the scan position of the frame currently being received and
/// nothing else; the position is dropped as soon as that frame is decoded
/// or rejected.
///
/// # Example
///
/// ```
/// use flintkv::protocol::RespParser;
///
/// let mut parser = RespParser::new();
/// let (frame, consumed) = parser
///     .parse(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n")
///     .unwrap()
///     .unwrap();
///
/// assert_eq!(frame.len(), 2);
/// assert_eq!(consumed, 23);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RespParser {
    config: ParserConfig,
    progress: Option<ScanProgress>,
}

impl RespParser {
    /// Creates a parser that accepts only arrays of bulk strings.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ParserConfig) -> Self {
        Self {
            config,
            progress: None,
        }
    }

    /// Attempts to decode one frame from the start of `buf`.
    ///
    /// After `Ok(None)` the next call must pass the same bytes, possibly
    /// with more appended.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(Frame, usize)>> {
        let first = match buf.first() {
            Some(&b) => b,
            None => {
                self.progress = None;
                return Ok(None);
            }
        };

        let result = if first == prefix::ARRAY {
            self.parse_array(buf)
        } else if self.config.allow_inline {
            parse_inline(buf)
        } else {
            Err(ParseError::UnexpectedByte {
                expected: prefix::ARRAY,
                found: first,
            })
        };

        if !matches!(result, Ok(None)) {
            self.progress = None;
        }
        result
    }

    /// Parses `*<count>\r\n` followed by `count` bulk strings.
    fn parse_array(&mut self, buf: &[u8]) -> ParseResult<Option<(Frame, usize)>> {
        let mut progress = match self.progress {
            Some(progress) if progress.offset <= buf.len() => progress,
            _ => match scan_array_header(buf)? {
                Some(progress) => progress,
                None => return Ok(None),
            },
        };

        while progress.scanned < progress.count {
            match bulk_span(buf, progress.offset)? {
                Some(span) => {
                    progress.offset = span.next;
                    progress.scanned += 1;
                }
                None => {
                    self.progress = Some(progress);
                    return Ok(None);
                }
            }
        }

        // Every token is present; copy them out in one pass
        let mut tokens = Vec::with_capacity(progress.count);
        let mut offset = progress.body_start;
        while offset < progress.offset {
            match bulk_span(buf, offset)? {
                Some(span) => {
                    tokens.push(Bytes::copy_from_slice(&buf[span.data_start..span.data_end]));
                    offset = span.next;
                }
                None => break,
            }
        }

        match Frame::new(tokens) {
            Some(frame) => Ok(Some((frame, progress.offset))),
            None => Err(ParseError::EmptyFrame),
        }
    }
}

/// Reads and validates the `*<count>` line.
fn scan_array_header(buf: &[u8]) -> ParseResult<Option<ScanProgress>> {
    let (count, body_start) = match read_length(buf, 0)? {
        Some(header) => header,
        None => return Ok(None),
    };

    if count < 0 {
        return Err(ParseError::InvalidArrayLength(count));
    }
    let count = count as usize;
    if count == 0 {
        return Err(ParseError::EmptyFrame);
    }
    if count > MAX_FRAME_TOKENS {
        return Err(ParseError::MessageTooLarge {
            size: count,
            max: MAX_FRAME_TOKENS,
        });
    }

    Ok(Some(ScanProgress {
        count,
        body_start,
        scanned: 0,
        offset: body_start,
    }))
}

/// Locates `$<length>\r\n<data>\r\n` starting at `start` without copying it.
fn bulk_span(buf: &[u8], start: usize) -> ParseResult<Option<BulkSpan>> {
    let found = match buf.get(start) {
        Some(&b) => b,
        None => return Ok(None),
    };
    if found != prefix::BULK_STRING {
        return Err(ParseError::UnexpectedByte {
            expected: prefix::BULK_STRING,
            found,
        });
    }

    let (length, data_start) = match read_length(buf, start)? {
        Some(header) => header,
        None => return Ok(None),
    };

    if length < 0 {
        return Err(ParseError::InvalidBulkLength(length));
    }
    let length = length as usize;
    if length > MAX_BULK_SIZE {
        return Err(ParseError::MessageTooLarge {
            size: length,
            max: MAX_BULK_SIZE,
        });
    }

    let data_end = data_start + length;
    if buf.len() <= data_end {
        return Ok(None);
    }

    // Accept CRLF or a bare LF after the payload
    let next = match buf[data_end] {
        b'\n' => data_end + 1,
        b'\r' => match buf.get(data_end + 1) {
            Some(b'\n') => data_end + 2,
            Some(_) => {
                return Err(ParseError::ProtocolError(
                    "bulk string missing trailing CRLF".to_string(),
                ))
            }
            None => return Ok(None),
        },
        _ => {
            return Err(ParseError::ProtocolError(
                "bulk string missing trailing CRLF".to_string(),
            ))
        }
    };

    Ok(Some(BulkSpan {
        data_start,
        data_end,
        next,
    }))
}

/// Reads a `<prefix><integer>\r\n` header line starting at `start`.
///
/// Returns the integer and the offset of the first byte after the line.
fn read_length(buf: &[u8], start: usize) -> ParseResult<Option<(i64, usize)>> {
    let (line, next) = match read_line(&buf[start + 1..], MAX_LENGTH_LINE)? {
        Some((line, len)) => (line, start + 1 + len),
        None => return Ok(None),
    };

    let text = std::str::from_utf8(line)
        .map_err(|_| ParseError::InvalidInteger(String::from_utf8_lossy(line).into_owned()))?;
    let n = text
        .parse::<i64>()
        .map_err(|_| ParseError::InvalidInteger(text.to_string()))?;

    Ok(Some((n, next)))
}

/// Splits one line of at most `max` bytes off the front of `buf`.
///
/// Returns the line without its terminator and the number of bytes consumed
/// including the terminator. Lines end in `\n`, optionally preceded by `\r`.
/// Only the first `max + 2` bytes are ever searched.
#[inline]
fn read_line(buf: &[u8], max: usize) -> ParseResult<Option<(&[u8], usize)>> {
    let window = &buf[..buf.len().min(max + 2)];
    let lf = match window.iter().position(|&b| b == b'\n') {
        Some(lf) => lf,
        None if window.len() == max + 2 => {
            return Err(ParseError::ProtocolError(format!(
                "line longer than {} bytes",
                max
            )))
        }
        None => return Ok(None),
    };

    let line = match lf.checked_sub(1) {
        Some(cr) if buf[cr] == b'\r' => &buf[..cr],
        _ => &buf[..lf],
    };
    if line.len() > max {
        return Err(ParseError::ProtocolError(format!(
            "line longer than {} bytes",
            max
        )));
    }
    Ok(Some((line, lf + 1)))
}

/// Parses an inline request line such as `ECHO hello\r\n`.
fn parse_inline(buf: &[u8]) -> ParseResult<Option<(Frame, usize)>> {
    let (line, consumed) = match read_line(buf, MAX_INLINE_SIZE)? {
        Some(found) => found,
        None => return Ok(None),
    };

    let tokens: Vec<Bytes> = line
        .split(|b| b.is_ascii_whitespace())
        .filter(|part| !part.is_empty())
        .map(Bytes::copy_from_slice)
        .collect();

    match Frame::new(tokens) {
        Some(frame) => Ok(Some((frame, consumed))),
        None => Err(ParseError::EmptyFrame),
    }
}

/// Helper function to decode a single frame with the default configuration.
pub fn parse_message(buf: &[u8]) -> ParseResult<Option<(Frame, usize)>> {
    RespParser::new().parse(buf)
}
