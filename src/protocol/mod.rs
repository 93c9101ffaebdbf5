//! Wire Protocol
//!
//! Requests are RESP arrays of bulk strings; responses are simple strings,
//! bulk strings, null bulk strings or errors.
//!
//! ## Modules
//!
//! - `types`: `Frame` (a decoded request) and `Reply` (a response) with its encoder
//! - `parser`: Incremental decoder for incoming requests
//!
//! ## Example
//!
//! ```
//! use flintkv::protocol::{parse_message, Reply};
//!
//! let data = b"*2\r\n$4\r\nECHO\r\n$5\r\nhello\r\n";
//! let (frame, consumed) = parse_message(data).unwrap().unwrap();
//! assert_eq!(consumed, data.len());
//! assert_eq!(frame.args()[0], "hello");
//!
//! let reply = Reply::bulk_string("hello");
//! assert_eq!(reply.serialize(), b"$5\r\nhello\r\n");
//! ```

pub mod parser;
pub mod types;

pub use parser::{parse_message, ParseError, ParseResult, ParserConfig, RespParser};
pub use types::{Frame, Reply};
