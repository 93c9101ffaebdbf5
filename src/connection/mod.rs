//! Client Connections
//!
//! One [`ConnectionHandler`] per accepted stream, each on its own Tokio task.
//! The handler owns the stream and its read buffer; the only state shared
//! with other connections is the store behind the [`CommandHandler`](crate::commands::CommandHandler).
//!
//! ## Example
//!
//! ```ignore
//! use flintkv::connection::{handle_connection, ConnectionStats};
//! use flintkv::commands::CommandHandler;
//! use flintkv::protocol::RespParser;
//! use flintkv::storage::Store;
//! use std::sync::Arc;
//!
//! let store = Arc::new(Store::new());
//! let stats = Arc::new(ConnectionStats::new());
//!
//! let (stream, addr) = listener.accept().await?;
//! let handler = CommandHandler::new(Arc::clone(&store));
//! tokio::spawn(handle_connection(stream, addr, handler, RespParser::new(), stats));
//! ```

pub mod handler;

pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};
