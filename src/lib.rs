//! # FlintKV - A Small In-Memory Key-Value Server
//!
//! FlintKV keeps string values in memory and serves them over the Redis wire
//! protocol (RESP). Keys may carry a millisecond TTL.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            FlintKV                               │
//! │                                                                  │
//! │  ┌────────────┐   ┌──────────────┐   ┌────────────┐              │
//! │  │ TCP accept │──>│  Connection  │──>│  dispatch  │              │
//! │  │    loop    │   │ (per client) │   │            │              │
//! │  └────────────┘   │ RespParser   │   └─────┬──────┘              │
//! │                   │ Reply encode │         │                     │
//! │                   └──────────────┘         ▼                     │
//! │                              ┌──────────────────────────────┐    │
//! │                              │ Store                        │    │
//! │                              │ Mutex<HashMap<Bytes, Entry>> │    │
//! │                              └──────────────────────────────┘    │
//! │                                            ▲                     │
//! │                              ┌─────────────┴────────────────┐    │
//! │                              │ ExpirySweeper (Tokio task)   │    │
//! │                              └──────────────────────────────┘    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use flintkv::protocol::RespParser;
//! use flintkv::server::accept_loop;
//! use flintkv::storage::{start_expiry_sweeper, Store};
//! use flintkv::connection::ConnectionStats;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(Store::new());
//!     let _sweeper = start_expiry_sweeper(Arc::clone(&store));
//!     let stats = Arc::new(ConnectionStats::new());
//!
//!     let listener = TcpListener::bind("127.0.0.1:6379").await?;
//!     accept_loop(listener, store, RespParser::new(), stats).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `PING [message]`
//! - `ECHO message`
//! - `SET key value [PX milliseconds]`
//! - `GET key`
//!
//! ## Expiry
//!
//! Keys with a TTL are expired in two ways:
//! 1. **Lazy**: `GET` checks the deadline and deletes the key if it has passed
//! 2. **Active**: a background task purges expired keys every 100ms
//!
//! Lazy expiry alone decides what `GET` returns; the sweeper only reclaims memory.

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

pub use commands::{dispatch, CommandHandler};
pub use config::{CliAction, Config, ConfigError};
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{Frame, ParseError, RespParser, Reply};
pub use storage::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper, Store};

/// The default port FlintKV listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host FlintKV binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of FlintKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
