//! Command Processing
//!
//! ```text
//! Frame ──> dispatch() ──> Store ──> Reply
//! ```
//!
//! Supported: `PING`, `ECHO`, `SET` (with optional `PX`), `GET`.

pub mod handler;

pub use handler::{dispatch, CommandHandler};
