//! Command Dispatch
//!
//! Maps a decoded [`Frame`] to a store operation or a stateless reply.
//! Command names are matched case-insensitively.
//!
//! | Command | Form                       | Reply                           |
//! |---------|----------------------------|---------------------------------|
//! | `PING`  | `PING [message]`           | `+PONG`, or the message as bulk |
//! | `ECHO`  | `ECHO message`             | the message as bulk             |
//! | `SET`   | `SET key value [PX ms]`    | `+OK`                           |
//! | `GET`   | `GET key`                  | the value as bulk, or null      |
//!
//! Bad arity, bad options and unknown commands produce an error reply. They
//! never close the connection.

use crate::protocol::{Frame, Reply};
use crate::storage::Store;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

/// Executes one frame against the store and returns the reply.
pub fn dispatch(frame: &Frame, store: &Store) -> Reply {
    let name = frame.name().to_ascii_uppercase();
    let args = frame.args();

    match name.as_slice() {
        b"PING" => cmd_ping(args),
        b"ECHO" => cmd_echo(args),
        b"SET" => cmd_set(args, store),
        b"GET" => cmd_get(args, store),
        _ => Reply::error("ERR unknown command"),
    }
}

fn wrong_arity(cmd: &str) -> Reply {
    Reply::error(format!("ERR wrong number of arguments for '{}' command", cmd))
}

/// PING [message]
fn cmd_ping(args: &[Bytes]) -> Reply {
    match args {
        [] => Reply::pong(),
        [msg] => Reply::bulk_string(msg.clone()),
        _ => wrong_arity("ping"),
    }
}

/// ECHO message
fn cmd_echo(args: &[Bytes]) -> Reply {
    match args {
        [msg] => Reply::bulk_string(msg.clone()),
        _ => wrong_arity("echo"),
    }
}

/// SET key value [PX milliseconds]
fn cmd_set(args: &[Bytes], store: &Store) -> Reply {
    let (key, value, ttl) = match args {
        [key, value] => (key, value, None),
        [key, value, opt, ms] => {
            if !opt.eq_ignore_ascii_case(b"PX") {
                return Reply::error("ERR syntax error");
            }
            match parse_millis(ms) {
                Some(ms) => (key, value, Some(Duration::from_millis(ms))),
                None => return Reply::error("ERR invalid PX value"),
            }
        }
        _ => return wrong_arity("set"),
    };

    store.set(key.clone(), value.clone(), ttl);
    Reply::ok()
}

/// GET key
fn cmd_get(args: &[Bytes], store: &Store) -> Reply {
    match args {
        [key] => match store.get(key) {
            Some(value) => Reply::bulk_string(value),
            None => Reply::null(),
        },
        _ => wrong_arity("get"),
    }
}

/// Parses a non-negative decimal millisecond count.
fn parse_millis(raw: &[u8]) -> Option<u64> {
    std::str::from_utf8(raw).ok()?.parse::<u64>().ok()
}

/// Per-connection entry point to [`dispatch`], holding the shared store.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    store: Arc<Store>,
}

impl CommandHandler {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn execute(&self, frame: &Frame) -> Reply {
        dispatch(frame, &self.store)
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }
}
