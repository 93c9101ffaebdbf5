//! Connection Session
//!
//! Each client gets its own task that loops over:
//!
//! ```text
//! read bytes ──> decode frame ──> dispatch ──> write reply ──┐
//!      ▲                                                      │
//!      └──────────────────────────────────────────────────────┘
//! ```
//!
//! until the stream ends or fails. Several frames arriving in one read are
//! answered in order.
//!
//! ## Termination
//!
//! - Clean EOF between frames ends the session quietly.
//! - EOF in the middle of a frame, an I/O error or an oversized buffer ends it
//!   without a reply.
//! - A decode error gets a best-effort `-ERR Protocol error: ...` reply and then
//!   ends it; the stream position is lost so there is no resynchronization.
//!
//! Command errors are ordinary replies and never end the session.

use crate::commands::CommandHandler;
use crate::protocol::{Frame, ParseError, Reply, RespParser};
use bytes::{Buf, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, info, trace, warn};

/// Upper bound on buffered, not yet decoded bytes (one maximal bulk string plus headers).
const MAX_BUFFER_SIZE: usize = crate::protocol::parser::MAX_BULK_SIZE + 64 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Sessions ended by a decode error
    pub protocol_errors: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Errors that end a session.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Malformed request
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    /// Client disconnected between frames
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Stream ended part way through a frame
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// Buffer size limit exceeded
    #[error("Buffer size limit exceeded")]
    BufferFull,
}

/// Owns one client's byte stream for the life of the connection.
///
/// Generic over the stream so it can serve a `TcpStream` or any other
/// bidirectional byte stream.
pub struct ConnectionHandler<S> {
    stream: BufWriter<S>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Bytes read but not yet decoded
    buffer: BytesMut,

    command_handler: CommandHandler,

    parser: RespParser,

    stats: Arc<ConnectionStats>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        stream: S,
        addr: SocketAddr,
        command_handler: CommandHandler,
        parser: RespParser,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            command_handler,
            parser,
            stats,
        }
    }

    /// Serves the connection until it ends.
    ///
    /// A client hanging up between frames is reported as `Ok(())`.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        debug!(client = %self.addr, "Client connected");

        let result = match self.main_loop().await {
            Err(ConnectionError::ClientDisconnected) => Ok(()),
            other => other,
        };

        match &result {
            Ok(()) => debug!(client = %self.addr, "Client disconnected"),
            Err(ConnectionError::IoError(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => info!(client = %self.addr, error = %e, "Connection closed"),
        }

        self.stats.connection_closed();
        result
    }

    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            while let Some(frame) = self.try_parse_frame().await? {
                let reply = self.command_handler.execute(&frame);
                self.stats.command_processed();
                trace!(client = %self.addr, reply = %reply, "Executed command");

                self.send_reply(&reply).await?;
            }

            self.read_more_data().await?;
        }
    }

    /// Decodes the next frame from the buffer, if one is complete.
    async fn try_parse_frame(&mut self) -> Result<Option<Frame>, ConnectionError> {
        match self.parser.parse(&self.buffer) {
            Ok(Some((frame, consumed))) => {
                self.buffer.advance(consumed);
                trace!(
                    client = %self.addr,
                    consumed = consumed,
                    remaining = self.buffer.len(),
                    "Parsed frame"
                );
                Ok(Some(frame))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                warn!(client = %self.addr, error = %e, "Protocol error");
                self.stats.protocol_error();

                let reply = Reply::error(format!("ERR Protocol error: {}", e));
                if let Err(write_err) = self.send_reply(&reply).await {
                    debug!(client = %self.addr, error = %write_err, "Could not report protocol error");
                }
                Err(ConnectionError::ParseError(e))
            }
        }
    }

    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            warn!(
                client = %self.addr,
                size = self.buffer.len(),
                "Buffer size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(4096);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            return if self.buffer.is_empty() {
                Err(ConnectionError::ClientDisconnected)
            } else {
                Err(ConnectionError::UnexpectedEof)
            };
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(())
    }

    async fn send_reply(&mut self, reply: &Reply) -> Result<(), ConnectionError> {
        let bytes = reply.serialize();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(bytes.len());
        Ok(())
    }
}

/// Serves a client connection to completion.
///
/// Errors are logged inside the handler; nothing propagates to the caller.
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    command_handler: CommandHandler,
    parser: RespParser,
    stats: Arc<ConnectionStats>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handler = ConnectionHandler::new(stream, addr, command_handler, parser, stats);
    let _ = handler.run().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ParserConfig;
    use crate::storage::Store;
    use std::time::Duration;
    use tokio_test::io::Builder;

    fn peer() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    fn session<S>(stream: S, parser: RespParser) -> (ConnectionHandler<S>, Arc<ConnectionStats>)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let handler = CommandHandler::new(Arc::new(Store::new()));
        let stats = Arc::new(ConnectionStats::new());
        let conn = ConnectionHandler::new(stream, peer(), handler, parser, Arc::clone(&stats));
        (conn, stats)
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let mock = Builder::new()
            .read(b"*1\r\n$4\r\nPING\r\n")
            .write(b"+PONG\r\n")
            .build();

        let (conn, stats) = session(mock, RespParser::new());
        assert!(conn.run().await.is_ok());
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_set_get_echo() {
        let mock = Builder::new()
            .read(b"*3\r\n$3\r\nSET\r\n$4\r\nname\r\n$4\r\nAriz\r\n")
            .write(b"+OK\r\n")
            .read(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n")
            .write(b"$4\r\nAriz\r\n")
            .read(b"*2\r\n$4\r\nECHO\r\n$5\r\nhello\r\n")
            .write(b"$5\r\nhello\r\n")
            .read(b"*2\r\n$3\r\nGET\r\n$7\r\nmissing\r\n")
            .write(b"$-1\r\n")
            .build();

        let (conn, _) = session(mock, RespParser::new());
        assert!(conn.run().await.is_ok());
    }

    #[tokio::test]
    async fn test_frame_split_across_reads() {
        let mock = Builder::new()
            .read(b"*2\r\n$4\r\nEC")
            .read(b"HO\r\n$5\r\nhel")
            .read(b"lo\r\n")
            .write(b"$5\r\nhello\r\n")
            .build();

        let (conn, _) = session(mock, RespParser::new());
        assert!(conn.run().await.is_ok());
    }

    #[tokio::test]
    async fn test_wide_frame_trickled_in() {
        // 1001 tokens arriving a few bytes at a time
        let mut wire = b"*1001\r\n$4\r\nPING\r\n".to_vec();
        for _ in 0..1000 {
            wire.extend_from_slice(b"$1\r\nx\r\n");
        }

        let mut builder = Builder::new();
        for chunk in wire.chunks(5) {
            builder.read(chunk);
        }
        let mock = builder
            .write(b"-ERR wrong number of arguments for 'ping' command\r\n")
            .build();

        let (conn, stats) = session(mock, RespParser::new());
        assert!(conn.run().await.is_ok());
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_pipelined_frames() {
        let mock = Builder::new()
            .read(b"*3\r\n$3\r\nSET\r\n$2\r\nk1\r\n$2\r\nv1\r\n*2\r\n$3\r\nGET\r\n$2\r\nk1\r\n*1\r\n$4\r\nPING\r\n")
            .write(b"+OK\r\n")
            .write(b"$2\r\nv1\r\n")
            .write(b"+PONG\r\n")
            .build();

        let (conn, stats) = session(mock, RespParser::new());
        assert!(conn.run().await.is_ok());
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_command_error_keeps_connection_open() {
        let mock = Builder::new()
            .read(b"*1\r\n$7\r\nFOOBARZ\r\n")
            .write(b"-ERR unknown command\r\n")
            .read(b"*1\r\n$4\r\nECHO\r\n")
            .write(b"-ERR wrong number of arguments for 'echo' command\r\n")
            .read(b"*1\r\n$4\r\nPING\r\n")
            .write(b"+PONG\r\n")
            .build();

        let (conn, _) = session(mock, RespParser::new());
        assert!(conn.run().await.is_ok());
    }

    #[tokio::test]
    async fn test_malformed_frame_terminates() {
        // The PING after the bad frame is never answered
        let mock = Builder::new()
            .read(b"*1\r\n$4\r\nPING\r\n")
            .write(b"+PONG\r\n")
            .read(b"*x\r\n*1\r\n$4\r\nPING\r\n")
            .write(b"-ERR Protocol error: invalid integer: x\r\n")
            .build();

        let (conn, stats) = session(mock, RespParser::new());
        let result = conn.run().await;
        assert!(matches!(
            result,
            Err(ConnectionError::ParseError(ParseError::InvalidInteger(_)))
        ));
        assert_eq!(stats.protocol_errors.load(Ordering::Relaxed), 1);
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_inline_rejected_by_default() {
        let mock = Builder::new()
            .read(b"PING\r\n")
            .write(b"-ERR Protocol error: unexpected byte 0x50, expected 0x2a\r\n")
            .build();

        let (conn, _) = session(mock, RespParser::new());
        assert!(matches!(conn.run().await, Err(ConnectionError::ParseError(_))));
    }

    #[tokio::test]
    async fn test_inline_when_enabled() {
        let mock = Builder::new()
            .read(b"PING\r\nECHO hey\r\n")
            .write(b"+PONG\r\n")
            .write(b"$3\r\nhey\r\n")
            .build();

        let parser = RespParser::with_config(ParserConfig { allow_inline: true });
        let (conn, _) = session(mock, parser);
        assert!(conn.run().await.is_ok());
    }

    #[tokio::test]
    async fn test_eof_mid_frame() {
        let mock = Builder::new().read(b"*2\r\n$3\r\nabc\r\n").build();

        let (conn, stats) = session(mock, RespParser::new());
        assert!(matches!(conn.run().await, Err(ConnectionError::UnexpectedEof)));
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_read_error_terminates() {
        let mock = Builder::new()
            .read_error(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            ))
            .build();

        let (conn, _) = session(mock, RespParser::new());
        assert!(matches!(conn.run().await, Err(ConnectionError::IoError(_))));
    }

    #[tokio::test]
    async fn test_duplex_stream_with_expiry() {
        let (mut client, server) = tokio::io::duplex(1024);
        let (conn, _) = session(server, RespParser::new());
        let task = tokio::spawn(conn.run());

        let mut buf = [0u8; 64];

        client
            .write_all(b"*5\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n$2\r\nPX\r\n$2\r\n50\r\n")
            .await
            .unwrap();
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"+OK\r\n");

        client.write_all(b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n").await.unwrap();
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"$1\r\nv\r\n");

        tokio::time::sleep(Duration::from_millis(80)).await;

        client.write_all(b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n").await.unwrap();
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"$-1\r\n");

        drop(client);
        assert!(task.await.unwrap().is_ok());
    }
}
