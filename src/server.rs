//! TCP Accept Loop
//!
//! Accepts connections forever and spawns one task per client. Every task
//! shares the same [`Store`]; nothing else crosses connections.

use crate::commands::CommandHandler;
use crate::connection::{handle_connection, ConnectionStats};
use crate::protocol::RespParser;
use crate::storage::Store;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, trace};

/// Serves clients accepted from `listener` until the task is dropped.
pub async fn accept_loop(
    listener: TcpListener,
    store: Arc<Store>,
    parser: RespParser,
    stats: Arc<ConnectionStats>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                trace!(client = %addr, "Accepted connection");

                if let Err(e) = stream.set_nodelay(true) {
                    trace!(client = %addr, error = %e, "Could not set TCP_NODELAY");
                }

                let handler = CommandHandler::new(Arc::clone(&store));
                let parser = parser.clone();
                let stats = Arc::clone(&stats);

                tokio::spawn(async move {
                    handle_connection(stream, addr, handler, parser, stats).await;
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
