//! FlintKV server binary.
//!
//! Sets up logging, the shared store, the expiry sweeper and the TCP listener,
//! then serves until Ctrl+C.

use flintkv::config::{CliAction, Config, HELP};
use flintkv::connection::ConnectionStats;
use flintkv::protocol::RespParser;
use flintkv::server::accept_loop;
use flintkv::storage::{ExpirySweeper, Store};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match Config::from_env() {
        Ok(CliAction::Run(config)) => config,
        Ok(CliAction::Help) => {
            println!("{}", HELP);
            return Ok(());
        }
        Ok(CliAction::Version) => {
            println!("FlintKV version {}", flintkv::VERSION);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("{}", HELP);
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(version = flintkv::VERSION, "Starting FlintKV");

    let store = Arc::new(Store::new());

    let _sweeper = ExpirySweeper::start(Arc::clone(&store), config.expiry_config());

    let stats = Arc::new(ConnectionStats::new());
    let parser = RespParser::with_config(config.parser_config());
    if config.inline_commands {
        info!("Inline commands enabled");
    }

    let listener = TcpListener::bind(config.bind_address()).await?;
    info!("Listening on {}", config.bind_address());

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping server...");
    };

    tokio::select! {
        _ = accept_loop(listener, Arc::clone(&store), parser, Arc::clone(&stats)) => {}
        _ = shutdown => {}
    }

    let store_stats = store.stats();
    info!(
        connections = stats.connections_accepted.load(Ordering::Relaxed),
        commands = stats.commands_processed.load(Ordering::Relaxed),
        keys = store_stats.keys,
        expired_lazily = store_stats.expired_lazily,
        expired_actively = store_stats.expired_actively,
        "Server shutdown complete"
    );
    Ok(())
}
