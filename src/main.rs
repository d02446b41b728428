//! PiKV Server Binary
//!
//! Loads the snapshot, serves until Ctrl+C, then saves the snapshot.

use clap::Parser;
use pikv::{AcceptMode, Engine, Result, Server, ServerConfig, DEFAULT_PORT};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

/// PiKV Server
#[derive(Parser, Debug)]
#[command(name = "pikv-server")]
#[command(about = "Key-value store served over fixed-size TCP frames")]
#[command(version)]
struct Args {
    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Snapshot file loaded at startup and written at shutdown
    #[arg(short, long, default_value = pikv::config::DEFAULT_STORAGE_PATH)]
    storage: String,

    /// Seconds between statistics reports
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
    stats_interval: u64,

    /// Serve several connections at once instead of one at a time
    #[arg(long)]
    concurrent: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(false).init();

    let args = Args::parse();

    let config = ServerConfig::builder()
        .bind_addr(format!("{}:{}", args.host, args.port))
        .storage_path(&args.storage)
        .stats_interval(Duration::from_secs(args.stats_interval))
        .accept_mode(if args.concurrent {
            AcceptMode::Concurrent
        } else {
            AcceptMode::Serial
        })
        .build();

    info!("PiKV server v{}", pikv::VERSION);

    let engine = Arc::new(Engine::new());
    engine.load(&config.storage_path).inspect_err(|e| {
        error!(error = %e, "Error opening storage file, server closing");
    })?;

    let server = Arc::new(Server::new(config.clone(), Arc::clone(&engine)));

    // Setup graceful shutdown on SIGINT (Ctrl+C)
    let server_clone = Arc::clone(&server);
    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            return;
        }

        info!("Received Ctrl+C, initiating graceful shutdown...");
        if let Err(e) = server_clone.shutdown() {
            error!(error = %e, "Failed to initiate shutdown");
        }
    });

    server.run().await.inspect_err(|e| {
        error!(error = %e, "Server error");
    })?;

    info!("Server closing...");
    engine.save(&config.storage_path).inspect_err(|e| {
        error!(error = %e, "Error saving storage file");
    })?;

    Ok(())
}
