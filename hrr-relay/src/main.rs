//! Highrise Radio Relay (hrr-relay) - Main entry point
//!
//! Loads configuration, scans the resident playlist, starts the scheduler and
//! serves listeners until SIGINT/SIGTERM.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use hrr_common::EventBus;
use hrr_relay::acquire::{Acquirer, DisabledAcquirer, YouTubeAcquirer};
use hrr_relay::api::{self, AppContext};
use hrr_relay::catalog::scan_resident_tracks;
use hrr_relay::config::{CliOverrides, Config};
use hrr_relay::playback::{scheduler, Broadcast};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for hrr-relay
#[derive(Parser, Debug)]
#[command(name = "hrr-relay")]
#[command(about = "Synchronized internet-radio relay for Highrise")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "HRR_PORT")]
    port: Option<u16>,

    /// Address to bind
    #[arg(long, env = "HRR_BIND")]
    bind: Option<IpAddr>,

    /// Folder with the resident playlist
    #[arg(short, long, env = "HRR_AUDIO_DIR")]
    audio_dir: Option<PathBuf>,

    /// Folder for downloaded tracks
    #[arg(long, env = "HRR_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, env = "HRR_CONFIG")]
    config: Option<PathBuf>,

    /// Log level or filter directive
    #[arg(long, env = "HRR_LOG_LEVEL")]
    log_level: Option<String>,

    /// Reject every add request
    #[arg(long, env = "HRR_NO_ACQUIRE")]
    no_acquire: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    let config_file = hrr_common::config::locate_config_file(args.config.as_deref())
        .context("Failed to locate configuration file")?;
    let config = Config::resolve(
        CliOverrides {
            port: args.port,
            bind: args.bind,
            audio_dir: args.audio_dir,
            cache_dir: args.cache_dir,
            log_level: args.log_level,
            no_acquire: args.no_acquire,
        },
        config_file.as_deref(),
    )
    .context("Failed to load configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.filter_directive().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Highrise Radio Relay v{}", env!("CARGO_PKG_VERSION"));
    match &config_file {
        Some(path) => info!("Configuration: {}", path.display()),
        None => info!("Configuration: built-in defaults"),
    }
    info!("Audio folder: {}", config.audio_dir.display());
    info!("Cache folder: {}", config.cache_dir.display());

    let shutdown = CancellationToken::new();
    let events = EventBus::default();

    let broadcast = Arc::new(
        Broadcast::new(config.stream.clone(), events, shutdown.clone())
            .with_delete_after_play(config.acquire.delete_after_play),
    );

    let tracks = scan_resident_tracks(&config.audio_dir).await;
    broadcast.load_catalog(tracks).await;

    let acquirer: Arc<dyn Acquirer> = if config.acquire.enabled {
        tokio::fs::create_dir_all(&config.cache_dir)
            .await
            .with_context(|| format!("Failed to create {}", config.cache_dir.display()))?;
        Arc::new(YouTubeAcquirer::new(&config.cache_dir, config.acquire.clone()))
    } else {
        warn!("Track acquisition disabled");
        Arc::new(DisabledAcquirer)
    };

    let scheduler_handle = scheduler::spawn(Arc::clone(&broadcast));

    // Cancel everything on the first signal
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    info!("Listen at http://{}/stream.mp3", config.bind_addr);
    info!("Add tracks with POST http://{}/add", config.bind_addr);

    let ctx = AppContext::new(Arc::clone(&broadcast), acquirer);
    api::run(config.bind_addr, ctx, shutdown.clone())
        .await
        .context("HTTP server failed")?;

    // Stop the scheduler and any remaining pumps
    broadcast.shutdown();
    if let Err(e) = scheduler_handle.await {
        warn!("Scheduler task ended abnormally: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, closing listener streams");
        },
        _ = terminate => {
            info!("Received terminate signal, closing listener streams");
        },
    }
}
