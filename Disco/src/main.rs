//! Disco - voice channel music agent, console edition.
//!
//! Loads the configuration, wires the playback engine to a file-backed
//! voice gateway and drives it from a stdin command console.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use discoconfig::Config;
use discoplay::{MusicPlayer, PlayerConfigExt, Registry, UrlResolver};
use tracing::{info, warn};

mod console;
mod file_transport;
mod logs;

use console::Console;
use file_transport::FileGateway;

/// Command-line arguments for disco
#[derive(Parser, Debug)]
#[command(name = "disco")]
#[command(about = "Voice channel music agent driven from the console")]
#[command(version)]
struct Args {
    /// Configuration directory (defaults to $DISCO_CONFIG, ./.disco or ~/.disco)
    #[arg(short, long, default_value = "")]
    config_dir: String,

    /// Directory receiving one `<destination>.frames` file per destination
    #[arg(short, long, default_value = "disco-out", env = "DISCO_OUTPUT")]
    output: PathBuf,

    /// Destination selected at startup
    #[arg(short, long, default_value = "console")]
    destination: String,

    /// Overrides host.logger.min_level
    #[arg(long, env = "DISCO_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load_config(&args.config_dir).context("Failed to load configuration")?;
    let logs = logs::init_logging(&config, args.log_level.as_deref());
    info!(config_dir = %config.dir(), "Configuration loaded");

    let context = config
        .player_context()
        .context("Failed to initialize playback engine")?;
    match context.acquirer().store() {
        Some(store) => info!(store = store.name(), "Cache store enabled"),
        None => info!("Cache store disabled, every track is streamed directly"),
    }
    if let Err(e) = context.acquirer().sweep_temp_dir().await {
        warn!(error = %e, "Failed to sweep the temporary directory");
    }

    let bitrate = context.default_bitrate_kbps();
    let gateway = Arc::new(FileGateway::new(&args.output, bitrate));
    let registry = Registry::new(gateway, Arc::new(context)).with_leave_grace(config.leave_grace()?);
    let player = Arc::new(MusicPlayer::new(registry, Arc::new(UrlResolver::new())));
    info!(output = %args.output.display(), "Disco is ready");

    let console = Console::new(player.clone(), logs, args.destination);
    tokio::select! {
        result = console.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    info!("Shutting down");
    player.shutdown().await;
    Ok(())
}
