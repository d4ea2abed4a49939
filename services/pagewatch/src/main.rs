//! pagewatch CLI
//!
//! Runs one full change-detection cycle over the configured resources and
//! exits; recurring execution is driven externally (cron, systemd timers).

use std::path::PathBuf;

use clap::Parser;
use pagewatch::load_config;
use tracing::Level;

#[derive(Parser)]
#[command(name = "pagewatch")]
#[command(about = "Website change monitoring and notification service")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Snapshot directory (overrides config file)
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    tracing::debug!("Loading configuration from {:?}", args.config);
    let mut config = load_config(&args.config)?;

    if let Some(snapshot_dir) = args.snapshot_dir {
        config.snapshot_dir = snapshot_dir;
    }

    tracing::debug!(
        "Resources: {}, channels: {}, default channel: {}",
        config.resources.len(),
        config.channels.len(),
        config.default_channel.is_some()
    );

    let summary = pagewatch::run(&config).await?;
    println!("{}", summary);

    Ok(())
}
