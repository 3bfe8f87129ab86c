//! millrace: a standalone tool for forwarding MongoDB change streams to
//! object storage.
//!
//! Watches every non-denylisted collection in a database, checkpoints
//! resume tokens after each event, and exports time-windowed CSV batches
//! to a blob sink.

use clap::Parser;
use snafu::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use millrace::error::{AddressParseSnafu, ConfigSnafu, ForwarderError, MetricsSnafu};
use millrace::{metrics, run_forwarder, Config};

/// MongoDB change-stream to object-storage forwarder.
#[derive(Parser, Debug)]
#[command(name = "millrace")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Dry run - validate configuration without watching anything.
    #[arg(long)]
    dry_run: bool,
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), ForwarderError> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("millrace starting");

    let config = Config::from_file(&args.config).context(ConfigSnafu)?;

    if config.metrics.enabled {
        let addr = config.metrics.address.parse().context(AddressParseSnafu)?;
        metrics::init(addr).context(MetricsSnafu)?;
        debug!(
            "Metrics endpoint listening on http://{}/metrics",
            config.metrics.address
        );
    }

    if args.dry_run {
        info!("Dry run mode - validating configuration");
        info!("Database: {}", config.mongo.database);
        info!("Checkpoint collection: {}", config.mongo.checkpoint_collection);
        info!("Sink: {}", config.sink.path);
        info!("Flush interval: {}s", config.forwarder.flush_interval_secs);
        for name in &config.forwarder.denylist {
            info!("  denylisted: {}", name);
        }
        info!("Configuration is valid");
        return Ok(());
    }

    let stats = run_forwarder(config).await?;

    info!("Forwarder stopped");
    info!("  Watchers started: {}", stats.watchers_started);
    info!("  Watchers failed: {}", stats.watchers_failed);
    info!("  Events processed: {}", stats.events_processed);
    info!("  Batches exported: {}", stats.batches_exported);

    Ok(())
}
