//! Agora daemon: reconciles a ledger event feed into the local governance
//! projection.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use agora_node::{
    init_logging, GovernanceNode, LogFormat, NdjsonFileSource, NodeConfig, ProjectionBus,
    ShutdownController,
};
use anyhow::Context;
use clap::Parser;

#[derive(Parser)]
#[command(name = "agora-daemon", about = "Agora governance reconciler daemon")]
struct Cli {
    /// Path to a TOML configuration file. File settings are the base; CLI
    /// flags and env vars override them.
    #[arg(long, env = "AGORA_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory for the LMDB projection.
    #[arg(long, env = "AGORA_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// NDJSON ledger event feed, one event per line.
    #[arg(long, env = "AGORA_EVENTS")]
    events: PathBuf,

    /// Keep reading as the feed file grows instead of stopping at its end.
    #[arg(long, env = "AGORA_FOLLOW")]
    follow: bool,

    /// Poll interval in milliseconds while following.
    #[arg(long, default_value_t = 500, env = "AGORA_POLL_MS")]
    poll_ms: u64,

    /// Log output: "human" or "json".
    #[arg(long, env = "AGORA_LOG_FORMAT")]
    log_format: Option<String>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "AGORA_LOG_LEVEL")]
    log_level: Option<String>,

    /// Collect Prometheus metrics and print them on exit.
    #[arg(long, env = "AGORA_ENABLE_METRICS")]
    metrics: bool,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<(NodeConfig, PathBuf, bool, Duration)> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::from_toml_file(&path.to_string_lossy())
                .with_context(|| format!("loading {}", path.display()))?,
            None => NodeConfig::default(),
        };
        if let Some(dir) = self.data_dir {
            config.data_dir = dir;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        config.enable_metrics |= self.metrics;
        Ok((config, self.events, self.follow, Duration::from_millis(self.poll_ms)))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (config, events, follow, poll) = Cli::parse().into_config()?;

    let format: LogFormat = config.log_format()?;
    init_logging(format, &config.log_level)?;

    tracing::info!(
        data_dir = %config.data_dir.display(),
        events = %events.display(),
        follow,
        "starting agora daemon"
    );

    let node = GovernanceNode::open(config).context("opening governance store")?;
    let source = NdjsonFileSource::new(events).follow(follow).poll_interval(poll);

    let shutdown = Arc::new(ShutdownController::new());
    let signals = Arc::clone(&shutdown);
    tokio::spawn(async move { signals.wait_for_signal().await });

    node.run(&source, ProjectionBus::new(), &shutdown).await?;

    if let Some(metrics) = node.metrics() {
        match metrics.render() {
            Ok(text) => tracing::info!(target: "agora::metrics", "\n{text}"),
            Err(e) => tracing::warn!(error = %e, "failed to render metrics"),
        }
    }
    tracing::info!("agora daemon exited cleanly");
    Ok(())
}
