//! nbsync
//!
//! Polls network devices over SSH, parses command output with templates and
//! converges NetBox to what the devices report.

use std::path::{Path, PathBuf};

use clap::Parser;
use color_eyre::Result;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use nbsync_core::SyncPipeline;

mod config;
mod factory;
mod report;

use crate::config::Config;
use crate::report::ReportFormat;

#[derive(Parser)]
#[command(name = "nbsync", version)]
#[command(about = "Sync network device state into NetBox", long_about = None)]
struct Cli {
    /// Config file (default: ./nbsync.toml, /etc/nbsync/nbsync.toml, user config dir)
    #[arg(short, long, env = "NBSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Override `[sync] max_workers`
    #[arg(long)]
    max_workers: Option<usize>,

    /// Only sync this host (repeatable)
    #[arg(long = "device", value_name = "HOST")]
    devices: Vec<String>,

    /// Report format printed at the end of the run
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    report: ReportFormat,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let (path, mut config) = Config::locate(cli.config.as_deref())?;
    init_tracing(&config.log_level, cli.log_json);
    tracing::info!(config = %path.display(), devices = config.devices.len(), "nbsync starting");

    if let Some(max_workers) = cli.max_workers {
        config.sync.max_workers = max_workers;
    }
    config.validate()?;

    let base_dir = path.parent().unwrap_or(Path::new("."));
    let sessions = config.sessions(base_dir, &cli.devices)?;

    let pipeline = SyncPipeline::new(
        factory::connector(&config.sync),
        factory::store(&config.netbox)?,
        config.role_table(),
        config.sync_config(),
    )?;

    let mut events = pipeline.subscribe();
    let progress = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Ok(json) = serde_json::to_string(&event) {
                        tracing::debug!(host = event.host().unwrap_or("-"), event = %json, "progress");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "progress log lagging");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let report = pipeline.run(sessions).await;
    drop(pipeline);
    progress.await.ok();

    if !report.is_clean() {
        tracing::warn!(
            devices = report.device_failures.len(),
            entities = report.entity_failures.len(),
            "run finished with failures"
        );
    }
    println!("{}", report::render(&report, cli.report)?);
    Ok(())
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
