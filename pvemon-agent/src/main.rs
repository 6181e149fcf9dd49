//! pvemon agent - Proxmox VE metrics poller
//!
//! - `run`   poll all endpoints on schedule until Ctrl-C (default)
//! - `once`  one cycle per endpoint, flush, exit
//! - `check` validate config and contact every endpoint

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pvemon_agent::config::AgentConfig;
use pvemon_agent::health::{fastcheck, HealthTracker};
use pvemon_agent::scheduler::Scheduler;
use pvemon_agent::sink::ingest::targets_from_config;
use pvemon_agent::sink::BatchingSink;
use pvemon_agent::status::{self, AppState};
use pvemon_agent::ProxmoxClient;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pvemon-agent", version, about = "Proxmox VE metrics poller")]
struct Cli {
    /// Config file (defaults to $PVEMON_CONFIG, then the OS config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Poll on schedule until interrupted
    Run,
    /// Poll every endpoint once, flush and exit
    Once,
    /// Validate configuration and contact each endpoint
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = AgentConfig::load(cli.config.as_deref())
        .await
        .context("Failed to load configuration")?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Once => once(config).await,
        Command::Check => check(config).await,
    }
}

fn build_sink(config: &AgentConfig) -> Result<Arc<BatchingSink>> {
    let targets =
        targets_from_config(&config.telemetry).context("Failed to set up metric ingest")?;
    Ok(Arc::new(BatchingSink::new(
        config.telemetry.metric_prefix.clone(),
        config.telemetry.max_batch_bytes,
        targets,
    )))
}

fn require_usable(config: &AgentConfig) -> Result<()> {
    let status = fastcheck(config);
    if !status.is_ok() {
        bail!("Configuration is not usable: {}", status.message);
    }
    Ok(())
}

async fn run(config: AgentConfig) -> Result<()> {
    require_usable(&config)?;
    info!("pvemon agent starting with {} endpoints", config.endpoints.len());

    let tracker = HealthTracker::new();
    let scheduler = Scheduler::from_config(&config, build_sink(&config)?, tracker.clone());

    if let Some(listen) = config.agent.status_listen.clone() {
        let state = AppState {
            tracker,
            check: fastcheck(&config),
        };
        tokio::spawn(async move {
            if let Err(e) = status::serve(&listen, state).await {
                error!("{:#}", e);
            }
        });
    }

    let flushed = scheduler.run().await;
    if flushed.failed_batches > 0 {
        warn!("{} batches could not be delivered at shutdown", flushed.failed_batches);
    }
    info!("pvemon agent stopped");
    Ok(())
}

async fn once(config: AgentConfig) -> Result<()> {
    require_usable(&config)?;

    let scheduler = Scheduler::from_config(&config, build_sink(&config)?, HealthTracker::new());
    let (summaries, flushed) = scheduler.run_once().await;

    let aborted = summaries.iter().filter(|s| s.is_none()).count();
    info!(
        "Single pass done: {} endpoints, {} aborted, {} lines in {} batches ({} failed)",
        summaries.len(),
        aborted,
        flushed.lines,
        flushed.batches,
        flushed.failed_batches
    );

    if aborted == summaries.len() {
        bail!("No endpoint could be polled");
    }
    Ok(())
}

async fn check(config: AgentConfig) -> Result<()> {
    let status = fastcheck(&config);
    if !status.is_ok() {
        bail!("Configuration check failed: {}", status.message);
    }
    info!("Configuration OK");

    if let Err(e) = targets_from_config(&config.telemetry) {
        bail!("Metric ingest not usable: {}", e);
    }

    let mut unreachable = 0;
    for endpoint in &config.endpoints {
        let client = ProxmoxClient::new(endpoint.clone());
        match client.version().await {
            Ok(version) => info!(
                "{}: reachable, Proxmox VE {}",
                endpoint.host,
                version
                    .get("version")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
            ),
            Err(e) => {
                error!("{}: {}", endpoint.host, e);
                unreachable += 1;
            }
        }
    }

    if unreachable > 0 {
        bail!("{} of {} endpoints unreachable", unreachable, config.endpoints.len());
    }
    Ok(())
}
