// src/main.rs
//! Scheduler entry point: pulls, pays, associates and confirms payouts on a timetable.
use anyhow::{Context, Result};
use clap::Parser;
use simplecoin_rpc_client::cli::SchedulerCli;
use simplecoin_rpc_client::core::config::AppConfig;
use simplecoin_rpc_client::core::logging::init_logging;
use simplecoin_rpc_client::service::{PayoutManager, Scheduler};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = SchedulerCli::parse();
    let config = AppConfig::load(&cli.global.config)
        .with_context(|| format!("loading {}", cli.global.config.display()))?;

    let level = cli.global.log_level.clone().unwrap_or_else(|| config.sc_rpc_client.log_level.clone());
    init_logging(&level)?;

    info!("{}", "=".repeat(80));
    info!("SimpleCoin cron scheduler starting up v{}", env!("CARGO_PKG_VERSION"));

    let manager = PayoutManager::from_config(&config, cli.global.simulate).await?;
    if manager.currency_codes().next().is_none() {
        warn!("No currencies are enabled; scheduled jobs will do nothing");
    }

    let scheduler = Scheduler::new(manager, &config.schedule);
    scheduler.run(shutdown_signal()).await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
