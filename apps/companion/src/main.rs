use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use companion_core::{CompanionClient, WorldOutcome};
use shared::domain::WorldId;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;

#[derive(Parser, Debug)]
struct Args {
    /// Optional TOML file of string settings.
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// World to join; repeat to join several. Overrides the configured list.
    #[arg(long = "world")]
    worlds: Vec<i64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let args = Args::parse();

    let mut settings = config::load_settings(&args.config);
    if !args.worlds.is_empty() {
        settings.worlds = args.worlds.into_iter().map(WorldId).collect();
    }

    let client = CompanionClient::new(settings);
    let active = client.config();
    info!(
        http_url = %active.http_url,
        ws_url = %active.ws_url,
        worlds = ?active.worlds,
        "starting companion"
    );
    let reports = client.run().await.context("companion failed to start")?;

    let joined = reports
        .iter()
        .filter(|report| matches!(report.outcome, WorldOutcome::Closed(_)))
        .count();
    for report in &reports {
        if let WorldOutcome::Closed(end) = &report.outcome {
            info!(
                world_id = report.world.0,
                chat_lines = end.chat_lines,
                ticks = end.ticks,
                "left world"
            );
        }
    }
    info!(joined, failed = reports.len() - joined, "all worlds settled");

    if joined == 0 {
        bail!("no world could be joined");
    }
    Ok(())
}
