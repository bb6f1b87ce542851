use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

use draftkings_fetcher::{initialize_logging_with_config, load_config, pipeline, RunSummary};

#[derive(Parser)]
#[command(name = "draftkings-fetcher")]
#[command(about = "Fetch DraftKings player props and project fantasy points")]
struct Cli {
    /// Optional TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch, store and project the current slate
    Run,
    /// Recompute projections from a parsed snapshot
    Project {
        /// Path to a parsed_props_<ts>.json snapshot
        #[arg(long)]
        input: PathBuf,
    },
    /// Load a weekly player stats CSV into fact_player_weekly
    IngestWeekly {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Load a player id CSV into players
    IngestPlayers {
        #[arg(long)]
        csv: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    initialize_logging_with_config(&config.logging)?;

    info!("Starting DraftKings props fetcher v{}", env!("CARGO_PKG_VERSION"));

    let result = match cli.command {
        Command::Run => pipeline::run(&config).await.map(report),
        Command::Project { input } => pipeline::project_from_snapshot(&config, &input).await.map(report),
        Command::IngestWeekly { csv } => pipeline::ingest_weekly(&config, &csv)
            .await
            .map(|rows| info!("Ingested {} weekly rows from {:?}", rows, csv)),
        Command::IngestPlayers { csv } => pipeline::ingest_players(&config, &csv)
            .await
            .map(|rows| info!("Ingested {} players from {:?}", rows, csv)),
    };

    if let Err(e) = &result {
        error!("Run failed: {:#}", e);
    }
    result
}

fn report(summary: RunSummary) {
    for (system, players) in &summary.players_by_system {
        info!("{}: {} players projected", system, players);
    }
}
