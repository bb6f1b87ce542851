//! Batch run: fetch, snapshot, parse, store, fit, project

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use props_model::{InMemoryHistory, MarketEvaluation, MarketLine, Position, ProjectionEngine};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{error, info, warn};

use crate::config::FetcherConfig;
use crate::fetcher::DraftKingsFetcher;
use crate::ingest::{read_players_file, read_weekly_stats_file};
use crate::models::{MarketEvaluationRow, PropOffer};
use crate::parser::{build_market_lines, parse_response};
use crate::snapshot::{read_parsed, snapshot_timestamp, SnapshotWriter};
use crate::store::PropsStore;

/// Counts reported at the end of a run
#[derive(Debug, Default)]
pub struct RunSummary {
    pub offers: usize,
    pub market_lines: usize,
    pub projected_markets: usize,
    pub failed_markets: usize,
    pub players_by_system: BTreeMap<String, usize>,
}

/// Load the DraftKings -> player table name map, if one is configured
pub fn load_name_map(path: Option<&Path>) -> Result<HashMap<String, String>> {
    let Some(path) = path else {
        return Ok(HashMap::new());
    };
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read player name map {:?}", path))?;
    serde_json::from_str(&body).with_context(|| format!("Failed to parse player name map {:?}", path))
}

/// Full run against the live sportsbook
pub async fn run(config: &FetcherConfig) -> Result<RunSummary> {
    let started_at = Utc::now();
    let timestamp = snapshot_timestamp(started_at);
    let snapshots = SnapshotWriter::new(&config.output.dir);

    let fetcher = DraftKingsFetcher::new(config.draftkings.clone(), config.retry.clone())?;
    let fetched = fetcher.fetch_all().await;
    if fetched.is_empty() {
        anyhow::bail!("No subcategory could be fetched");
    }

    let mut offers = Vec::new();
    for subcategory in &fetched {
        if config.output.write_snapshots {
            snapshots.write_raw(&subcategory.target.name, &subcategory.payload, &timestamp)?;
        }
        match parse_response(&subcategory.payload, subcategory.fetched_at) {
            Ok(parsed) => offers.extend(parsed),
            Err(e) => error!("Skipping {}: {:#}", subcategory.target.name, e),
        }
    }

    if config.output.write_snapshots {
        let path = snapshots.write_parsed(&offers, &timestamp)?;
        info!("Parsed snapshot written to {:?}", path);
    }

    let store = PropsStore::connect(&config.database).await?;
    store.ensure_schema().await?;
    store.insert_offers(&offers).await?;

    project_offers(config, &store, &snapshots, &offers, started_at).await
}

/// Recompute projections from a parsed snapshot without refetching
pub async fn project_from_snapshot(config: &FetcherConfig, input: &Path) -> Result<RunSummary> {
    let offers = read_parsed(input)?;
    info!("Loaded {} offers from {:?}", offers.len(), input);

    let store = PropsStore::connect(&config.database).await?;
    store.ensure_schema().await?;

    let snapshots = SnapshotWriter::new(&config.output.dir);
    project_offers(config, &store, &snapshots, &offers, Utc::now()).await
}

async fn project_offers(
    config: &FetcherConfig,
    store: &PropsStore,
    snapshots: &SnapshotWriter,
    offers: &[PropOffer],
    computed_at: DateTime<Utc>,
) -> Result<RunSummary> {
    let engine = ProjectionEngine::new(config.model.clone()).context("Invalid model configuration")?;
    let timestamp = snapshot_timestamp(computed_at);

    let positions = store.load_player_positions().await?;
    let name_map = load_name_map(config.player_name_map.as_deref())?;
    let lines = build_market_lines(offers, engine.dispatcher(), &positions, &name_map).lines;

    // All history is loaded before any market is solved
    let history = load_history(&engine, store).await;

    let (engine, lines, evaluations) = solve_markets(engine, lines, history).await?;
    let failed_markets = evaluations.iter().filter(|e| !e.is_ok()).count();

    let rows: Vec<MarketEvaluationRow> = lines
        .iter()
        .zip(&evaluations)
        .map(|(line, evaluation)| MarketEvaluationRow::new(line, evaluation))
        .collect();
    store.insert_evaluations(&rows, computed_at).await?;

    let mut summary = RunSummary {
        offers: offers.len(),
        market_lines: lines.len(),
        projected_markets: evaluations.len() - failed_markets,
        failed_markets,
        players_by_system: BTreeMap::new(),
    };

    for system in config.model.scoring_systems.keys() {
        let players = engine.project_players(&evaluations, system)?;
        if let Some(top) = players.first() {
            info!("{} leader: {} {:.1} fpts", system, top.player_id, top.display_fpts());
        }
        if config.output.write_snapshots {
            snapshots.write_projections(system, &players, &timestamp)?;
        }
        store.upsert_projections(&players, computed_at).await?;
        summary.players_by_system.insert(system.clone(), players.len());
    }

    info!("Run complete: {:?}", summary);
    Ok(summary)
}

/// Load a weekly stats CSV into `fact_player_weekly`
pub async fn ingest_weekly(config: &FetcherConfig, csv: &Path) -> Result<u64> {
    let rows = read_weekly_stats_file(csv)?;
    let store = PropsStore::connect(&config.database).await?;
    store.ensure_history_schema().await?;
    store.insert_weekly_stats(&rows).await
}

/// Load a player id CSV into `players`
pub async fn ingest_players(config: &FetcherConfig, csv: &Path) -> Result<u64> {
    let rows = read_players_file(csv)?;
    let store = PropsStore::connect(&config.database).await?;
    store.ensure_history_schema().await?;
    store.insert_players(&rows).await
}

/// Fit history and solve every market on the blocking pool
async fn solve_markets(
    engine: ProjectionEngine,
    lines: Vec<MarketLine>,
    history: InMemoryHistory,
) -> Result<(ProjectionEngine, Vec<MarketLine>, Vec<MarketEvaluation>)> {
    tokio::task::spawn_blocking(move || {
        let context = engine.build_context(&history);
        let evaluations = engine.evaluate_markets(&lines, &context);
        (engine, lines, evaluations)
    })
    .await
    .context("Projection task failed")
}

async fn load_history(engine: &ProjectionEngine, store: &PropsStore) -> InMemoryHistory {
    let mut history = InMemoryHistory::new();
    let fields: Vec<&str> = engine
        .dispatcher()
        .historical_specs()
        .filter_map(|spec| spec.historical_field.as_deref())
        .collect();

    for field in fields {
        for position in Position::ALL {
            match store.load_weekly_values(position, field).await {
                Ok(values) => history.insert(position, field, values),
                // Missing history fails only the markets that need it
                Err(e) => warn!("No weekly {} for {}: {:#}", field, position, e),
            }
        }
    }
    history
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_name_map() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"De'Von Achane": "Devon Achane", "Gabe Davis": "Gabriel Davis"}}"#).unwrap();

        let map = load_name_map(Some(file.path())).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["Gabe Davis"], "Gabriel Davis");
        assert!(load_name_map(None).unwrap().is_empty());
    }

    #[test]
    fn test_solve_markets_off_runtime() {
        let engine = ProjectionEngine::new(props_model::ModelConfig::default()).unwrap();
        let lines = vec![
            MarketLine::new("George Kittle", Position::TE, props_model::StatCategory::Receptions, 4.5, Some(-110), Some(-110)),
            MarketLine::new("George Kittle", Position::TE, props_model::StatCategory::RecYards, 52.5, Some(-115), Some(-105)),
        ];
        let history = InMemoryHistory::new().with(
            Position::TE,
            "receiving_yards",
            vec![41.0, 67.0, 0.0, 88.0, 23.0, 59.0, 112.0, 35.0],
        );

        let (_, lines, evaluations) =
            tokio_test::block_on(solve_markets(engine, lines, history)).unwrap();
        assert_eq!(lines.len(), 2);
        assert!(evaluations.iter().all(|e| e.is_ok()), "{:?}", evaluations);
        assert_eq!(evaluations[1].player_id, "George Kittle");
    }

    #[test]
    fn test_load_name_map_rejects_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(load_name_map(Some(file.path())).is_err());
    }
}
