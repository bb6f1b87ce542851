//! DraftKings Props Fetcher
//!
//! Pulls player-prop markets from the DraftKings sportsbook API, keeps raw
//! and parsed snapshots, stores offers in Postgres and runs them through the
//! props model to produce fantasy point projections per scoring system.

pub mod config;
pub mod fetcher;
pub mod ingest;
pub mod logging;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod snapshot;
pub mod store;

pub use config::{load_config, FetcherConfig};
pub use fetcher::DraftKingsFetcher;
pub use logging::initialize_logging_with_config;
pub use models::*;
pub use pipeline::{ingest_players, ingest_weekly, project_from_snapshot, run, RunSummary};
pub use snapshot::SnapshotWriter;
pub use store::PropsStore;
