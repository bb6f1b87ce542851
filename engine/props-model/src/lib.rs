//! Props Model
//!
//! Turns DraftKings player-prop odds into expected stat outcomes and
//! fantasy point projections. Each over/under market is de-vigged, matched
//! to a Normal, Poisson or Gamma distribution at its line, and the solved
//! means are weighted by a scoring system into a per-player total.

pub mod aggregator;
pub mod config;
pub mod dispatch;
pub mod distributions;
pub mod engine;
pub mod error;
pub mod history;
pub mod models;
pub mod odds;


pub use aggregator::aggregate_player_fpts;
pub use config::{Adjustment, CategoryConfig, GammaFitMethod, ModelConfig, NormalSigma, ScoringWeights, SolverConfig};
pub use dispatch::{CategoryDispatcher, CategorySpec};
pub use engine::ProjectionEngine;
pub use error::{ModelError, ProjectionError, Result};
pub use history::{HistoricalContext, HistoricalFit, HistoricalSource, InMemoryHistory};
pub use models::*;
pub use odds::{implied_probability, vig_free_probability};
