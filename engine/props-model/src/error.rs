//! Error types for the props model

use thiserror::Error;

use crate::models::{Position, StatCategory};

/// Result type for configuration-level model operations
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors produced while turning one market line into a projection.
///
/// Every variant is recoverable at the market granularity: one failing
/// market never aborts the rest of the batch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProjectionError {
    #[error("Invalid odds: {0}")]
    InvalidOdds(String),

    #[error("Unsupported stat category: {0}")]
    UnsupportedCategory(String),

    #[error("Insufficient history for {position}/{category}: {reason}")]
    InsufficientHistory {
        position: Position,
        category: StatCategory,
        reason: String,
    },

    #[error("Solver did not converge: {0}")]
    SolverConvergence(String),
}

impl ProjectionError {
    /// Create a new invalid odds error
    pub fn invalid_odds(msg: impl Into<String>) -> Self {
        Self::InvalidOdds(msg.into())
    }

    /// Create a new unsupported category error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedCategory(msg.into())
    }

    /// Create a new solver convergence error
    pub fn convergence(msg: impl Into<String>) -> Self {
        Self::SolverConvergence(msg.into())
    }

    /// Short machine-readable kind, used when persisting failures
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidOdds(_) => "invalid_odds",
            Self::UnsupportedCategory(_) => "unsupported_category",
            Self::InsufficientHistory { .. } => "insufficient_history",
            Self::SolverConvergence(_) => "solver_convergence",
        }
    }
}

/// Errors that are not tied to a single market
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Unknown scoring system: {0}")]
    UnknownScoringSystem(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Historical source error: {0}")]
    HistoricalSource(String),

    #[error(transparent)]
    Projection(#[from] ProjectionError),
}
