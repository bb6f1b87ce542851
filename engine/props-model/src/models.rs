use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ProjectionError;

/// Fantasy-relevant offensive position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Position {
    QB,
    RB,
    WR,
    TE,
}

impl Position {
    pub const ALL: [Position; 4] = [Position::QB, Position::RB, Position::WR, Position::TE];

    pub fn as_str(&self) -> &'static str {
        match self {
            Position::QB => "QB",
            Position::RB => "RB",
            Position::WR => "WR",
            Position::TE => "TE",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Position {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "QB" => Ok(Position::QB),
            "RB" => Ok(Position::RB),
            "WR" => Ok(Position::WR),
            "TE" => Ok(Position::TE),
            other => Err(format!("unsupported position '{other}'")),
        }
    }
}

/// Closed stat-category taxonomy covered by the prop markets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatCategory {
    AnytimeTd,
    Receptions,
    PassYards,
    PassTds,
    Interceptions,
    RushYards,
    RushTds,
    RecYards,
}

impl StatCategory {
    pub const ALL: [StatCategory; 8] = [
        StatCategory::AnytimeTd,
        StatCategory::Receptions,
        StatCategory::PassYards,
        StatCategory::PassTds,
        StatCategory::Interceptions,
        StatCategory::RushYards,
        StatCategory::RushTds,
        StatCategory::RecYards,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatCategory::AnytimeTd => "anytime_td",
            StatCategory::Receptions => "receptions",
            StatCategory::PassYards => "pass_yards",
            StatCategory::PassTds => "pass_tds",
            StatCategory::Interceptions => "interceptions",
            StatCategory::RushYards => "rush_yards",
            StatCategory::RushTds => "rush_tds",
            StatCategory::RecYards => "rec_yards",
        }
    }
}

impl fmt::Display for StatCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Distribution family used to model a stat category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionFamily {
    Normal,
    Poisson,
    Gamma,
}

impl fmt::Display for DistributionFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DistributionFamily::Normal => "normal",
            DistributionFamily::Poisson => "poisson",
            DistributionFamily::Gamma => "gamma",
        };
        f.write_str(name)
    }
}

/// Side of a two-way market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Over,
    Under,
}

/// One over/under prop market instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketLine {
    pub player_id: String,
    pub position: Position,
    pub stat_category: StatCategory,
    /// The over/under number
    pub line: f64,
    /// American odds for the over (or "yes") side
    pub over_odds: Option<i32>,
    /// American odds for the under (or "no") side
    pub under_odds: Option<i32>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub event_id: Option<String>,
}

impl MarketLine {
    pub fn new(
        player_id: impl Into<String>,
        position: Position,
        stat_category: StatCategory,
        line: f64,
        over_odds: Option<i32>,
        under_odds: Option<i32>,
    ) -> Self {
        Self {
            player_id: player_id.into(),
            position,
            stat_category,
            line,
            over_odds,
            under_odds,
            timestamp: Utc::now(),
            event_id: None,
        }
    }

    /// Both sides of the market, or an error naming the missing one
    pub fn odds_pair(&self) -> Result<(i32, i32), ProjectionError> {
        match (self.over_odds, self.under_odds) {
            (Some(over), Some(under)) => Ok((over, under)),
            (None, _) => Err(ProjectionError::invalid_odds(format!(
                "{} {} market is missing the over side",
                self.player_id, self.stat_category
            ))),
            (_, None) => Err(ProjectionError::invalid_odds(format!(
                "{} {} market is missing the under side",
                self.player_id, self.stat_category
            ))),
        }
    }
}

/// Past per-week values for one (position, stat category) pair
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalSample {
    pub position: Position,
    pub category: StatCategory,
    values: Vec<f64>,
}

impl HistoricalSample {
    /// Build a sample, rejecting negative or non-finite values
    pub fn new(
        position: Position,
        category: StatCategory,
        values: Vec<f64>,
    ) -> Result<Self, ProjectionError> {
        if let Some(bad) = values.iter().find(|v| !v.is_finite() || **v < 0.0) {
            return Err(ProjectionError::InsufficientHistory {
                position,
                category,
                reason: format!("sample contains invalid value {bad}"),
            });
        }
        Ok(Self { position, category, values })
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn insufficient(&self, reason: impl Into<String>) -> ProjectionError {
        ProjectionError::InsufficientHistory {
            position: self.position,
            category: self.category,
            reason: reason.into(),
        }
    }
}

/// Solved distribution parameters behind a projection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum DistributionParams {
    Normal { mean: f64, sigma: f64 },
    Poisson { lambda: f64 },
    Gamma { shape: f64, scale: f64 },
}

/// Inference output for one market line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub player_id: String,
    pub position: Position,
    pub stat_category: StatCategory,
    pub distribution_family: DistributionFamily,
    /// Expected value of the underlying stat, after any market adjustment
    pub mean_outcome: f64,
    /// Probability of clearing the category's bonus threshold
    pub bonus_probability: Option<f64>,
    /// Vig-free probability the solver was matched against
    pub fair_probability: f64,
    pub vig: f64,
    pub line: f64,
    /// Multiplier applied to the solved mean (1.0 when none)
    pub adjustment: f64,
    pub parameters: DistributionParams,
}

/// A market's projection or the reason it could not be computed
#[derive(Debug, Clone, PartialEq)]
pub struct MarketEvaluation {
    pub player_id: String,
    pub position: Position,
    pub stat_category: StatCategory,
    pub projection: Result<Projection, ProjectionError>,
}

impl MarketEvaluation {
    pub fn from_line(line: &MarketLine, projection: Result<Projection, ProjectionError>) -> Self {
        Self {
            player_id: line.player_id.clone(),
            position: line.position,
            stat_category: line.stat_category,
            projection,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.projection.is_ok()
    }
}

/// Points contributed by one category to a player's total
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryContribution {
    pub mean_outcome: f64,
    pub weight: f64,
    pub bonus_probability: Option<f64>,
    pub bonus_value: f64,
    pub points: f64,
}

/// Aggregate of a player's projections under one scoring system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerFantasyProjection {
    pub player_id: String,
    pub position: Position,
    pub scoring_system: String,
    pub fpts_total: f64,
    pub category_breakdown: BTreeMap<StatCategory, CategoryContribution>,
    /// True when every required category for the position was projected
    pub completeness_flag: bool,
    pub missing_categories: Vec<StatCategory>,
    /// Categories whose markets all failed, with the last failure message
    pub failed_categories: BTreeMap<StatCategory, String>,
    /// Categories that were projected but have no weight in the table
    pub zero_weighted_categories: Vec<StatCategory>,
}

impl PlayerFantasyProjection {
    /// Total rounded to one decimal place for display
    pub fn display_fpts(&self) -> f64 {
        (self.fpts_total * 10.0).round() / 10.0
    }
}
