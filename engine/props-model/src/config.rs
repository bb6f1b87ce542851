use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ModelError, Result};
use crate::models::{DistributionFamily, Position, Side, StatCategory};

/// Configuration for the props inference model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Numerical solver limits
    #[serde(default)]
    pub solver: SolverConfig,

    /// How Gamma scales are estimated from history
    #[serde(default)]
    pub gamma_fit: GammaFitMethod,

    /// Dispatch table: stat category -> modelling rules
    pub categories: BTreeMap<StatCategory, CategoryConfig>,

    /// Named scoring systems (ppr, half_ppr, standard, ...)
    pub scoring_systems: BTreeMap<String, ScoringWeights>,

    /// Categories a projection needs before it counts as complete
    pub required_categories: BTreeMap<Position, Vec<StatCategory>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Iteration cap for root finding and bounded minimisation
    pub max_iterations: usize,

    /// Absolute tolerance on the solved parameter
    pub tolerance: f64,

    /// Largest acceptable |cdf - target| after solving
    pub max_residual: f64,

    /// Upper bound of the Poisson rate search
    pub poisson_lambda_max: f64,

    /// Bracket growth steps before a root search gives up
    pub max_bracket_expansions: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GammaFitMethod {
    #[default]
    MaximumLikelihood,
    MethodOfMoments,
}

/// Modelling rules for one stat category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryConfig {
    /// DraftKings subcategory labels that map to this category
    pub labels: Vec<String>,

    pub family: DistributionFamily,

    /// Which vig-free side the solver is matched against
    pub side: Side,

    /// Column in the weekly stats table used for historical fits
    #[serde(default)]
    pub historical_field: Option<String>,

    #[serde(default)]
    pub normal_sigma: NormalSigma,

    /// Known market correction applied to the solved mean
    #[serde(default)]
    pub adjustment: Option<Adjustment>,

    /// Stat value whose exceedance probability feeds bonus scoring
    #[serde(default)]
    pub bonus_threshold: Option<f64>,
}

/// Where the Normal standard deviation comes from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum NormalSigma {
    /// sigma = fraction * line
    LineFraction { fraction: f64 },
    /// sigma (and the solver seed) from the position's historical fit
    Historical,
}

impl Default for NormalSigma {
    fn default() -> Self {
        NormalSigma::LineFraction { fraction: 0.25 }
    }
}

/// Correction applied to a solved mean
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Adjustment {
    /// Extra bookmaker margin on one-sided style markets; mean *= (1 - rate)
    Overround { rate: f64 },
}

impl Adjustment {
    pub fn factor(&self) -> f64 {
        match self {
            Adjustment::Overround { rate } => 1.0 - rate,
        }
    }
}

/// Fantasy-point multipliers for one scoring system
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Points per unit of the stat
    pub weights: BTreeMap<StatCategory, f64>,

    /// Points for clearing the category's bonus threshold
    #[serde(default)]
    pub bonuses: BTreeMap<StatCategory, f64>,
}

impl ScoringWeights {
    pub fn weight(&self, category: StatCategory) -> Option<f64> {
        self.weights.get(&category).copied()
    }

    pub fn bonus_value(&self, category: StatCategory) -> f64 {
        self.bonuses.get(&category).copied().unwrap_or(0.0)
    }
}

/// Documented overround on the DraftKings anytime-TD market.
///
/// Empirically tuned; kept configurable rather than baked into the solver.
pub const ANYTIME_TD_OVERROUND: f64 = 0.11;

pub const DEFAULT_YARDAGE_BONUS_THRESHOLD: f64 = 100.0;
pub const DEFAULT_PASSING_BONUS_THRESHOLD: f64 = 300.0;

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-10,
            max_residual: 1e-4,
            poisson_lambda_max: 50.0,
            max_bracket_expansions: 60,
        }
    }
}

fn category(
    labels: &[&str],
    family: DistributionFamily,
    side: Side,
    historical_field: Option<&str>,
) -> CategoryConfig {
    CategoryConfig {
        labels: labels.iter().map(|l| l.to_string()).collect(),
        family,
        side,
        historical_field: historical_field.map(str::to_string),
        normal_sigma: NormalSigma::default(),
        adjustment: None,
        bonus_threshold: None,
    }
}

fn weights(entries: &[(StatCategory, f64)]) -> BTreeMap<StatCategory, f64> {
    entries.iter().copied().collect()
}

impl Default for ModelConfig {
    fn default() -> Self {
        use DistributionFamily::*;
        use StatCategory::*;

        let mut categories = BTreeMap::new();

        let mut anytime_td = category(&["TD Scorer"], Poisson, Side::Under, None);
        anytime_td.adjustment = Some(Adjustment::Overround { rate: ANYTIME_TD_OVERROUND });
        categories.insert(AnytimeTd, anytime_td);
        categories.insert(
            Receptions,
            category(&["Receptions", "Receptions O/U"], Poisson, Side::Under, None),
        );
        categories.insert(PassTds, category(&["Pass TDs O/U"], Poisson, Side::Under, None));
        categories.insert(RushTds, category(&["Rushing TDs O/U"], Poisson, Side::Under, None));
        categories.insert(
            Interceptions,
            category(&["Interceptions O/U"], Poisson, Side::Under, None),
        );

        let mut pass_yards = category(&["Pass Yards O/U"], Normal, Side::Over, Some("passing_yards"));
        pass_yards.normal_sigma = NormalSigma::Historical;
        pass_yards.bonus_threshold = Some(DEFAULT_PASSING_BONUS_THRESHOLD);
        categories.insert(PassYards, pass_yards);

        let mut rush_yards = category(&["Rush Yards O/U"], Gamma, Side::Under, Some("rushing_yards"));
        rush_yards.bonus_threshold = Some(DEFAULT_YARDAGE_BONUS_THRESHOLD);
        categories.insert(RushYards, rush_yards);

        let mut rec_yards = category(&["Rec Yards O/U"], Gamma, Side::Under, Some("receiving_yards"));
        rec_yards.bonus_threshold = Some(DEFAULT_YARDAGE_BONUS_THRESHOLD);
        categories.insert(RecYards, rec_yards);

        // Rushing TDs are already inside the anytime-TD market, so they carry
        // no weight and show up as zero-weighted in the breakdown.
        let base = [
            (AnytimeTd, 6.0),
            (PassYards, 0.04),
            (PassTds, 4.0),
            (Interceptions, -2.0),
            (RushYards, 0.1),
            (RecYards, 0.1),
        ];

        let mut scoring_systems = BTreeMap::new();
        for (name, per_reception) in [("ppr", 1.0), ("half_ppr", 0.5), ("standard", 0.0)] {
            let mut table = weights(&base);
            table.insert(Receptions, per_reception);
            scoring_systems.insert(
                name.to_string(),
                ScoringWeights { weights: table, bonuses: BTreeMap::new() },
            );
        }
        scoring_systems.insert(
            "dk_classic".to_string(),
            ScoringWeights {
                weights: weights(&[
                    (AnytimeTd, 6.0),
                    (Receptions, 1.0),
                    (PassYards, 0.04),
                    (PassTds, 4.0),
                    (Interceptions, -1.0),
                    (RushYards, 0.1),
                    (RecYards, 0.1),
                ]),
                bonuses: weights(&[(PassYards, 3.0), (RushYards, 3.0), (RecYards, 3.0)]),
            },
        );

        let mut required_categories = BTreeMap::new();
        required_categories.insert(
            Position::QB,
            vec![PassYards, PassTds, Interceptions, RushYards, AnytimeTd],
        );
        required_categories.insert(Position::RB, vec![RushYards, RecYards, Receptions, AnytimeTd]);
        required_categories.insert(Position::WR, vec![RecYards, Receptions, AnytimeTd]);
        required_categories.insert(Position::TE, vec![RecYards, Receptions, AnytimeTd]);

        Self {
            solver: SolverConfig::default(),
            gamma_fit: GammaFitMethod::default(),
            categories,
            scoring_systems,
            required_categories,
        }
    }
}

impl ModelConfig {
    /// Look up a scoring system by name
    pub fn scoring(&self, name: &str) -> Result<&ScoringWeights> {
        self.scoring_systems
            .get(name)
            .ok_or_else(|| ModelError::UnknownScoringSystem(name.to_string()))
    }

    /// Required categories for a position (empty when not configured)
    pub fn required_for(&self, position: Position) -> &[StatCategory] {
        self.required_categories
            .get(&position)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Check internal consistency before the dispatcher is built
    pub fn validate(&self) -> Result<()> {
        let solver = &self.solver;
        if solver.max_iterations == 0 || solver.max_bracket_expansions == 0 {
            return Err(invalid("solver iteration limits must be positive"));
        }
        if !(solver.tolerance > 0.0) || !(solver.max_residual > 0.0) {
            return Err(invalid("solver tolerances must be positive"));
        }
        if !(solver.poisson_lambda_max > 0.0) {
            return Err(invalid("poisson_lambda_max must be positive"));
        }

        for (cat, spec) in &self.categories {
            if spec.labels.is_empty() {
                return Err(invalid(format!("category {cat} has no labels")));
            }
            if spec.family == DistributionFamily::Gamma && spec.historical_field.is_none() {
                return Err(invalid(format!("gamma category {cat} needs a historical_field")));
            }
            if spec.family == DistributionFamily::Normal {
                match spec.normal_sigma {
                    NormalSigma::LineFraction { fraction } if !(fraction > 0.0) => {
                        return Err(invalid(format!("category {cat} has non-positive sigma fraction")));
                    }
                    NormalSigma::Historical if spec.historical_field.is_none() => {
                        return Err(invalid(format!(
                            "category {cat} uses historical sigma without a historical_field"
                        )));
                    }
                    _ => {}
                }
            }
            if let Some(Adjustment::Overround { rate }) = spec.adjustment {
                if !(0.0..1.0).contains(&rate) {
                    return Err(invalid(format!("category {cat} overround {rate} outside [0, 1)")));
                }
            }
            if let Some(threshold) = spec.bonus_threshold {
                if !(threshold > 0.0) {
                    return Err(invalid(format!("category {cat} bonus threshold must be positive")));
                }
            }
        }

        for (name, table) in &self.scoring_systems {
            let all = table.weights.values().chain(table.bonuses.values());
            if all.into_iter().any(|w| !w.is_finite()) {
                return Err(invalid(format!("scoring system {name} has a non-finite weight")));
            }
        }

        for (position, required) in &self.required_categories {
            if let Some(cat) = required.iter().find(|c| !self.categories.contains_key(c)) {
                return Err(invalid(format!(
                    "{position} requires {cat}, which has no dispatch entry"
                )));
            }
        }

        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> ModelError {
    ModelError::InvalidConfig(msg.into())
}
