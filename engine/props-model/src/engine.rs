use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::aggregator::aggregate_player_fpts;
use crate::config::{ModelConfig, NormalSigma};
use crate::dispatch::{CategoryDispatcher, CategorySpec};
use crate::distributions::normal::DEFAULT_TAIL_THRESHOLD;
use crate::distributions::special::{normal_cdf, poisson_cdf};
use crate::distributions::{
    evaluate_normal_distribution, find_normal_mean, gamma_mean_from_market, poisson_mean_from_market,
};
use crate::error::{ProjectionError, Result};
use crate::history::{HistoricalContext, HistoricalSource};
use crate::models::{
    DistributionFamily, DistributionParams, MarketEvaluation, MarketLine, PlayerFantasyProjection,
    Position, Projection, Side,
};
use crate::odds::vig_free_probability;

/// Market line -> projection -> fantasy points
#[derive(Debug, Clone)]
pub struct ProjectionEngine {
    config: ModelConfig,
    dispatcher: CategoryDispatcher,
}

/// Solved mean, bonus probability and parameters before adjustment
struct Solved {
    mean: f64,
    bonus_probability: Option<f64>,
    parameters: DistributionParams,
}

impl ProjectionEngine {
    pub fn new(config: ModelConfig) -> Result<Self> {
        let dispatcher = CategoryDispatcher::new(&config)?;
        info!(
            "Projection engine ready: {} categories, {} scoring systems",
            config.categories.len(),
            config.scoring_systems.len()
        );
        Ok(Self { config, dispatcher })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &CategoryDispatcher {
        &self.dispatcher
    }

    /// Fit every historical pair the dispatch table needs
    pub fn build_context<S>(&self, source: &S) -> HistoricalContext
    where
        S: HistoricalSource + ?Sized,
    {
        HistoricalContext::build(&self.dispatcher, source, self.config.gamma_fit)
    }

    /// Turn one market line into a projection
    pub fn compute_projection(
        &self,
        market: &MarketLine,
        context: &HistoricalContext,
    ) -> std::result::Result<Projection, ProjectionError> {
        let spec = self.dispatcher.spec_for(market.stat_category)?;
        let (over_odds, under_odds) = market.odds_pair()?;
        let (fair_probability, vig) = vig_free_probability(over_odds, under_odds, spec.side)?;

        let solved = self.solve(spec, market, fair_probability, context)?;

        let adjustment = spec.adjustment_factor();
        let mean_outcome = solved.mean * adjustment;
        if !mean_outcome.is_finite() {
            return Err(ProjectionError::convergence(format!(
                "{} {} produced a non-finite mean",
                market.player_id, market.stat_category
            )));
        }

        Ok(Projection {
            player_id: market.player_id.clone(),
            position: market.position,
            stat_category: market.stat_category,
            distribution_family: spec.family,
            mean_outcome,
            bonus_probability: solved.bonus_probability,
            fair_probability,
            vig,
            line: market.line,
            adjustment,
            parameters: solved.parameters,
        })
    }

    fn solve(
        &self,
        spec: &CategorySpec,
        market: &MarketLine,
        fair_probability: f64,
        context: &HistoricalContext,
    ) -> std::result::Result<Solved, ProjectionError> {
        let solver = &self.config.solver;
        let (p_less, p_over) = match spec.side {
            Side::Under => (fair_probability, 1.0 - fair_probability),
            Side::Over => (1.0 - fair_probability, fair_probability),
        };

        match spec.family {
            DistributionFamily::Poisson => {
                let lambda = poisson_mean_from_market(market.line, p_less, solver)?;
                // P(N >= threshold)
                let bonus_probability = spec
                    .bonus_threshold
                    .map(|t| 1.0 - poisson_cdf(t.ceil() - 1.0, lambda));
                Ok(Solved {
                    mean: lambda,
                    bonus_probability,
                    parameters: DistributionParams::Poisson { lambda },
                })
            }
            DistributionFamily::Normal => {
                let (mean, sigma, bonus_probability) = match spec.normal_sigma {
                    NormalSigma::LineFraction { fraction } => {
                        // Known sigma: closed form, no search
                        let sigma = fraction * market.line;
                        let mean = find_normal_mean(market.line, p_less, sigma)?;
                        let tail = spec.bonus_threshold.map(|t| 1.0 - normal_cdf(t, mean, sigma));
                        (mean, sigma, tail)
                    }
                    NormalSigma::Historical => {
                        let fit = context.normal_fit(market.position, market.stat_category)?;
                        let threshold = spec.bonus_threshold.unwrap_or(DEFAULT_TAIL_THRESHOLD);
                        let (mean, tail) =
                            evaluate_normal_distribution(fit.mu, fit.sigma, market.line, p_over, threshold, solver)?;
                        (mean, fit.sigma, spec.bonus_threshold.map(|_| tail))
                    }
                };
                Ok(Solved {
                    mean,
                    bonus_probability,
                    parameters: DistributionParams::Normal { mean, sigma },
                })
            }
            DistributionFamily::Gamma => {
                let scale = context.gamma_scale(market.position, market.stat_category)?;
                let solution = gamma_mean_from_market(market.line, p_less, scale, solver)?;
                Ok(Solved {
                    mean: solution.mean,
                    bonus_probability: spec.bonus_threshold.map(|t| solution.tail_probability(t)),
                    parameters: DistributionParams::Gamma {
                        shape: solution.shape,
                        scale: solution.scale,
                    },
                })
            }
        }
    }

    /// Evaluate every market independently; output order matches input order
    pub fn evaluate_markets(&self, markets: &[MarketLine], context: &HistoricalContext) -> Vec<MarketEvaluation> {
        let evaluations: Vec<MarketEvaluation> = markets
            .par_iter()
            .map(|market| MarketEvaluation::from_line(market, self.compute_projection(market, context)))
            .collect();

        let failed = evaluations.iter().filter(|e| !e.is_ok()).count();
        for evaluation in evaluations.iter() {
            if let Err(e) = &evaluation.projection {
                debug!(
                    "{} {} not projected ({}): {}",
                    evaluation.player_id,
                    evaluation.stat_category,
                    e.kind(),
                    e
                );
            }
        }
        if failed > 0 {
            warn!("{} of {} markets could not be projected", failed, evaluations.len());
        }
        info!("Evaluated {} markets", evaluations.len());
        evaluations
    }

    /// Aggregate evaluations per player, highest total first
    pub fn project_players(
        &self,
        evaluations: &[MarketEvaluation],
        scoring_system: &str,
    ) -> Result<Vec<PlayerFantasyProjection>> {
        let weights = self.config.scoring(scoring_system)?;

        let mut by_player: BTreeMap<(&str, Position), Vec<&MarketEvaluation>> = BTreeMap::new();
        for evaluation in evaluations {
            by_player
                .entry((evaluation.player_id.as_str(), evaluation.position))
                .or_default()
                .push(evaluation);
        }

        let mut players: Vec<PlayerFantasyProjection> = by_player
            .into_iter()
            .map(|((player_id, position), evaluations)| {
                aggregate_player_fpts(
                    player_id,
                    position,
                    evaluations,
                    scoring_system,
                    weights,
                    self.config.required_for(position),
                )
            })
            .collect();

        players.sort_by(|a, b| b.fpts_total.total_cmp(&a.fpts_total));

        let complete = players.iter().filter(|p| p.completeness_flag).count();
        info!(
            "Projected {} players under {} ({} complete)",
            players.len(),
            scoring_system,
            complete
        );
        Ok(players)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GammaFitMethod;
    use crate::distributions::special::gamma_cdf;
    use crate::error::ModelError;
    use crate::history::InMemoryHistory;
    use crate::models::StatCategory;

    fn engine() -> ProjectionEngine {
        ProjectionEngine::new(ModelConfig::default()).unwrap()
    }

    fn context(engine: &ProjectionEngine) -> HistoricalContext {
        let source = InMemoryHistory::new()
            .with(Position::RB, "rushing_yards", vec![0.0, 41.0, 88.0, 63.0, 102.0, 57.0, 24.0, 75.0])
            .with(Position::WR, "receiving_yards", vec![12.0, 67.0, 94.0, 38.0, 55.0, 121.0, 0.0, 49.0])
            .with(Position::QB, "passing_yards", vec![221.0, 287.0, 198.0, 312.0, 254.0, 240.0]);
        engine.build_context(&source)
    }

    #[test]
    fn test_anytime_td_applies_overround() {
        let engine = engine();
        let market = MarketLine::new("Derrick Henry", Position::RB, StatCategory::AnytimeTd, 0.5, Some(-150), Some(115));
        let projection = engine.compute_projection(&market, &HistoricalContext::empty()).unwrap();

        let (p_no_td, _) = vig_free_probability(-150, 115, Side::Under).unwrap();
        let lambda = -p_no_td.ln();
        assert!((projection.mean_outcome - lambda * 0.89).abs() < 1e-5);
        assert!((projection.adjustment - 0.89).abs() < 1e-12);
        assert_eq!(projection.distribution_family, DistributionFamily::Poisson);
    }

    #[test]
    fn test_gamma_projection_uses_historical_scale() {
        let engine = engine();
        let context = context(&engine);
        let market = MarketLine::new("Bijan Robinson", Position::RB, StatCategory::RushYards, 72.5, Some(-115), Some(-105));
        let projection = engine.compute_projection(&market, &context).unwrap();

        let DistributionParams::Gamma { shape, scale } = projection.parameters else {
            panic!("expected gamma parameters");
        };
        assert_eq!(scale, context.gamma_scale(Position::RB, StatCategory::RushYards).unwrap());
        assert!((gamma_cdf(72.5, shape, scale) - projection.fair_probability).abs() < 1e-8);
        assert!(projection.bonus_probability.unwrap() > 0.0);
    }

    #[test]
    fn test_normal_projection_matches_over_probability() {
        let engine = engine();
        let context = context(&engine);
        let market = MarketLine::new("Joe Burrow", Position::QB, StatCategory::PassYards, 265.5, Some(-112), Some(-108));
        let projection = engine.compute_projection(&market, &context).unwrap();

        let DistributionParams::Normal { mean, sigma } = projection.parameters else {
            panic!("expected normal parameters");
        };
        let p_over = 1.0 - normal_cdf(265.5, mean, sigma);
        assert!((p_over - projection.fair_probability).abs() < 1e-8);
        assert!(mean > 265.5);
    }

    #[test]
    fn test_line_fraction_normal_uses_closed_form() {
        let mut config = ModelConfig::default();
        if let Some(rec_yards) = config.categories.get_mut(&StatCategory::RecYards) {
            rec_yards.family = DistributionFamily::Normal;
            rec_yards.side = Side::Over;
            rec_yards.normal_sigma = NormalSigma::LineFraction { fraction: 0.25 };
            rec_yards.bonus_threshold = Some(100.0);
        }
        let engine = ProjectionEngine::new(config).unwrap();
        let market = MarketLine::new("Ja'Marr Chase", Position::WR, StatCategory::RecYards, 80.0, Some(-120), Some(100));
        let projection = engine.compute_projection(&market, &HistoricalContext::empty()).unwrap();

        let DistributionParams::Normal { mean, sigma } = projection.parameters else {
            panic!("expected normal parameters");
        };
        assert_eq!(sigma, 20.0);
        let expected = find_normal_mean(80.0, 1.0 - projection.fair_probability, 20.0).unwrap();
        assert!((mean - expected).abs() < 1e-12);
        let tail = 1.0 - normal_cdf(100.0, mean, sigma);
        assert!((projection.bonus_probability.unwrap() - tail).abs() < 1e-12);
    }

    #[test]
    fn test_missing_history_fails_only_that_market() {
        let engine = engine();
        let context = context(&engine);
        let markets = vec![
            MarketLine::new("Travis Kelce", Position::TE, StatCategory::RecYards, 55.5, Some(-110), Some(-110)),
            MarketLine::new("Travis Kelce", Position::TE, StatCategory::Receptions, 5.5, Some(-125), Some(105)),
            MarketLine::new("Travis Kelce", Position::TE, StatCategory::AnytimeTd, 0.5, Some(140), None),
        ];
        let evaluations = engine.evaluate_markets(&markets, &context);

        assert_eq!(evaluations.len(), 3);
        assert!(matches!(
            evaluations[0].projection,
            Err(ProjectionError::InsufficientHistory { .. })
        ));
        assert!(evaluations[1].is_ok());
        assert!(matches!(evaluations[2].projection, Err(ProjectionError::InvalidOdds(_))));
    }

    #[test]
    fn test_project_players_sorted_by_total() {
        let engine = engine();
        let context = context(&engine);
        let markets = vec![
            MarketLine::new("Puka Nacua", Position::WR, StatCategory::Receptions, 6.5, Some(-120), Some(100)),
            MarketLine::new("Puka Nacua", Position::WR, StatCategory::RecYards, 80.5, Some(-115), Some(-105)),
            MarketLine::new("Puka Nacua", Position::WR, StatCategory::AnytimeTd, 0.5, Some(120), Some(-145)),
            MarketLine::new("Jakobi Meyers", Position::WR, StatCategory::Receptions, 3.5, Some(-105), Some(-115)),
        ];
        let evaluations = engine.evaluate_markets(&markets, &context);
        let players = engine.project_players(&evaluations, "ppr").unwrap();

        assert_eq!(players.len(), 2);
        assert_eq!(players[0].player_id, "Puka Nacua");
        assert!(players[0].completeness_flag);
        assert!(!players[1].completeness_flag);
        assert!(players[0].fpts_total > players[1].fpts_total);
    }

    #[test]
    fn test_unknown_scoring_system() {
        let engine = engine();
        assert!(matches!(
            engine.project_players(&[], "six_pt_pass"),
            Err(ModelError::UnknownScoringSystem(_))
        ));
    }

    #[test]
    fn test_method_of_moments_context() {
        let mut config = ModelConfig::default();
        config.gamma_fit = GammaFitMethod::MethodOfMoments;
        let engine = ProjectionEngine::new(config).unwrap();
        let context = context(&engine);
        assert!(context.gamma_scale(Position::WR, StatCategory::RecYards).is_ok());
    }
}
