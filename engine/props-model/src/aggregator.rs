//! Per-player fantasy point aggregation

use std::collections::BTreeMap;
use tracing::debug;

use crate::config::ScoringWeights;
use crate::models::{
    CategoryContribution, MarketEvaluation, PlayerFantasyProjection, Position, Projection,
    StatCategory,
};

/// Combine one player's market evaluations into a fantasy total.
///
/// `fpts = sum(mean * weight) + sum(bonus_probability * bonus_value)`.
/// Alternate lines for the same category are averaged, failed categories
/// are reported instead of being dropped, and the projection is complete
/// only when every category in `required` produced a projection.
pub fn aggregate_player_fpts<'a, I>(
    player_id: &str,
    position: Position,
    evaluations: I,
    scoring_system: &str,
    weights: &ScoringWeights,
    required: &[StatCategory],
) -> PlayerFantasyProjection
where
    I: IntoIterator<Item = &'a MarketEvaluation>,
{
    let mut projected: BTreeMap<StatCategory, Vec<&Projection>> = BTreeMap::new();
    let mut errors: BTreeMap<StatCategory, String> = BTreeMap::new();

    for evaluation in evaluations {
        match &evaluation.projection {
            Ok(projection) => projected.entry(evaluation.stat_category).or_default().push(projection),
            Err(e) => {
                errors.insert(evaluation.stat_category, e.to_string());
            }
        }
    }

    let mut category_breakdown = BTreeMap::new();
    let mut zero_weighted_categories = Vec::new();
    let mut fpts_total = 0.0;

    for (category, projections) in &projected {
        let count = projections.len() as f64;
        let mean_outcome = projections.iter().map(|p| p.mean_outcome).sum::<f64>() / count;

        let bonus_samples: Vec<f64> = projections.iter().filter_map(|p| p.bonus_probability).collect();
        let bonus_probability = if bonus_samples.is_empty() {
            None
        } else {
            Some(bonus_samples.iter().sum::<f64>() / bonus_samples.len() as f64)
        };

        let weight = match weights.weight(*category) {
            Some(weight) => weight,
            None => {
                zero_weighted_categories.push(*category);
                0.0
            }
        };
        let bonus_value = weights.bonus_value(*category);
        let points = mean_outcome * weight + bonus_probability.unwrap_or(0.0) * bonus_value;
        fpts_total += points;

        category_breakdown.insert(
            *category,
            CategoryContribution {
                mean_outcome,
                weight,
                bonus_probability,
                bonus_value,
                points,
            },
        );
    }

    // A category only counts as failed when no alternate line succeeded
    let failed_categories: BTreeMap<StatCategory, String> = errors
        .into_iter()
        .filter(|(category, _)| !projected.contains_key(category))
        .collect();

    let missing_categories: Vec<StatCategory> = required
        .iter()
        .copied()
        .filter(|category| !projected.contains_key(category))
        .collect();

    debug!(
        "{} ({}) {}: {:.2} fpts, {} categories, missing {:?}",
        player_id,
        position,
        scoring_system,
        fpts_total,
        category_breakdown.len(),
        missing_categories
    );

    PlayerFantasyProjection {
        player_id: player_id.to_string(),
        position,
        scoring_system: scoring_system.to_string(),
        fpts_total,
        category_breakdown,
        completeness_flag: missing_categories.is_empty(),
        missing_categories,
        failed_categories,
        zero_weighted_categories,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::error::ProjectionError;
    use crate::models::{DistributionFamily, DistributionParams};

    fn evaluation(category: StatCategory, mean: f64, bonus: Option<f64>) -> MarketEvaluation {
        MarketEvaluation {
            player_id: "Josh Allen".to_string(),
            position: Position::QB,
            stat_category: category,
            projection: Ok(Projection {
                player_id: "Josh Allen".to_string(),
                position: Position::QB,
                stat_category: category,
                distribution_family: DistributionFamily::Poisson,
                mean_outcome: mean,
                bonus_probability: bonus,
                fair_probability: 0.5,
                vig: 0.05,
                line: mean,
                adjustment: 1.0,
                parameters: DistributionParams::Poisson { lambda: mean },
            }),
        }
    }

    fn failure(category: StatCategory) -> MarketEvaluation {
        MarketEvaluation {
            player_id: "Josh Allen".to_string(),
            position: Position::QB,
            stat_category: category,
            projection: Err(ProjectionError::convergence("no root")),
        }
    }

    #[test]
    fn test_qb_missing_interceptions_is_incomplete() {
        let config = ModelConfig::default();
        let evaluations = vec![
            evaluation(StatCategory::PassYards, 260.0, Some(0.3)),
            evaluation(StatCategory::PassTds, 1.9, None),
            evaluation(StatCategory::RushYards, 35.0, Some(0.02)),
            evaluation(StatCategory::AnytimeTd, 0.45, None),
        ];
        let result = aggregate_player_fpts(
            "Josh Allen",
            Position::QB,
            &evaluations,
            "ppr",
            config.scoring("ppr").unwrap(),
            config.required_for(Position::QB),
        );

        assert!(!result.completeness_flag);
        assert_eq!(result.missing_categories, vec![StatCategory::Interceptions]);
        let expected = 260.0 * 0.04 + 1.9 * 4.0 + 35.0 * 0.1 + 0.45 * 6.0;
        assert!((result.fpts_total - expected).abs() < 1e-9);
    }

    #[test]
    fn test_bonus_scaled_by_probability() {
        let config = ModelConfig::default();
        let evaluations = vec![evaluation(StatCategory::PassYards, 260.0, Some(0.3))];
        let result = aggregate_player_fpts(
            "Josh Allen",
            Position::QB,
            &evaluations,
            "dk_classic",
            config.scoring("dk_classic").unwrap(),
            &[],
        );
        let contribution = &result.category_breakdown[&StatCategory::PassYards];
        assert!((contribution.points - (260.0 * 0.04 + 0.3 * 3.0)).abs() < 1e-12);
        assert!(result.completeness_flag);
    }

    #[test]
    fn test_failures_and_zero_weights_are_reported() {
        let config = ModelConfig::default();
        let evaluations = vec![
            failure(StatCategory::Interceptions),
            evaluation(StatCategory::RushTds, 0.3, None),
            failure(StatCategory::PassTds),
            evaluation(StatCategory::PassTds, 2.0, None),
        ];
        let result = aggregate_player_fpts(
            "Josh Allen",
            Position::QB,
            &evaluations,
            "standard",
            config.scoring("standard").unwrap(),
            config.required_for(Position::QB),
        );

        assert!(result.failed_categories.contains_key(&StatCategory::Interceptions));
        // PassTds has a successful alternate line
        assert!(!result.failed_categories.contains_key(&StatCategory::PassTds));
        assert!(result.missing_categories.contains(&StatCategory::Interceptions));
        assert_eq!(result.zero_weighted_categories, vec![StatCategory::RushTds]);
        assert_eq!(result.category_breakdown[&StatCategory::RushTds].points, 0.0);
    }

    #[test]
    fn test_duplicate_lines_are_averaged() {
        let config = ModelConfig::default();
        let evaluations = vec![
            evaluation(StatCategory::Receptions, 4.0, None),
            evaluation(StatCategory::Receptions, 5.0, None),
        ];
        let result = aggregate_player_fpts(
            "Josh Allen",
            Position::QB,
            &evaluations,
            "half_ppr",
            config.scoring("half_ppr").unwrap(),
            &[],
        );
        assert!((result.fpts_total - 2.25).abs() < 1e-12);
        assert!((result.display_fpts() - 2.3).abs() < 1e-12);
    }
}
