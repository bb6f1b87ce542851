use chrono::{DateTime, Utc};
use props_model::odds::probability_to_american;
use props_model::{MarketEvaluation, MarketLine};
use serde::{Deserialize, Serialize};
use std::fmt;

/// DraftKings event-group response for one subcategory
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DkResponse {
    #[serde(rename = "eventGroup")]
    pub event_group: EventGroup,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EventGroup {
    #[serde(rename = "eventGroupId", default)]
    pub event_group_id: Option<DkId>,

    #[serde(rename = "offerCategories", default)]
    pub offer_categories: Vec<OfferCategory>,

    #[serde(rename = "events", default)]
    pub events: Vec<DkEvent>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OfferCategory {
    #[serde(rename = "offerCategoryId", default)]
    pub offer_category_id: Option<DkId>,

    #[serde(rename = "name", default)]
    pub name: Option<String>,

    #[serde(rename = "offerSubcategoryDescriptors", default)]
    pub offer_subcategory_descriptors: Vec<SubcategoryDescriptor>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SubcategoryDescriptor {
    #[serde(rename = "subcategoryId", default)]
    pub subcategory_id: Option<DkId>,

    #[serde(rename = "name", default)]
    pub name: Option<String>,

    /// Only present for the subcategory that was requested
    #[serde(rename = "offerSubcategory", default)]
    pub offer_subcategory: Option<OfferSubcategory>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OfferSubcategory {
    #[serde(rename = "name")]
    pub name: String,

    #[serde(rename = "subcategoryId", default)]
    pub subcategory_id: Option<DkId>,

    /// Offers arrive in batches
    #[serde(rename = "offers", default)]
    pub offers: Vec<Vec<Offer>>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Offer {
    #[serde(rename = "label", default)]
    pub label: Option<String>,

    #[serde(rename = "providerOfferId", default)]
    pub provider_offer_id: Option<DkId>,

    #[serde(rename = "eventId", default)]
    pub event_id: Option<DkId>,

    #[serde(rename = "playerNameIdentifier", default)]
    pub player_name_identifier: Option<String>,

    #[serde(rename = "outcomes", default)]
    pub outcomes: Vec<Outcome>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Outcome {
    #[serde(rename = "label")]
    pub label: String,

    /// Signed price as text, e.g. "+115" or "\u{2212}140"
    #[serde(rename = "oddsAmerican", default)]
    pub odds_american: Option<String>,

    #[serde(rename = "oddsDecimal", default)]
    pub odds_decimal: Option<f64>,

    #[serde(rename = "line", default)]
    pub line: Option<f64>,

    #[serde(rename = "participant", default)]
    pub participant: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DkEvent {
    #[serde(rename = "eventId")]
    pub event_id: DkId,

    #[serde(rename = "name", default)]
    pub name: Option<String>,

    #[serde(rename = "startDate", default)]
    pub start_date: Option<String>,
}

/// DraftKings ids show up both as numbers and as strings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum DkId {
    Number(i64),
    Text(String),
}

impl fmt::Display for DkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DkId::Number(n) => write!(f, "{}", n),
            DkId::Text(s) => f.write_str(s),
        }
    }
}

/// One parsed over/under offer, as written to snapshots and `fact_dk_offers`
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PropOffer {
    pub subcategory_id: Option<String>,
    pub subcategory_name: String,
    pub offer_label: Option<String>,
    pub provider_offer_id: Option<String>,
    pub event_id: Option<String>,
    pub event_name: Option<String>,
    pub participant: String,
    pub line: f64,
    pub over_odds: Option<i32>,
    pub under_odds: Option<i32>,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of one market line, as written to `fact_prop_market_evaluations`.
/// Exactly one of `mean_outcome` and `error_kind` is set.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct MarketEvaluationRow {
    pub player_id: String,
    pub position: String,
    pub stat_category: String,
    pub line: f64,
    pub over_odds: Option<i32>,
    pub under_odds: Option<i32>,
    pub mean_outcome: Option<f64>,
    pub fair_probability: Option<f64>,
    /// Vig-free probability quoted back as American odds
    pub fair_odds: Option<i32>,
    pub bonus_probability: Option<f64>,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
}

impl MarketEvaluationRow {
    pub fn new(line: &MarketLine, evaluation: &MarketEvaluation) -> Self {
        let mut row = Self {
            player_id: evaluation.player_id.clone(),
            position: evaluation.position.as_str().to_string(),
            stat_category: evaluation.stat_category.as_str().to_string(),
            line: line.line,
            over_odds: line.over_odds,
            under_odds: line.under_odds,
            mean_outcome: None,
            fair_probability: None,
            fair_odds: None,
            bonus_probability: None,
            error_kind: None,
            error_message: None,
        };

        match &evaluation.projection {
            Ok(projection) => {
                row.mean_outcome = Some(projection.mean_outcome);
                row.fair_probability = Some(projection.fair_probability);
                row.fair_odds = probability_to_american(projection.fair_probability).ok();
                row.bonus_probability = projection.bonus_probability;
            }
            Err(e) => {
                row.error_kind = Some(e.kind().to_string());
                row.error_message = Some(e.to_string());
            }
        }
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use props_model::{HistoricalContext, ModelConfig, Position, ProjectionEngine, StatCategory};

    #[test]
    fn test_evaluation_rows_separate_success_and_failure() {
        let engine = ProjectionEngine::new(ModelConfig::default()).unwrap();
        let lines = vec![
            MarketLine::new("Amon-Ra St. Brown", Position::WR, StatCategory::Receptions, 6.5, Some(-130), Some(110)),
            MarketLine::new("Amon-Ra St. Brown", Position::WR, StatCategory::AnytimeTd, 0.5, Some(-110), None),
        ];
        let evaluations = engine.evaluate_markets(&lines, &HistoricalContext::empty());

        let solved = MarketEvaluationRow::new(&lines[0], &evaluations[0]);
        assert_eq!(solved.stat_category, "receptions");
        assert_eq!(solved.position, "WR");
        assert!(solved.mean_outcome.unwrap() > 5.0);
        assert!(solved.fair_odds.is_some());
        assert_eq!(solved.error_kind, None);

        let failed = MarketEvaluationRow::new(&lines[1], &evaluations[1]);
        assert_eq!(failed.mean_outcome, None);
        assert_eq!(failed.fair_odds, None);
        assert_eq!(failed.error_kind.as_deref(), Some("invalid_odds"));
        assert_eq!(failed.over_odds, Some(-110));
    }
}
