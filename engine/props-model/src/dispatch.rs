//! Stat category dispatch table

use std::collections::{BTreeMap, HashMap};

use crate::config::{Adjustment, ModelConfig, NormalSigma};
use crate::error::{ModelError, ProjectionError, Result};
use crate::models::{DistributionFamily, Side, StatCategory};

/// Resolved modelling rules for one stat category
#[derive(Debug, Clone, PartialEq)]
pub struct CategorySpec {
    pub category: StatCategory,
    pub family: DistributionFamily,
    pub side: Side,
    pub historical_field: Option<String>,
    pub normal_sigma: NormalSigma,
    pub adjustment: Option<Adjustment>,
    pub bonus_threshold: Option<f64>,
    pub labels: Vec<String>,
}

impl CategorySpec {
    /// Multiplier applied to the solved mean
    pub fn adjustment_factor(&self) -> f64 {
        self.adjustment.map(|a| a.factor()).unwrap_or(1.0)
    }
}

/// Immutable category table built from a [`ModelConfig`]
#[derive(Debug, Clone)]
pub struct CategoryDispatcher {
    specs: BTreeMap<StatCategory, CategorySpec>,
    labels: HashMap<String, StatCategory>,
}

impl CategoryDispatcher {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        config.validate()?;

        let mut specs = BTreeMap::new();
        let mut labels = HashMap::new();
        for (category, entry) in &config.categories {
            for label in &entry.labels {
                let key = normalize_label(label);
                if let Some(previous) = labels.insert(key, *category) {
                    if previous != *category {
                        return Err(ModelError::InvalidConfig(format!(
                            "label '{label}' maps to both {previous} and {category}"
                        )));
                    }
                }
            }
            specs.insert(
                *category,
                CategorySpec {
                    category: *category,
                    family: entry.family,
                    side: entry.side,
                    historical_field: entry.historical_field.clone(),
                    normal_sigma: entry.normal_sigma,
                    adjustment: entry.adjustment,
                    bonus_threshold: entry.bonus_threshold,
                    labels: entry.labels.clone(),
                },
            );
        }

        Ok(Self { specs, labels })
    }

    pub fn spec_for(&self, category: StatCategory) -> std::result::Result<&CategorySpec, ProjectionError> {
        self.specs
            .get(&category)
            .ok_or_else(|| ProjectionError::unsupported(format!("no dispatch entry for {category}")))
    }

    /// Map a DraftKings subcategory label onto the taxonomy (case-insensitive)
    pub fn category_for_label(&self, label: &str) -> std::result::Result<StatCategory, ProjectionError> {
        self.labels
            .get(&normalize_label(label))
            .copied()
            .ok_or_else(|| ProjectionError::unsupported(format!("unknown market label '{label}'")))
    }

    /// Specs that need a historical fit
    pub fn historical_specs(&self) -> impl Iterator<Item = &CategorySpec> {
        self.specs.values().filter(|spec| spec.historical_field.is_some())
    }

    pub fn specs(&self) -> impl Iterator<Item = &CategorySpec> {
        self.specs.values()
    }
}

fn normalize_label(label: &str) -> String {
    label.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CategoryConfig;

    fn dispatcher() -> CategoryDispatcher {
        CategoryDispatcher::new(&ModelConfig::default()).unwrap()
    }

    #[test]
    fn test_every_default_label_resolves() {
        let dispatcher = dispatcher();
        let expected = [
            ("TD Scorer", StatCategory::AnytimeTd),
            ("Receptions", StatCategory::Receptions),
            ("Receptions O/U", StatCategory::Receptions),
            ("Pass Yards O/U", StatCategory::PassYards),
            ("Pass TDs O/U", StatCategory::PassTds),
            ("Interceptions O/U", StatCategory::Interceptions),
            ("Rush Yards O/U", StatCategory::RushYards),
            ("Rushing TDs O/U", StatCategory::RushTds),
            ("Rec Yards O/U", StatCategory::RecYards),
        ];
        for (label, category) in expected {
            assert_eq!(dispatcher.category_for_label(label).unwrap(), category, "{label}");
        }
        assert_eq!(
            dispatcher.category_for_label("  rush  yards o/u ").unwrap(),
            StatCategory::RushYards
        );
    }

    #[test]
    fn test_unknown_label_is_unsupported() {
        let result = dispatcher().category_for_label("Longest Reception O/U");
        assert!(matches!(result, Err(ProjectionError::UnsupportedCategory(_))));
    }

    #[test]
    fn test_spec_lookup() {
        let dispatcher = dispatcher();
        let spec = dispatcher.spec_for(StatCategory::RecYards).unwrap();
        assert_eq!(spec.family, DistributionFamily::Gamma);
        assert_eq!(spec.side, Side::Under);
        assert_eq!(spec.historical_field.as_deref(), Some("receiving_yards"));

        let td = dispatcher.spec_for(StatCategory::AnytimeTd).unwrap();
        assert!((td.adjustment_factor() - 0.89).abs() < 1e-12);
        assert_eq!(dispatcher.spec_for(StatCategory::Receptions).unwrap().adjustment_factor(), 1.0);
    }

    #[test]
    fn test_missing_category_is_unsupported() {
        let mut config = ModelConfig::default();
        config.categories.remove(&StatCategory::RushTds);
        let dispatcher = CategoryDispatcher::new(&config).unwrap();
        assert!(matches!(
            dispatcher.spec_for(StatCategory::RushTds),
            Err(ProjectionError::UnsupportedCategory(_))
        ));
    }

    #[test]
    fn test_conflicting_labels_rejected() {
        let mut config = ModelConfig::default();
        let duplicate: CategoryConfig = config.categories[&StatCategory::PassTds].clone();
        let entry = config.categories.get_mut(&StatCategory::RushTds).unwrap();
        entry.labels = duplicate.labels;
        assert!(CategoryDispatcher::new(&config).is_err());
    }

    #[test]
    fn test_historical_specs() {
        let dispatcher = dispatcher();
        let mut fields: Vec<_> = dispatcher
            .historical_specs()
            .filter_map(|s| s.historical_field.clone())
            .collect();
        fields.sort();
        assert_eq!(fields, vec!["passing_yards", "receiving_yards", "rushing_yards"]);
    }
}
