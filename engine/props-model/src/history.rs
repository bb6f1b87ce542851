//! Historical fits shared by every market of a (position, category) pair

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use crate::config::{GammaFitMethod, NormalSigma};
use crate::dispatch::{CategoryDispatcher, CategorySpec};
use crate::distributions::{fit_gamma_scale, fit_normal, GammaFit, NormalFit};
use crate::error::{ModelError, ProjectionError};
use crate::models::{DistributionFamily, HistoricalSample, Position, StatCategory};

/// Source of past per-week stat values
pub trait HistoricalSource {
    /// Positive weekly values of `field` for players at `position`
    fn weekly_values(&self, position: Position, field: &str) -> Result<Vec<f64>, ModelError>;
}

/// Weekly values held in memory, keyed by position and field name
#[derive(Debug, Clone, Default)]
pub struct InMemoryHistory {
    values: HashMap<(Position, String), Vec<f64>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, position: Position, field: impl Into<String>, values: Vec<f64>) {
        self.values.insert((position, field.into()), values);
    }

    pub fn with(mut self, position: Position, field: impl Into<String>, values: Vec<f64>) -> Self {
        self.insert(position, field, values);
        self
    }
}

impl HistoricalSource for InMemoryHistory {
    fn weekly_values(&self, position: Position, field: &str) -> Result<Vec<f64>, ModelError> {
        Ok(self
            .values
            .get(&(position, field.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

/// Fitted parameters for one (position, category) pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HistoricalFit {
    Normal(NormalFit),
    Gamma(GammaFit),
}

/// Read-only fits computed once per run, before any market is solved
#[derive(Debug, Clone, Default)]
pub struct HistoricalContext {
    fits: BTreeMap<(Position, StatCategory), Result<HistoricalFit, ProjectionError>>,
}

impl HistoricalContext {
    /// Context with no fits; every lookup reports insufficient history
    pub fn empty() -> Self {
        Self::default()
    }

    /// Fetch and fit every (position, category) pair that needs history.
    ///
    /// Source and fit failures are stored against the pair so the markets
    /// that depend on it fail individually.
    pub fn build<S>(dispatcher: &CategoryDispatcher, source: &S, method: GammaFitMethod) -> Self
    where
        S: HistoricalSource + ?Sized,
    {
        let mut context = Self::default();

        for spec in dispatcher.historical_specs().filter(|spec| needs_fit(spec)) {
            let Some(field) = spec.historical_field.as_deref() else {
                continue;
            };
            for position in Position::ALL {
                let fit = source
                    .weekly_values(position, field)
                    .map_err(|e| ProjectionError::InsufficientHistory {
                        position,
                        category: spec.category,
                        reason: e.to_string(),
                    })
                    .and_then(|values| HistoricalSample::new(position, spec.category, values))
                    .and_then(|sample| fit_sample(spec, &sample, method));

                match &fit {
                    Ok(fit) => debug!("Fitted {} {}: {:?}", position, spec.category, fit),
                    Err(e) => warn!("No historical fit for {} {}: {}", position, spec.category, e),
                }
                context.fits.insert((position, spec.category), fit);
            }
        }

        info!(
            "Built historical context: {} of {} fits usable",
            context.fits.values().filter(|f| f.is_ok()).count(),
            context.fits.len()
        );
        context
    }

    /// Fit a sample directly and store the outcome
    pub fn insert_sample(&mut self, spec: &CategorySpec, sample: &HistoricalSample, method: GammaFitMethod) {
        let fit = fit_sample(spec, sample, method);
        self.fits.insert((sample.position, sample.category), fit);
    }

    pub fn fit(&self, position: Position, category: StatCategory) -> Result<HistoricalFit, ProjectionError> {
        match self.fits.get(&(position, category)) {
            Some(fit) => fit.clone(),
            None => Err(ProjectionError::InsufficientHistory {
                position,
                category,
                reason: "no historical fit was built".to_string(),
            }),
        }
    }

    pub fn gamma_scale(&self, position: Position, category: StatCategory) -> Result<f64, ProjectionError> {
        match self.fit(position, category)? {
            HistoricalFit::Gamma(fit) => Ok(fit.scale),
            HistoricalFit::Normal(_) => Err(wrong_family(position, category, "gamma")),
        }
    }

    pub fn normal_fit(&self, position: Position, category: StatCategory) -> Result<NormalFit, ProjectionError> {
        match self.fit(position, category)? {
            HistoricalFit::Normal(fit) => Ok(fit),
            HistoricalFit::Gamma(_) => Err(wrong_family(position, category, "normal")),
        }
    }

    pub fn len(&self) -> usize {
        self.fits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fits.is_empty()
    }
}

fn needs_fit(spec: &CategorySpec) -> bool {
    match spec.family {
        DistributionFamily::Gamma => true,
        DistributionFamily::Normal => spec.normal_sigma == NormalSigma::Historical,
        DistributionFamily::Poisson => false,
    }
}

fn fit_sample(
    spec: &CategorySpec,
    sample: &HistoricalSample,
    method: GammaFitMethod,
) -> Result<HistoricalFit, ProjectionError> {
    match spec.family {
        DistributionFamily::Gamma => fit_gamma_scale(sample, method).map(HistoricalFit::Gamma),
        DistributionFamily::Normal => fit_normal(sample).map(HistoricalFit::Normal),
        DistributionFamily::Poisson => Err(sample.insufficient("poisson categories take no historical fit")),
    }
}

fn wrong_family(position: Position, category: StatCategory, wanted: &str) -> ProjectionError {
    ProjectionError::InsufficientHistory {
        position,
        category,
        reason: format!("stored fit is not a {wanted} fit"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;

    struct FailingSource;

    impl HistoricalSource for FailingSource {
        fn weekly_values(&self, _: Position, _: &str) -> Result<Vec<f64>, ModelError> {
            Err(ModelError::HistoricalSource("connection refused".to_string()))
        }
    }

    fn dispatcher() -> CategoryDispatcher {
        CategoryDispatcher::new(&ModelConfig::default()).unwrap()
    }

    #[test]
    fn test_build_fits_each_pair_once() {
        let source = InMemoryHistory::new()
            .with(Position::RB, "rushing_yards", vec![0.0, 54.0, 81.0, 33.0, 112.0, 67.0])
            .with(Position::QB, "passing_yards", vec![188.0, 244.0, 301.0, 276.0, 215.0]);
        let context = HistoricalContext::build(&dispatcher(), &source, GammaFitMethod::MaximumLikelihood);

        // 3 historical categories x 4 positions
        assert_eq!(context.len(), 12);
        assert!(context.gamma_scale(Position::RB, StatCategory::RushYards).unwrap() > 0.0);
        let fit = context.normal_fit(Position::QB, StatCategory::PassYards).unwrap();
        assert!((fit.mu - 244.8).abs() < 1e-9);
    }

    #[test]
    fn test_empty_sample_is_insufficient() {
        let context = HistoricalContext::build(&dispatcher(), &InMemoryHistory::new(), GammaFitMethod::default());
        assert!(matches!(
            context.gamma_scale(Position::WR, StatCategory::RecYards),
            Err(ProjectionError::InsufficientHistory { .. })
        ));
    }

    #[test]
    fn test_source_failure_is_stored_per_pair() {
        let context = HistoricalContext::build(&dispatcher(), &FailingSource, GammaFitMethod::default());
        match context.gamma_scale(Position::RB, StatCategory::RushYards) {
            Err(ProjectionError::InsufficientHistory { reason, .. }) => {
                assert!(reason.contains("connection refused"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_missing_pair_and_wrong_family() {
        let dispatcher = dispatcher();
        let mut context = HistoricalContext::empty();
        assert!(context.normal_fit(Position::QB, StatCategory::PassYards).is_err());

        let spec = dispatcher.spec_for(StatCategory::RecYards).unwrap();
        let sample =
            HistoricalSample::new(Position::WR, StatCategory::RecYards, vec![12.0, 48.0, 77.0]).unwrap();
        context.insert_sample(spec, &sample, GammaFitMethod::MethodOfMoments);
        assert!(context.gamma_scale(Position::WR, StatCategory::RecYards).is_ok());
        assert!(context.normal_fit(Position::WR, StatCategory::RecYards).is_err());
    }
}
