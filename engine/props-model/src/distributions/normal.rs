use serde::{Deserialize, Serialize};

use super::solver::{brent_root, expand_bracket};
use super::special::{normal_cdf, probit};
use crate::config::SolverConfig;
use crate::error::ProjectionError;
use crate::models::HistoricalSample;

type Result<T> = std::result::Result<T, ProjectionError>;

/// Passing-yards bonus line used when no threshold is configured
pub const DEFAULT_TAIL_THRESHOLD: f64 = 300.0;

/// Maximum-likelihood Normal parameters of a historical sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalFit {
    pub mu: f64,
    pub sigma: f64,
}

/// Fit a Normal by maximum likelihood (population standard deviation)
pub fn fit_normal(sample: &HistoricalSample) -> Result<NormalFit> {
    let values = sample.values();
    if values.len() < 2 {
        return Err(sample.insufficient(format!(
            "normal fit needs at least 2 values, got {}",
            values.len()
        )));
    }

    let n = values.len() as f64;
    let mu = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / n;
    let sigma = variance.sqrt();
    if !(sigma > 0.0) {
        return Err(sample.insufficient("sample has zero spread"));
    }

    Ok(NormalFit { mu, sigma })
}

fn check_probability(p: f64, what: &str) -> Result<()> {
    if p > 0.0 && p < 1.0 {
        Ok(())
    } else {
        Err(ProjectionError::convergence(format!("{what} {p} outside (0, 1)")))
    }
}

fn check_sigma(sigma: f64) -> Result<()> {
    if sigma > 0.0 && sigma.is_finite() {
        Ok(())
    } else {
        Err(ProjectionError::convergence(format!("normal sigma {sigma} must be positive")))
    }
}

/// Mean of a Normal with known sigma whose CDF at `line` equals `p_less`
pub fn find_normal_mean(line: f64, p_less: f64, sigma: f64) -> Result<f64> {
    check_probability(p_less, "p_less")?;
    check_sigma(sigma)?;
    Ok(line - sigma * probit(p_less))
}

/// Solve `cdf(x; mean, sigma) = 1 - p_over` for the mean, starting from
/// `mu_prior`, and report `P(X > threshold)` under the solved Normal.
pub fn evaluate_normal_distribution(
    mu_prior: f64,
    sigma: f64,
    x: f64,
    p_over: f64,
    threshold: f64,
    solver: &SolverConfig,
) -> Result<(f64, f64)> {
    check_probability(p_over, "p_over")?;
    check_sigma(sigma)?;

    let target = 1.0 - p_over;
    let objective = |mean: f64| normal_cdf(x, mean, sigma) - target;

    let (lo, hi) = expand_bracket(
        objective,
        mu_prior - sigma,
        mu_prior + sigma,
        f64::NEG_INFINITY,
        solver.max_bracket_expansions,
    )?;
    let mean = brent_root(objective, lo, hi, solver.tolerance, solver.max_iterations)?;

    let residual = objective(mean).abs();
    if residual > solver.max_residual {
        return Err(ProjectionError::convergence(format!(
            "normal mean {mean:.4} leaves residual {residual:.2e}"
        )));
    }

    let tail = 1.0 - normal_cdf(threshold, mean, sigma);
    Ok((mean, tail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Position, StatCategory};

    fn sample(values: Vec<f64>) -> HistoricalSample {
        HistoricalSample::new(Position::QB, StatCategory::PassYards, values).unwrap()
    }

    #[test]
    fn test_find_normal_mean_round_trip() {
        let mean = find_normal_mean(250.0, 0.45, 62.5).unwrap();
        assert!(mean > 250.0);
        assert!((normal_cdf(250.0, mean, 62.5) - 0.45).abs() < 1e-9);
    }

    #[test]
    fn test_find_normal_mean_rejects_degenerate_input() {
        assert!(matches!(
            find_normal_mean(250.0, 1.0, 62.5),
            Err(ProjectionError::SolverConvergence(_))
        ));
        assert!(find_normal_mean(250.0, 0.5, 0.0).is_err());
    }

    #[test]
    fn test_evaluate_normal_matches_closed_form() {
        let solver = SolverConfig::default();
        let (mean, tail) =
            evaluate_normal_distribution(200.0, 70.0, 249.5, 0.55, DEFAULT_TAIL_THRESHOLD, &solver)
                .unwrap();
        let closed_form = find_normal_mean(249.5, 0.45, 70.0).unwrap();
        assert!((mean - closed_form).abs() < 1e-6);
        assert!(tail > 0.0 && tail < 0.5);
    }

    #[test]
    fn test_evaluate_normal_far_prior() {
        // A prior far from the answer still brackets
        let solver = SolverConfig::default();
        let (mean, _) =
            evaluate_normal_distribution(0.0, 10.0, 300.0, 0.5, 300.0, &solver).unwrap();
        assert!((mean - 300.0).abs() < 1e-6);
    }

    #[test]
    fn test_fit_normal() {
        let fit = fit_normal(&sample(vec![200.0, 250.0, 300.0])).unwrap();
        assert!((fit.mu - 250.0).abs() < 1e-12);
        assert!((fit.sigma - (5000.0f64 / 3.0).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_fit_normal_insufficient_history() {
        assert!(matches!(
            fit_normal(&sample(vec![])),
            Err(ProjectionError::InsufficientHistory { .. })
        ));
        assert!(matches!(
            fit_normal(&sample(vec![240.0, 240.0, 240.0])),
            Err(ProjectionError::InsufficientHistory { .. })
        ));
    }
}
