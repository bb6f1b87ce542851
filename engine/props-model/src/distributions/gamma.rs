use serde::{Deserialize, Serialize};

use super::solver::{brent_root, expand_bracket};
use super::special::{digamma, gamma_cdf, trigamma};
use crate::config::{GammaFitMethod, SolverConfig};
use crate::error::ProjectionError;
use crate::models::HistoricalSample;

type Result<T> = std::result::Result<T, ProjectionError>;

/// Yardage threshold reported alongside every Gamma solution
pub const YARDAGE_BONUS_LINE: f64 = 100.0;

/// Smallest shape the market solver will try
const SHAPE_FLOOR: f64 = 1e-8;

const MLE_MAX_ITERATIONS: usize = 100;
const MLE_TOLERANCE: f64 = 1e-12;

/// Gamma parameters fitted to a historical sample (location fixed at 0)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GammaFit {
    pub shape: f64,
    pub scale: f64,
}

/// Fit shape and scale to the positive values of a sample.
///
/// Zeros are dropped: weeks without a single attempt say nothing about the
/// size of a positive yardage outcome.
pub fn fit_gamma_scale(sample: &HistoricalSample, method: GammaFitMethod) -> Result<GammaFit> {
    let positive: Vec<f64> = sample.values().iter().copied().filter(|v| *v > 0.0).collect();
    if positive.len() < 2 {
        return Err(sample.insufficient(format!(
            "gamma fit needs at least 2 positive values, got {}",
            positive.len()
        )));
    }

    let n = positive.len() as f64;
    let mean = positive.iter().sum::<f64>() / n;
    let variance = positive.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    if !(variance > 0.0) {
        return Err(sample.insufficient("positive values have zero spread"));
    }

    let shape = match method {
        GammaFitMethod::MethodOfMoments => mean * mean / variance,
        GammaFitMethod::MaximumLikelihood => {
            let mean_log = positive.iter().map(|v| v.ln()).sum::<f64>() / n;
            let s = mean.ln() - mean_log;
            if !(s > 0.0) {
                return Err(sample.insufficient("positive values have zero spread"));
            }
            mle_shape(s)
        }
    };

    if !(shape.is_finite() && shape > 0.0) {
        return Err(sample.insufficient(format!("gamma fit produced shape {shape}")));
    }

    Ok(GammaFit { shape, scale: mean / shape })
}

/// Solve `ln k - digamma(k) = s` starting from Minka's approximation
fn mle_shape(s: f64) -> f64 {
    let mut k = (3.0 - s + ((s - 3.0).powi(2) + 24.0 * s).sqrt()) / (12.0 * s);
    for _ in 0..MLE_MAX_ITERATIONS {
        let step = (k.ln() - digamma(k) - s) / (1.0 / k - trigamma(k));
        let next = if k - step > 0.0 { k - step } else { k / 2.0 };
        let done = (next - k).abs() <= MLE_TOLERANCE * k;
        k = next;
        if done {
            break;
        }
    }
    k
}

/// Gamma distribution solved from a market line
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GammaSolution {
    pub shape: f64,
    pub scale: f64,
    pub mean: f64,
    /// P(X > 100)
    pub tail_over_100: f64,
}

impl GammaSolution {
    /// P(X > threshold) under the solved distribution
    pub fn tail_probability(&self, threshold: f64) -> f64 {
        1.0 - gamma_cdf(threshold, self.shape, self.scale)
    }
}

/// Solve for the shape that puts `p_less` of the mass below `line` with the
/// scale held at its historical value.
pub fn gamma_mean_from_market(
    line: f64,
    p_less: f64,
    scale: f64,
    solver: &SolverConfig,
) -> Result<GammaSolution> {
    if !(p_less > 0.0 && p_less < 1.0) {
        return Err(ProjectionError::convergence(format!("p_less {p_less} outside (0, 1)")));
    }
    if !(scale > 0.0 && scale.is_finite()) {
        return Err(ProjectionError::convergence(format!("gamma scale {scale} must be positive")));
    }
    if !(line > 0.0) {
        return Err(ProjectionError::convergence(format!("gamma line {line} must be positive")));
    }

    let objective = |shape: f64| gamma_cdf(line, shape, scale) - p_less;
    let (lo, hi) = expand_bracket(objective, 0.5, 2.0, SHAPE_FLOOR, solver.max_bracket_expansions)?;
    let shape = brent_root(objective, lo, hi, solver.tolerance, solver.max_iterations)?;

    let residual = objective(shape).abs();
    if residual > solver.max_residual {
        return Err(ProjectionError::convergence(format!(
            "gamma shape {shape:.4} leaves residual {residual:.2e}"
        )));
    }

    let solution = GammaSolution {
        shape,
        scale,
        mean: shape * scale,
        tail_over_100: 0.0,
    };
    Ok(GammaSolution {
        tail_over_100: solution.tail_probability(YARDAGE_BONUS_LINE),
        ..solution
    })
}
