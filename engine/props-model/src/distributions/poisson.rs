use super::solver::minimize_bounded;
use super::special::poisson_cdf;
use crate::config::SolverConfig;
use crate::error::ProjectionError;

/// Poisson rate whose CDF at `line` matches the market probability `p_less`.
///
/// Minimises the squared CDF error over `[0, poisson_lambda_max]` and fails
/// when the best rate still misses the target by more than `max_residual`.
pub fn poisson_mean_from_market(
    line: f64,
    p_less: f64,
    solver: &SolverConfig,
) -> Result<f64, ProjectionError> {
    if !(p_less > 0.0 && p_less < 1.0) {
        return Err(ProjectionError::convergence(format!("p_less {p_less} outside (0, 1)")));
    }
    if !(line >= 0.0) {
        return Err(ProjectionError::convergence(format!("poisson line {line} is negative")));
    }

    let objective = |lambda: f64| (poisson_cdf(line, lambda) - p_less).powi(2);
    let (lambda, _) = minimize_bounded(
        objective,
        0.0,
        solver.poisson_lambda_max,
        solver.tolerance,
        solver.max_iterations,
    )?;

    let residual = (poisson_cdf(line, lambda) - p_less).abs();
    if residual > solver.max_residual {
        return Err(ProjectionError::convergence(format!(
            "best poisson rate {lambda:.4} on [0, {}] misses p={p_less:.4} by {residual:.2e}",
            solver.poisson_lambda_max
        )));
    }

    Ok(lambda)
}
