//! Distribution solvers: turn one vig-free probability at a line into the
//! parameters of a fitted distribution.

pub mod gamma;
pub mod normal;
pub mod poisson;
pub mod solver;
pub mod special;

pub use gamma::{fit_gamma_scale, gamma_mean_from_market, GammaFit, GammaSolution};
pub use normal::{evaluate_normal_distribution, find_normal_mean, fit_normal, NormalFit};
pub use poisson::poisson_mean_from_market;
