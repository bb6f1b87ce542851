//! American odds conversions and vig removal

use crate::error::ProjectionError;
use crate::models::Side;

type Result<T> = std::result::Result<T, ProjectionError>;

/// Reject zero and the undefined band strictly between -100 and +100
fn validate(american_odds: i32) -> Result<()> {
    if american_odds == 0 {
        return Err(ProjectionError::invalid_odds("american odds of 0 are undefined"));
    }
    if american_odds.abs() < 100 {
        return Err(ProjectionError::invalid_odds(format!(
            "american odds {american_odds} fall inside (-100, 100)"
        )));
    }
    Ok(())
}

/// Convert American odds to the implied probability of the event.
///
/// Positive odds (+150) pay $150 on a $100 stake, negative odds (-150)
/// need a $150 stake to win $100.
pub fn implied_probability(american_odds: i32) -> Result<f64> {
    validate(american_odds)?;
    let odds = american_odds as f64;
    if odds > 0.0 {
        Ok(100.0 / (odds + 100.0))
    } else {
        Ok(-odds / (-odds + 100.0))
    }
}

/// Convert American odds to decimal odds (total return per unit staked)
pub fn decimal_odds(american_odds: i32) -> Result<f64> {
    validate(american_odds)?;
    let magnitude = american_odds.unsigned_abs() as f64;
    if american_odds > 0 {
        Ok(magnitude / 100.0 + 1.0)
    } else {
        Ok(100.0 / magnitude + 1.0)
    }
}

/// Remove the bookmaker's overround from a two-way market.
///
/// Returns the fair probability of the requested side together with the vig
/// (`p_over + p_under - 1` on the raw implied probabilities). The two fair
/// probabilities always sum to one.
pub fn vig_free_probability(over_odds: i32, under_odds: i32, side: Side) -> Result<(f64, f64)> {
    let p_over = 1.0 / decimal_odds(over_odds)?;
    let p_under = 1.0 / decimal_odds(under_odds)?;
    let booksum = p_over + p_under;
    let vig = booksum - 1.0;

    let fair = match side {
        Side::Over => p_over / booksum,
        Side::Under => p_under / booksum,
    };
    Ok((fair, vig))
}

/// Fair American price for a probability
pub fn probability_to_american(probability: f64) -> Result<i32> {
    if !(probability > 0.0 && probability < 1.0) {
        return Err(ProjectionError::invalid_odds(format!(
            "probability {probability} has no american price"
        )));
    }
    let price = if probability >= 0.5 {
        -(probability / (1.0 - probability)) * 100.0
    } else {
        ((1.0 - probability) / probability) * 100.0
    };
    Ok(price.round() as i32)
}
