use crate::error::{BacktestError, Result};
use crate::models::Side;

/// Size a new position so that losing the full stop distance costs
/// `capital * risk_pct`, capped so the notional never exceeds
/// `capital * max_position_fraction`.
pub fn size_position(
    capital: f64,
    entry_price: f64,
    risk_pct: f64,
    stop_distance: f64,
    max_position_fraction: f64,
) -> Result<f64> {
    if !risk_pct.is_finite() || risk_pct <= 0.0 || risk_pct > 1.0 {
        return Err(BacktestError::InvalidRiskParameters(format!(
            "risk_pct must be in (0, 1] (value: {})",
            risk_pct
        )));
    }
    if !stop_distance.is_finite() || stop_distance <= 0.0 {
        return Err(BacktestError::InvalidRiskParameters(format!(
            "stop_distance must be > 0 (value: {})",
            stop_distance
        )));
    }
    if !entry_price.is_finite() || entry_price <= 0.0 {
        return Err(BacktestError::InvalidRiskParameters(format!(
            "entry_price must be > 0 (value: {})",
            entry_price
        )));
    }
    if !capital.is_finite() || capital <= 0.0 {
        return Err(BacktestError::InvalidRiskParameters(format!(
            "capital must be > 0 (value: {})",
            capital
        )));
    }

    let risk_based = (capital * risk_pct) / stop_distance;
    let max_notional = capital * max_position_fraction;
    let cap_based = max_notional / entry_price;
    Ok(risk_based.min(cap_based))
}

/// Absolute stop-loss and take-profit prices from fractional offsets.
/// Long: stop below entry, target above; mirrored for short.
pub fn protective_levels(entry_price: f64, side: Side, stop_pct: f64, target_pct: f64) -> (f64, f64) {
    match side {
        Side::Long => (
            entry_price * (1.0 - stop_pct),
            entry_price * (1.0 + target_pct),
        ),
        Side::Short => (
            entry_price * (1.0 + stop_pct),
            entry_price * (1.0 - target_pct),
        ),
    }
}
