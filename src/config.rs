use crate::error::{BacktestError, Result};
use crate::param_utils::{get_param, get_param_bool};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Risk controls applied to every entry. Fully enumerated so a run can be
/// validated once at start instead of probing a loose parameter map mid-loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskConfig {
    /// Fraction of current capital risked per trade, in (0, 1].
    pub risk_pct: f64,
    /// Stop-loss distance as a fraction of entry price.
    pub stop_pct: f64,
    /// Take-profit distance as a fraction of entry price.
    pub target_pct: f64,
    /// Flat commission rate charged on the notional of each leg.
    pub commission_rate: f64,
    pub allow_long: bool,
    pub allow_short: bool,
    /// Cap on position notional as a fraction of capital, in (0, 1].
    pub max_position_fraction: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_pct: 0.02,
            stop_pct: 0.05,
            target_pct: 0.10,
            commission_rate: 0.001,
            allow_long: true,
            allow_short: false,
            max_position_fraction: 0.10,
        }
    }
}

impl RiskConfig {
    /// Build from a camelCase parameter map, falling back to defaults.
    pub fn from_parameters(parameters: &HashMap<String, f64>) -> Self {
        let defaults = Self::default();
        Self {
            risk_pct: get_param(parameters, "riskPct", defaults.risk_pct),
            stop_pct: get_param(parameters, "stopPct", defaults.stop_pct),
            target_pct: get_param(parameters, "targetPct", defaults.target_pct),
            commission_rate: get_param(parameters, "commissionRate", defaults.commission_rate),
            allow_long: get_param_bool(parameters, "allowLong", defaults.allow_long),
            allow_short: get_param_bool(parameters, "allowShort", defaults.allow_short),
            max_position_fraction: get_param(
                parameters,
                "maxPositionFraction",
                defaults.max_position_fraction,
            ),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.risk_pct.is_finite() || self.risk_pct <= 0.0 || self.risk_pct > 1.0 {
            return Err(BacktestError::InvalidRiskParameters(format!(
                "riskPct must be in (0, 1] (value: {})",
                self.risk_pct
            )));
        }
        if !self.stop_pct.is_finite() || self.stop_pct <= 0.0 || self.stop_pct >= 1.0 {
            return Err(BacktestError::InvalidRiskParameters(format!(
                "stopPct must be in (0, 1) (value: {})",
                self.stop_pct
            )));
        }
        if !self.target_pct.is_finite() || self.target_pct <= 0.0 {
            return Err(BacktestError::InvalidRiskParameters(format!(
                "targetPct must be > 0 (value: {})",
                self.target_pct
            )));
        }
        if !self.commission_rate.is_finite() || self.commission_rate < 0.0 {
            return Err(BacktestError::InvalidRiskParameters(format!(
                "commissionRate must be >= 0 (value: {})",
                self.commission_rate
            )));
        }
        if !self.max_position_fraction.is_finite()
            || self.max_position_fraction <= 0.0
            || self.max_position_fraction > 1.0
        {
            return Err(BacktestError::InvalidRiskParameters(format!(
                "maxPositionFraction must be in (0, 1] (value: {})",
                self.max_position_fraction
            )));
        }
        if !self.allow_long && !self.allow_short {
            return Err(BacktestError::InvalidRiskParameters(
                "at least one of allowLong/allowShort must be enabled".to_string(),
            ));
        }
        Ok(())
    }
}

/// Top-level run configuration grouping capital and the risk controls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestConfig {
    pub initial_capital: f64,
    /// Periods per year for Sharpe annualization; 365*24 suits hourly bars.
    pub annualization_factor: f64,
    pub risk: RiskConfig,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: 10_000.0,
            annualization_factor: 365.0 * 24.0,
            risk: RiskConfig::default(),
        }
    }
}

impl BacktestConfig {
    pub fn from_parameters(parameters: &HashMap<String, f64>) -> Self {
        let defaults = Self::default();
        Self {
            initial_capital: get_param(parameters, "initialCapital", defaults.initial_capital),
            annualization_factor: get_param(
                parameters,
                "annualizationFactor",
                defaults.annualization_factor,
            ),
            risk: RiskConfig::from_parameters(parameters),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(BacktestError::InvalidRiskParameters(format!(
                "initialCapital must be > 0 (value: {})",
                self.initial_capital
            )));
        }
        if !self.annualization_factor.is_finite() || self.annualization_factor <= 0.0 {
            return Err(BacktestError::InvalidRiskParameters(format!(
                "annualizationFactor must be > 0 (value: {})",
                self.annualization_factor
            )));
        }
        self.risk.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(BacktestConfig::default().validate().is_ok());
    }

    #[test]
    fn from_parameters_overrides_defaults() {
        let mut params = HashMap::new();
        params.insert("initialCapital".to_string(), 50_000.0);
        params.insert("riskPct".to_string(), 0.01);
        params.insert("allowShort".to_string(), 1.0);
        let config = BacktestConfig::from_parameters(&params);
        assert_eq!(config.initial_capital, 50_000.0);
        assert_eq!(config.risk.risk_pct, 0.01);
        assert!(config.risk.allow_short);
        assert!(config.risk.allow_long);
    }

    #[test]
    fn rejects_out_of_range_risk_pct() {
        let mut config = RiskConfig::default();
        config.risk_pct = 0.0;
        assert!(matches!(
            config.validate(),
            Err(BacktestError::InvalidRiskParameters(_))
        ));
        config.risk_pct = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_both_sides_disabled() {
        let config = RiskConfig {
            allow_long: false,
            allow_short: false,
            ..RiskConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_negative_commission() {
        let config = RiskConfig {
            commission_rate: -0.001,
            ..RiskConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
