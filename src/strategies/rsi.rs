use crate::indicators::rsi_at;
use crate::models::{Bar, Position};
use crate::param_utils::{get_param, get_param_usize};
use anyhow::Result;
use std::collections::HashMap;

use super::{Decision, Strategy};

/// RSI threshold-cross strategy: buy when the RSI crosses down through the
/// oversold level, sell when it crosses up through the overbought level.
/// Crossing (rather than sitting beyond the level) keeps it from re-firing on
/// every bar of an extended move.
pub struct RsiStrategy {
    period: usize,
    oversold_level: f64,
    overbought_level: f64,
}

impl RsiStrategy {
    pub fn new(parameters: &HashMap<String, f64>) -> Self {
        Self {
            period: get_param_usize(parameters, "period", 14),
            oversold_level: get_param(parameters, "oversoldLevel", 30.0),
            overbought_level: get_param(parameters, "overboughtLevel", 70.0),
        }
    }

    /// RSI at the latest bar and the bar before it, when enough history exists.
    fn rsi_pair(&self, history: &[Bar]) -> Option<(f64, f64)> {
        let last = history.len().checked_sub(1)?;
        let previous = rsi_at(history, self.period, last.checked_sub(1)?)?;
        let current = rsi_at(history, self.period, last)?;
        Some((previous, current))
    }
}

impl Strategy for RsiStrategy {
    fn name(&self) -> &str {
        "rsi"
    }

    fn min_history(&self) -> usize {
        self.period + 2
    }

    fn should_buy(
        &self,
        history: &[Bar],
        _current_price: f64,
        position: Option<&Position>,
    ) -> Result<Decision> {
        if position.is_some() {
            return Ok(Decision::hold());
        }
        let Some((previous, current)) = self.rsi_pair(history) else {
            return Ok(Decision::hold());
        };
        if previous >= self.oversold_level && current < self.oversold_level {
            return Ok(Decision::act(format!(
                "RSI oversold: {:.2} < {:.2}",
                current, self.oversold_level
            )));
        }
        Ok(Decision::hold())
    }

    fn should_sell(
        &self,
        history: &[Bar],
        _current_price: f64,
        _position: Option<&Position>,
    ) -> Result<Decision> {
        let Some((previous, current)) = self.rsi_pair(history) else {
            return Ok(Decision::hold());
        };
        if previous <= self.overbought_level && current > self.overbought_level {
            return Ok(Decision::act(format!(
                "RSI overbought: {:.2} > {:.2}",
                current, self.overbought_level
            )));
        }
        Ok(Decision::hold())
    }
}
