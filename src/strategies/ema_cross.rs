use crate::indicators::calculate_ema;
use crate::models::{Bar, Position};
use crate::param_utils::{get_param, get_param_bool, get_param_usize};
use anyhow::Result;
use std::collections::HashMap;

use super::{Decision, Strategy};

/// EMA crossover: buy when the fast EMA crosses above the slow EMA, sell when
/// it crosses back below. An optional long-period trend EMA gates entries to
/// bars where price trades above the prevailing trend.
pub struct EmaCrossStrategy {
    fast_period: usize,
    slow_period: usize,
    trend_period: usize,
    trend_filter: bool,
    /// Minimum fractional rise of the slow EMA per bar; 0 disables the gate.
    min_slope: f64,
}

impl EmaCrossStrategy {
    pub fn new(parameters: &HashMap<String, f64>) -> Self {
        Self {
            fast_period: get_param_usize(parameters, "fastPeriod", 20),
            slow_period: get_param_usize(parameters, "slowPeriod", 55),
            trend_period: get_param_usize(parameters, "trendPeriod", 200),
            trend_filter: get_param_bool(parameters, "trendFilter", false),
            min_slope: get_param(parameters, "minSlope", 0.0).max(0.0),
        }
    }

    /// (fast, slow) EMA values at the previous and latest bars.
    fn cross_state(&self, history: &[Bar]) -> Option<[(f64, f64); 2]> {
        if history.len() < self.slow_period.max(2) {
            return None;
        }
        let closes: Vec<f64> = history.iter().map(|b| b.close).collect();
        let fast = calculate_ema(&closes, self.fast_period);
        let slow = calculate_ema(&closes, self.slow_period);
        let last = closes.len() - 1;
        Some([
            (fast[last - 1], slow[last - 1]),
            (fast[last], slow[last]),
        ])
    }

    fn trend_allows_entry(&self, history: &[Bar], current_price: f64) -> bool {
        if !self.trend_filter {
            return true;
        }
        let closes: Vec<f64> = history.iter().map(|b| b.close).collect();
        let trend = calculate_ema(&closes, self.trend_period);
        trend.last().map(|&t| current_price > t).unwrap_or(false)
    }
}

impl Strategy for EmaCrossStrategy {
    fn name(&self) -> &str {
        "ema_cross"
    }

    fn min_history(&self) -> usize {
        self.slow_period + 1
    }

    fn should_buy(
        &self,
        history: &[Bar],
        current_price: f64,
        position: Option<&Position>,
    ) -> Result<Decision> {
        if position.is_some() {
            return Ok(Decision::hold());
        }
        let Some([(prev_fast, prev_slow), (fast, slow)]) = self.cross_state(history) else {
            return Ok(Decision::hold());
        };
        let slope_confirms = self.min_slope == 0.0
            || (prev_slow > 0.0 && (slow - prev_slow) / prev_slow >= self.min_slope);
        if prev_fast <= prev_slow
            && fast > slow
            && slope_confirms
            && self.trend_allows_entry(history, current_price)
        {
            return Ok(Decision::act(format!(
                "EMA{} crossed above EMA{}",
                self.fast_period, self.slow_period
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
        let Some([(prev_fast, prev_slow), (fast, slow)]) = self.cross_state(history) else {
            return Ok(Decision::hold());
        };
        if prev_fast >= prev_slow && fast < slow {
            return Ok(Decision::act(format!(
                "EMA{} crossed below EMA{}",
                self.fast_period, self.slow_period
            )));
        }
        Ok(Decision::hold())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                Bar::new(
                    start + Duration::hours(i as i64),
                    close,
                    close,
                    close,
                    close,
                    1_000.0,
                )
            })
            .collect()
    }

    fn strategy(fast: usize, slow: usize) -> EmaCrossStrategy {
        let mut params = HashMap::new();
        params.insert("fastPeriod".to_string(), fast as f64);
        params.insert("slowPeriod".to_string(), slow as f64);
        EmaCrossStrategy::new(&params)
    }

    #[test]
    fn buys_when_fast_crosses_above_slow() {
        // Long decline pulls the fast EMA below the slow one, then a sharp
        // rally flips the ordering.
        let mut closes: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        closes.extend([95.0, 105.0, 115.0, 125.0]);
        let bars = bars_from_closes(&closes);
        let s = strategy(2, 8);

        let fired = (s.min_history()..=bars.len())
            .any(|n| s.should_buy(&bars[..n], bars[n - 1].close, None).unwrap().enter);
        assert!(fired);
    }

    #[test]
    fn sells_when_fast_crosses_below_slow() {
        let mut closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        closes.extend([125.0, 115.0, 105.0, 95.0]);
        let bars = bars_from_closes(&closes);
        let s = strategy(2, 8);

        let fired = (s.min_history()..=bars.len())
            .any(|n| s.should_sell(&bars[..n], bars[n - 1].close, None).unwrap().enter);
        assert!(fired);
    }

    #[test]
    fn steep_min_slope_suppresses_entries() {
        let mut closes: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        closes.extend([95.0, 105.0, 115.0, 125.0]);
        let bars = bars_from_closes(&closes);
        let mut params = HashMap::new();
        params.insert("fastPeriod".to_string(), 2.0);
        params.insert("slowPeriod".to_string(), 8.0);
        params.insert("minSlope".to_string(), 0.5); // 50% per bar, unreachable
        let s = EmaCrossStrategy::new(&params);

        let fired = (s.min_history()..=bars.len())
            .any(|n| s.should_buy(&bars[..n], bars[n - 1].close, None).unwrap().enter);
        assert!(!fired);
    }

    #[test]
    fn holds_on_flat_series() {
        let bars = bars_from_closes(&[100.0; 30]);
        let s = strategy(5, 10);
        assert!(!s.should_buy(&bars, 100.0, None).unwrap().enter);
        assert!(!s.should_sell(&bars, 100.0, None).unwrap().enter);
    }
}
