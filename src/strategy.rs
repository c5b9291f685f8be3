use crate::models::{Bar, Position};
use anyhow::Result;
use std::collections::HashMap;

/// Outcome of one oracle query: whether to act, and a human-readable reason
/// that ends up in logs.
#[derive(Debug, Clone)]
pub struct Decision {
    pub enter: bool,
    pub reason: String,
}

impl Decision {
    pub fn act(reason: impl Into<String>) -> Self {
        Self {
            enter: true,
            reason: reason.into(),
        }
    }

    pub fn hold() -> Self {
        Self {
            enter: false,
            reason: String::new(),
        }
    }
}

/// Trading decision oracle. The engine hands each query the bar history up to
/// and including the current index, never anything later; a strategy that only
/// reads its arguments cannot look ahead.
///
/// Errors abort the run: a backtest is a deterministic replay, so there is
/// nothing sensible to retry.
pub trait Strategy {
    fn name(&self) -> &str;

    /// Bars required before the first meaningful decision.
    fn min_history(&self) -> usize {
        0
    }

    fn should_buy(
        &self,
        history: &[Bar],
        current_price: f64,
        position: Option<&Position>,
    ) -> Result<Decision>;

    fn should_sell(
        &self,
        history: &[Bar],
        current_price: f64,
        position: Option<&Position>,
    ) -> Result<Decision>;
}

#[path = "strategies/rsi.rs"]
pub mod rsi;

pub use rsi::RsiStrategy;

#[path = "strategies/ema_cross.rs"]
pub mod ema_cross;

pub use ema_cross::EmaCrossStrategy;

/// Instantiate a strategy by template id with a camelCase parameter map.
pub fn create_strategy(
    template_id: &str,
    parameters: &HashMap<String, f64>,
) -> Result<Box<dyn Strategy + Send + Sync>> {
    match template_id {
        "rsi" => Ok(Box::new(RsiStrategy::new(parameters))),
        "ema_cross" => Ok(Box::new(EmaCrossStrategy::new(parameters))),
        _ => Err(anyhow::anyhow!("Unknown strategy template: {}", template_id)),
    }
}
