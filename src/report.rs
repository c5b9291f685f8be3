use crate::models::{EquityPoint, Trade};
use crate::performance::PerformanceMetrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable result of one backtest run: the trade log, the equity curve and
/// the derived metrics, plus convenience fields for callers that only want
/// the headline numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: String,
    pub strategy: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub initial_capital: f64,
    pub final_equity: f64,
    pub total_commission: f64,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub metrics: PerformanceMetrics,
    pub created_at: DateTime<Utc>,
}

/// Bundle the outputs of a finished run. Construction only; no side effects.
pub fn assemble_report(
    strategy: &str,
    initial_capital: f64,
    trades: Vec<Trade>,
    equity_curve: Vec<EquityPoint>,
    metrics: PerformanceMetrics,
) -> Report {
    let start_time = equity_curve
        .first()
        .map(|point| point.timestamp)
        .unwrap_or_else(Utc::now);
    let end_time = equity_curve
        .last()
        .map(|point| point.timestamp)
        .unwrap_or(start_time);
    let final_equity = equity_curve
        .last()
        .map(|point| point.equity)
        .unwrap_or(initial_capital);
    let total_commission = trades.iter().map(|trade| trade.commission).sum();

    Report {
        id: Uuid::new_v4().to_string(),
        strategy: strategy.to_string(),
        start_time,
        end_time,
        initial_capital,
        final_equity,
        total_commission,
        trades,
        equity_curve,
        metrics,
        created_at: Utc::now(),
    }
}
