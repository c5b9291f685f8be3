use crate::models::{EquityPoint, Trade};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Statistics derived from a completed run. `profit_factor` is
/// `f64::INFINITY` when there are winners but no losers, and `0.0` when the
/// run produced no trades at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub total_return: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub best_trade: f64,
    pub worst_trade: f64,
}

pub struct PerformanceCalculator;

impl PerformanceCalculator {
    pub fn calculate(
        trades: &[Trade],
        equity_curve: &[EquityPoint],
        initial_capital: f64,
        annualization_factor: f64,
    ) -> PerformanceMetrics {
        let final_equity = equity_curve
            .last()
            .map(|point| point.equity)
            .unwrap_or(initial_capital);
        let total_return = if initial_capital > 0.0 {
            (final_equity - initial_capital) / initial_capital
        } else {
            0.0
        };

        let winning: Vec<f64> = trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl).collect();
        let losing: Vec<f64> = trades.iter().filter(|t| t.pnl < 0.0).map(|t| t.pnl).collect();

        let total_trades = trades.len();
        let win_rate = if total_trades > 0 {
            winning.len() as f64 / total_trades as f64
        } else {
            0.0
        };

        let gross_wins: f64 = winning.iter().sum();
        let gross_losses: f64 = losing.iter().map(|pnl| pnl.abs()).sum();
        let profit_factor = if total_trades == 0 {
            0.0
        } else if gross_losses > 0.0 {
            gross_wins / gross_losses
        } else if gross_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let avg_win = if winning.is_empty() {
            0.0
        } else {
            gross_wins / winning.len() as f64
        };
        let avg_loss = if losing.is_empty() {
            0.0
        } else {
            gross_losses / losing.len() as f64
        };

        let best_trade = trades.iter().map(|t| t.pnl).fold(f64::NEG_INFINITY, f64::max);
        let best_trade = if best_trade.is_finite() { best_trade } else { 0.0 };
        let worst_trade = trades.iter().map(|t| t.pnl).fold(f64::INFINITY, f64::min);
        let worst_trade = if worst_trade.is_finite() { worst_trade } else { 0.0 };

        PerformanceMetrics {
            total_trades,
            winning_trades: winning.len(),
            losing_trades: losing.len(),
            win_rate,
            total_return,
            sharpe_ratio: Self::sharpe_ratio(equity_curve, annualization_factor),
            max_drawdown: Self::max_drawdown(equity_curve),
            profit_factor,
            avg_win,
            avg_loss,
            best_trade,
            worst_trade,
        }
    }

    /// Annualized Sharpe ratio of per-bar equity returns. Zero when fewer
    /// than two returns exist or the return series has no variance.
    pub fn sharpe_ratio(equity_curve: &[EquityPoint], annualization_factor: f64) -> f64 {
        if equity_curve.len() < 3 {
            // fewer than 2 returns
            return 0.0;
        }

        let returns: Vec<f64> = equity_curve
            .windows(2)
            .map(|window| {
                let previous = window[0].equity;
                if previous > 0.0 {
                    (window[1].equity - previous) / previous
                } else {
                    0.0
                }
            })
            .collect();

        let mean_return = returns.clone().mean();
        let std_dev = returns.std_dev();
        if std_dev == 0.0 || !std_dev.is_finite() {
            return 0.0;
        }

        mean_return / std_dev * annualization_factor.sqrt()
    }

    /// Largest peak-to-trough decline as a fraction of the running peak.
    pub fn max_drawdown(equity_curve: &[EquityPoint]) -> f64 {
        let mut max_drawdown = 0.0;
        let mut peak = f64::NEG_INFINITY;

        for point in equity_curve {
            if point.equity > peak {
                peak = point.equity;
            } else if peak > 0.0 {
                let drawdown = (peak - point.equity) / peak;
                if drawdown > max_drawdown {
                    max_drawdown = drawdown;
                }
            }
        }

        max_drawdown
    }
}
