use crate::error::{BacktestError, Result};
use crate::models::{Bar, ExitReason, Position, Side, Trade};
use chrono::{DateTime, Utc};

/// Owns the lifecycle of at most one open position. Opening charges the entry
/// commission, closing converts the position into an immutable [`Trade`] whose
/// pnl is net of commission on both legs.
#[derive(Debug)]
pub struct PositionManager {
    open: Option<Position>,
    commission_rate: f64,
}

impl PositionManager {
    pub fn new(commission_rate: f64) -> Self {
        Self {
            open: None,
            commission_rate,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    pub fn position(&self) -> Option<&Position> {
        self.open.as_ref()
    }

    /// Open a position and return the entry commission charged.
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        &mut self,
        side: Side,
        price: f64,
        size: f64,
        stop_loss: f64,
        take_profit: f64,
        time: DateTime<Utc>,
    ) -> Result<f64> {
        if let Some(existing) = &self.open {
            return Err(BacktestError::PositionAlreadyOpen {
                entry_time: existing.entry_time,
            });
        }
        let commission = price * size * self.commission_rate;
        self.open = Some(Position {
            side,
            entry_price: price,
            size,
            entry_time: time,
            stop_loss,
            take_profit,
        });
        Ok(commission)
    }

    /// Close the open position at `price`, producing the realized trade.
    pub fn close(&mut self, price: f64, time: DateTime<Utc>, reason: ExitReason) -> Result<Trade> {
        let position = self.open.take().ok_or(BacktestError::NoOpenPosition)?;

        let gross_pnl = position.unrealized_pnl(price);
        let entry_commission = position.entry_price * position.size * self.commission_rate;
        let exit_commission = price * position.size * self.commission_rate;
        let commission = entry_commission + exit_commission;
        let pnl = gross_pnl - commission;
        let entry_notional = position.entry_price * position.size;
        let pnl_pct = if entry_notional > 0.0 {
            pnl / entry_notional
        } else {
            0.0
        };

        Ok(Trade {
            side: position.side,
            entry_price: position.entry_price,
            exit_price: price,
            entry_time: position.entry_time,
            exit_time: time,
            size: position.size,
            pnl,
            pnl_pct,
            commission,
            exit_reason: reason,
        })
    }

    /// Pure query; zero when flat.
    pub fn unrealized_pnl(&self, current_price: f64) -> f64 {
        self.open
            .as_ref()
            .map(|p| p.unrealized_pnl(current_price))
            .unwrap_or(0.0)
    }

    /// Does the bar's high/low range cross the stop or target?
    ///
    /// Tie-break: when both levels fall inside the same bar's range the
    /// stop-loss is assumed hit first. The intrabar path is unknown, so this
    /// is a conservative modeling assumption, not an execution guarantee.
    pub fn check_stop_targets(&self, bar: &Bar) -> Option<ExitReason> {
        let position = self.open.as_ref()?;
        match position.side {
            Side::Long => {
                if bar.low <= position.stop_loss {
                    Some(ExitReason::StopLoss)
                } else if bar.high >= position.take_profit {
                    Some(ExitReason::TakeProfit)
                } else {
                    None
                }
            }
            Side::Short => {
                if bar.high >= position.stop_loss {
                    Some(ExitReason::StopLoss)
                } else if bar.low <= position.take_profit {
                    Some(ExitReason::TakeProfit)
                } else {
                    None
                }
            }
        }
    }
}
