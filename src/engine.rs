use crate::config::{BacktestConfig, RiskConfig};
use crate::error::{BacktestError, Result};
use crate::models::{Bar, EquityPoint, ExitReason, Side, Trade};
use crate::performance::PerformanceCalculator;
use crate::position::PositionManager;
use crate::report::{assemble_report, Report};
use crate::risk::{protective_levels, size_position};
use crate::strategy::Strategy;
use log::{debug, info};

/// Drives one backtest: bar validation, the sequential execution loop, and
/// result assembly. Every run owns its position, trade log and equity curve,
/// so independent runs never share state.
pub struct Engine {
    config: BacktestConfig,
}

impl Engine {
    pub fn new(config: BacktestConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn run(&self, bars: &[Bar], strategy: &dyn Strategy) -> Result<Report> {
        self.config.validate()?;
        validate_bars(bars)?;

        let risk = &self.config.risk;
        let mut positions = PositionManager::new(risk.commission_rate);
        let mut cash = self.config.initial_capital;
        let mut trades: Vec<Trade> = Vec::new();
        let mut equity_curve: Vec<EquityPoint> = Vec::with_capacity(bars.len());
        // Entry commission already deducted from cash; returned on close so
        // cash lands exactly at initial + sum of net trade pnl.
        let mut pending_entry_commission = 0.0;

        info!(
            "Starting backtest of {} over {} bars ({} to {})",
            strategy.name(),
            bars.len(),
            bars[0].timestamp,
            bars[bars.len() - 1].timestamp
        );

        for (index, bar) in bars.iter().enumerate() {
            let history = &bars[..=index];
            let mut exited_this_bar = false;

            // 1. Protective exits take priority over everything else.
            if let Some(reason) = positions.check_stop_targets(bar) {
                let exit_price = match (reason, positions.position()) {
                    (ExitReason::StopLoss, Some(p)) => p.stop_loss,
                    (ExitReason::TakeProfit, Some(p)) => p.take_profit,
                    _ => bar.close,
                };
                self.close_position(
                    &mut positions,
                    &mut cash,
                    &mut pending_entry_commission,
                    &mut trades,
                    exit_price,
                    bar,
                    reason,
                )?;
                exited_this_bar = true;
            }

            // 2. Signal exits and entries. A bar that already closed a trade
            //    is spent: no re-entry until the next bar.
            if !exited_this_bar {
                if let Some(position) = positions.position() {
                    let side = position.side;
                    let decision = match side {
                        Side::Long => strategy.should_sell(history, bar.close, Some(position)),
                        Side::Short => strategy.should_buy(history, bar.close, Some(position)),
                    }
                    .map_err(|source| BacktestError::StrategyEvaluation {
                        index,
                        timestamp: bar.timestamp,
                        source,
                    })?;
                    if decision.enter {
                        debug!("Exit signal at bar {}: {}", index, decision.reason);
                        self.close_position(
                            &mut positions,
                            &mut cash,
                            &mut pending_entry_commission,
                            &mut trades,
                            bar.close,
                            bar,
                            ExitReason::Signal,
                        )?;
                    }
                } else if index + 1 >= strategy.min_history() {
                    let buy = strategy
                        .should_buy(history, bar.close, None)
                        .map_err(|source| BacktestError::StrategyEvaluation {
                            index,
                            timestamp: bar.timestamp,
                            source,
                        })?;
                    if buy.enter && risk.allow_long {
                        debug!("Entry signal at bar {}: {}", index, buy.reason);
                        pending_entry_commission = self.open_position(
                            &mut positions,
                            &mut cash,
                            Side::Long,
                            bar,
                        )?;
                    } else if risk.allow_short {
                        let sell = strategy
                            .should_sell(history, bar.close, None)
                            .map_err(|source| BacktestError::StrategyEvaluation {
                                index,
                                timestamp: bar.timestamp,
                                source,
                            })?;
                        if sell.enter {
                            debug!("Short entry signal at bar {}: {}", index, sell.reason);
                            pending_entry_commission = self.open_position(
                                &mut positions,
                                &mut cash,
                                Side::Short,
                                bar,
                            )?;
                        }
                    }
                }
            }

            // 4. One equity sample per bar, cash plus unrealized pnl.
            equity_curve.push(EquityPoint {
                timestamp: bar.timestamp,
                equity: cash + positions.unrealized_pnl(bar.close),
            });
        }

        // 5. Force-close anything still open at the final close.
        if positions.is_open() {
            let last_bar = &bars[bars.len() - 1];
            info!(
                "Force-closing open position at end of data ({})",
                last_bar.timestamp
            );
            self.close_position(
                &mut positions,
                &mut cash,
                &mut pending_entry_commission,
                &mut trades,
                last_bar.close,
                last_bar,
                ExitReason::EndOfData,
            )?;
            if let Some(last_point) = equity_curve.last_mut() {
                last_point.equity = cash;
            }
        }

        let metrics = PerformanceCalculator::calculate(
            &trades,
            &equity_curve,
            self.config.initial_capital,
            self.config.annualization_factor,
        );

        info!(
            "Backtest completed: {} trade{}, final equity {:.2}",
            trades.len(),
            if trades.len() == 1 { "" } else { "s" },
            equity_curve.last().map(|p| p.equity).unwrap_or(cash),
        );

        Ok(assemble_report(
            strategy.name(),
            self.config.initial_capital,
            trades,
            equity_curve,
            metrics,
        ))
    }

    /// Size via the risk manager and open at the bar close. Returns the entry
    /// commission charged against cash.
    fn open_position(
        &self,
        positions: &mut PositionManager,
        cash: &mut f64,
        side: Side,
        bar: &Bar,
    ) -> Result<f64> {
        let risk = &self.config.risk;
        let entry_price = bar.close;
        let (stop_loss, take_profit) =
            protective_levels(entry_price, side, risk.stop_pct, risk.target_pct);
        let stop_distance = (entry_price - stop_loss).abs();
        let size = size_position(
            *cash,
            entry_price,
            risk.risk_pct,
            stop_distance,
            risk.max_position_fraction,
        )?;
        let entry_commission =
            positions.open(side, entry_price, size, stop_loss, take_profit, bar.timestamp)?;
        *cash -= entry_commission;
        Ok(entry_commission)
    }

    #[allow(clippy::too_many_arguments)]
    fn close_position(
        &self,
        positions: &mut PositionManager,
        cash: &mut f64,
        pending_entry_commission: &mut f64,
        trades: &mut Vec<Trade>,
        price: f64,
        bar: &Bar,
        reason: ExitReason,
    ) -> Result<()> {
        let trade = positions.close(price, bar.timestamp, reason)?;
        *cash += trade.pnl + *pending_entry_commission;
        *pending_entry_commission = 0.0;
        trades.push(trade);
        Ok(())
    }
}

/// Single entry point for callers: validate, replay, aggregate. Performs no
/// I/O beyond log records.
pub fn run_backtest(
    bars: &[Bar],
    strategy: &dyn Strategy,
    initial_capital: f64,
    risk: &RiskConfig,
    commission_rate: f64,
) -> Result<Report> {
    let config = BacktestConfig {
        initial_capital,
        risk: RiskConfig {
            commission_rate,
            ..risk.clone()
        },
        ..BacktestConfig::default()
    };
    Engine::new(config).run(bars, strategy)
}

/// The engine trusts its input sequence, so it is checked once, up front.
/// Any malformed bar aborts the run naming the offending index; bars are
/// never silently skipped.
fn validate_bars(bars: &[Bar]) -> Result<()> {
    if bars.is_empty() {
        return Err(BacktestError::DataIntegrity {
            index: 0,
            reason: "bar sequence is empty".to_string(),
        });
    }

    for (index, bar) in bars.iter().enumerate() {
        let fields = [
            ("open", bar.open),
            ("high", bar.high),
            ("low", bar.low),
            ("close", bar.close),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value <= 0.0 {
                return Err(BacktestError::DataIntegrity {
                    index,
                    reason: format!("{} must be a positive finite number (value: {})", name, value),
                });
            }
        }
        if !bar.volume.is_finite() || bar.volume < 0.0 {
            return Err(BacktestError::DataIntegrity {
                index,
                reason: format!("volume must be non-negative (value: {})", bar.volume),
            });
        }
        if bar.high < bar.low {
            return Err(BacktestError::DataIntegrity {
                index,
                reason: format!("high {} is below low {}", bar.high, bar.low),
            });
        }
        if bar.high < bar.open.max(bar.close) || bar.low > bar.open.min(bar.close) {
            return Err(BacktestError::DataIntegrity {
                index,
                reason: "high/low range does not bracket open/close".to_string(),
            });
        }
        if index > 0 && bar.timestamp <= bars[index - 1].timestamp {
            return Err(BacktestError::DataIntegrity {
                index,
                reason: format!(
                    "timestamp {} is not after previous bar {}",
                    bar.timestamp,
                    bars[index - 1].timestamp
                ),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Position;
    use crate::strategy::Decision;
    use anyhow::anyhow;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::cell::RefCell;

    fn time(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(h)
    }

    /// Bars with tight high/low bands around the close so no stop or target
    /// triggers unless a test widens them explicitly.
    fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                Bar::new(time(i as i64), close, close + 1.0, close - 1.0, close, 1_000.0)
            })
            .collect()
    }

    fn risk_no_commission() -> RiskConfig {
        RiskConfig {
            risk_pct: 0.01,
            stop_pct: 0.10,
            target_pct: 0.20,
            commission_rate: 0.0,
            allow_long: true,
            allow_short: false,
            max_position_fraction: 1.0,
        }
    }

    /// Buys whenever flat, never emits an exit signal.
    struct BuyAndHoldForever;

    impl Strategy for BuyAndHoldForever {
        fn name(&self) -> &str {
            "buy_and_hold_forever"
        }

        fn should_buy(
            &self,
            _history: &[Bar],
            _price: f64,
            position: Option<&Position>,
        ) -> anyhow::Result<Decision> {
            Ok(if position.is_none() {
                Decision::act("always enter when flat")
            } else {
                Decision::hold()
            })
        }

        fn should_sell(
            &self,
            _history: &[Bar],
            _price: f64,
            _position: Option<&Position>,
        ) -> anyhow::Result<Decision> {
            Ok(Decision::hold())
        }
    }

    #[test]
    fn holds_through_quiet_bars_and_closes_at_end_of_data() {
        let bars = bars_from_closes(&[100.0, 105.0, 95.0, 110.0, 108.0]);
        let report =
            run_backtest(&bars, &BuyAndHoldForever, 10_000.0, &risk_no_commission(), 0.0).unwrap();

        assert_eq!(report.trades.len(), 1);
        let trade = &report.trades[0];
        assert_eq!(trade.exit_reason, ExitReason::EndOfData);
        assert_eq!(trade.entry_time, bars[0].timestamp);
        assert_eq!(trade.exit_time, bars[4].timestamp);
        assert!((trade.entry_price - 100.0).abs() < 1e-12);
        assert!((trade.exit_price - 108.0).abs() < 1e-12);
        // size = 10000 * 0.01 / 10 = 10 units
        assert!((trade.size - 10.0).abs() < 1e-12);
        assert!((trade.pnl - 80.0).abs() < 1e-9);
        assert_eq!(report.equity_curve.len(), 5);
        assert!((report.final_equity - 10_080.0).abs() < 1e-9);
    }

    #[test]
    fn stop_loss_closes_at_stop_price_with_no_same_bar_reentry() {
        let mut bars = bars_from_closes(&[100.0, 105.0, 95.0, 110.0, 108.0]);
        bars[2].low = 85.0; // pierces the stop at 90
        let report =
            run_backtest(&bars, &BuyAndHoldForever, 10_000.0, &risk_no_commission(), 0.0).unwrap();

        let first = &report.trades[0];
        assert_eq!(first.exit_reason, ExitReason::StopLoss);
        assert!((first.exit_price - 90.0).abs() < 1e-12);
        assert_eq!(first.exit_time, bars[2].timestamp);
        assert!((first.pnl - (90.0 - 100.0) * 10.0).abs() < 1e-9);

        // The strategy buys whenever flat, so the next entry proves bar 2
        // evaluated no new entry after its exit.
        assert_eq!(report.trades.len(), 2);
        assert_eq!(report.trades[1].entry_time, bars[3].timestamp);
    }

    #[test]
    fn take_profit_closes_at_target_price() {
        let mut bars = bars_from_closes(&[100.0, 105.0, 112.0, 118.0, 116.0]);
        bars[3].high = 121.0; // target at 120
        let report =
            run_backtest(&bars, &BuyAndHoldForever, 10_000.0, &risk_no_commission(), 0.0).unwrap();

        let first = &report.trades[0];
        assert_eq!(first.exit_reason, ExitReason::TakeProfit);
        assert!((first.exit_price - 120.0).abs() < 1e-12);
        assert_eq!(first.exit_time, bars[3].timestamp);
    }

    #[test]
    fn stop_wins_when_bar_spans_both_levels() {
        let mut bars = bars_from_closes(&[100.0, 102.0, 101.0]);
        bars[1].low = 85.0;
        bars[1].high = 125.0; // both stop (90) and target (120) in range
        let report =
            run_backtest(&bars, &BuyAndHoldForever, 10_000.0, &risk_no_commission(), 0.0).unwrap();
        assert_eq!(report.trades[0].exit_reason, ExitReason::StopLoss);
        assert!((report.trades[0].exit_price - 90.0).abs() < 1e-12);
    }

    /// Alternates: buys when flat, sells the bar after entry.
    struct FlipFlop;

    impl Strategy for FlipFlop {
        fn name(&self) -> &str {
            "flip_flop"
        }

        fn should_buy(
            &self,
            _history: &[Bar],
            _price: f64,
            position: Option<&Position>,
        ) -> anyhow::Result<Decision> {
            Ok(if position.is_none() {
                Decision::act("enter")
            } else {
                Decision::hold()
            })
        }

        fn should_sell(
            &self,
            _history: &[Bar],
            _price: f64,
            position: Option<&Position>,
        ) -> anyhow::Result<Decision> {
            Ok(if position.is_some() {
                Decision::act("exit")
            } else {
                Decision::hold()
            })
        }
    }

    #[test]
    fn equity_reconciles_with_commissions() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + (i % 7) as f64).collect();
        let bars = bars_from_closes(&closes);
        let mut risk = risk_no_commission();
        risk.commission_rate = 0.001;
        let report = run_backtest(&bars, &FlipFlop, 10_000.0, &risk, 0.001).unwrap();

        assert!(report.trades.len() > 1);
        let net: f64 = report.trades.iter().map(|t| t.pnl).sum();
        assert!((report.final_equity - (10_000.0 + net)).abs() < 1e-6);

        // Gross-minus-commission form of the same invariant.
        let gross: f64 = report.trades.iter().map(|t| t.pnl + t.commission).sum();
        assert!(
            (report.final_equity - (10_000.0 + gross - report.total_commission)).abs() < 1e-6
        );
        assert!(report.total_commission > 0.0);
    }

    #[test]
    fn short_positions_profit_from_falling_prices() {
        let bars = bars_from_closes(&[100.0, 97.0, 94.0, 91.0, 88.0]);
        let risk = RiskConfig {
            allow_long: false,
            allow_short: true,
            ..risk_no_commission()
        };

        /// Sells short when flat, then holds.
        struct ShortOnce;
        impl Strategy for ShortOnce {
            fn name(&self) -> &str {
                "short_once"
            }
            fn should_buy(
                &self,
                _history: &[Bar],
                _price: f64,
                _position: Option<&Position>,
            ) -> anyhow::Result<Decision> {
                Ok(Decision::hold())
            }
            fn should_sell(
                &self,
                _history: &[Bar],
                _price: f64,
                position: Option<&Position>,
            ) -> anyhow::Result<Decision> {
                Ok(if position.is_none() {
                    Decision::act("short entry")
                } else {
                    Decision::hold()
                })
            }
        }

        let report = run_backtest(&bars, &ShortOnce, 10_000.0, &risk, 0.0).unwrap();
        assert_eq!(report.trades.len(), 1);
        let trade = &report.trades[0];
        assert_eq!(trade.side, Side::Short);
        assert_eq!(trade.exit_reason, ExitReason::EndOfData);
        assert!(trade.pnl > 0.0);
        assert!((trade.pnl - (100.0 - 88.0) * trade.size).abs() < 1e-9);
    }

    /// Records what the engine hands to each oracle call so look-ahead can be
    /// ruled out structurally.
    struct RecordingStrategy {
        observations: RefCell<Vec<(usize, DateTime<Utc>)>>,
    }

    impl Strategy for RecordingStrategy {
        fn name(&self) -> &str {
            "recording"
        }

        fn should_buy(
            &self,
            history: &[Bar],
            current_price: f64,
            _position: Option<&Position>,
        ) -> anyhow::Result<Decision> {
            let last = history.last().expect("history is never empty");
            assert_eq!(last.close, current_price);
            self.observations
                .borrow_mut()
                .push((history.len(), last.timestamp));
            Ok(Decision::hold())
        }

        fn should_sell(
            &self,
            _history: &[Bar],
            _price: f64,
            _position: Option<&Position>,
        ) -> anyhow::Result<Decision> {
            Ok(Decision::hold())
        }
    }

    #[test]
    fn oracle_only_ever_sees_the_prefix_up_to_the_current_bar() {
        let bars = bars_from_closes(&[100.0, 101.0, 102.0, 103.0, 104.0]);
        let strategy = RecordingStrategy {
            observations: RefCell::new(Vec::new()),
        };
        run_backtest(&bars, &strategy, 10_000.0, &risk_no_commission(), 0.0).unwrap();

        let observations = strategy.observations.borrow();
        assert_eq!(observations.len(), bars.len());
        for (i, (history_len, last_timestamp)) in observations.iter().enumerate() {
            assert_eq!(*history_len, i + 1);
            assert_eq!(*last_timestamp, bars[i].timestamp);
        }
    }

    #[test]
    fn decisions_are_invariant_under_future_bar_mutation() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + (i % 5) as f64).collect();
        let bars = bars_from_closes(&closes);
        let mut mutated = bars.clone();
        // Rewrite the tail; trades completed before it must not change.
        for bar in mutated.iter_mut().skip(25) {
            bar.open *= 3.0;
            bar.high *= 3.0;
            bar.low *= 3.0;
            bar.close *= 3.0;
        }

        let baseline =
            run_backtest(&bars, &FlipFlop, 10_000.0, &risk_no_commission(), 0.0).unwrap();
        let altered =
            run_backtest(&mutated, &FlipFlop, 10_000.0, &risk_no_commission(), 0.0).unwrap();

        let cutoff = bars[25].timestamp;
        let early = |report: &Report| -> Vec<(DateTime<Utc>, DateTime<Utc>, f64)> {
            report
                .trades
                .iter()
                .filter(|t| t.exit_time < cutoff)
                .map(|t| (t.entry_time, t.exit_time, t.pnl))
                .collect()
        };
        assert!(!early(&baseline).is_empty());
        assert_eq!(early(&baseline), early(&altered));
    }

    #[test]
    fn rejects_non_monotonic_timestamps() {
        let mut bars = bars_from_closes(&[100.0, 101.0, 102.0, 103.0]);
        bars[3].timestamp = bars[1].timestamp;
        let err = run_backtest(&bars, &BuyAndHoldForever, 10_000.0, &risk_no_commission(), 0.0)
            .unwrap_err();
        match err {
            BacktestError::DataIntegrity { index, .. } => assert_eq!(index, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_malformed_ohlc() {
        let mut bars = bars_from_closes(&[100.0, 101.0, 102.0]);
        bars[1].close = f64::NAN;
        let err = run_backtest(&bars, &BuyAndHoldForever, 10_000.0, &risk_no_commission(), 0.0)
            .unwrap_err();
        match err {
            BacktestError::DataIntegrity { index, .. } => assert_eq!(index, 1),
            other => panic!("unexpected error: {other}"),
        }

        let mut inverted = bars_from_closes(&[100.0, 101.0]);
        inverted[0].high = inverted[0].low - 1.0;
        assert!(matches!(
            run_backtest(&inverted, &BuyAndHoldForever, 10_000.0, &risk_no_commission(), 0.0),
            Err(BacktestError::DataIntegrity { index: 0, .. })
        ));
    }

    #[test]
    fn rejects_empty_bar_sequence() {
        assert!(matches!(
            run_backtest(&[], &BuyAndHoldForever, 10_000.0, &risk_no_commission(), 0.0),
            Err(BacktestError::DataIntegrity { index: 0, .. })
        ));
    }

    #[test]
    fn strategy_errors_abort_with_bar_context() {
        struct FailsAtBar(usize);
        impl Strategy for FailsAtBar {
            fn name(&self) -> &str {
                "fails"
            }
            fn should_buy(
                &self,
                history: &[Bar],
                _price: f64,
                _position: Option<&Position>,
            ) -> anyhow::Result<Decision> {
                if history.len() - 1 == self.0 {
                    Err(anyhow!("indicator blew up"))
                } else {
                    Ok(Decision::hold())
                }
            }
            fn should_sell(
                &self,
                _history: &[Bar],
                _price: f64,
                _position: Option<&Position>,
            ) -> anyhow::Result<Decision> {
                Ok(Decision::hold())
            }
        }

        let bars = bars_from_closes(&[100.0, 101.0, 102.0, 103.0, 104.0, 105.0]);
        let err = run_backtest(&bars, &FailsAtBar(4), 10_000.0, &risk_no_commission(), 0.0)
            .unwrap_err();
        match err {
            BacktestError::StrategyEvaluation { index, timestamp, .. } => {
                assert_eq!(index, 4);
                assert_eq!(timestamp, bars[4].timestamp);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invalid_config_is_rejected_before_the_loop_runs() {
        let bars = bars_from_closes(&[100.0, 101.0]);
        let risk = RiskConfig {
            risk_pct: 2.0,
            ..risk_no_commission()
        };
        assert!(matches!(
            run_backtest(&bars, &BuyAndHoldForever, 10_000.0, &risk, 0.0),
            Err(BacktestError::InvalidRiskParameters(_))
        ));
    }

    #[test]
    fn entry_respects_allow_long_flag() {
        let bars = bars_from_closes(&[100.0, 101.0, 102.0]);
        let risk = RiskConfig {
            allow_long: false,
            allow_short: true,
            ..risk_no_commission()
        };
        // BuyAndHoldForever only emits buy signals; with longs disabled and no
        // sell signal, nothing should trade.
        let report = run_backtest(&bars, &BuyAndHoldForever, 10_000.0, &risk, 0.0).unwrap();
        assert!(report.trades.is_empty());
        assert!((report.final_equity - 10_000.0).abs() < 1e-12);
    }
}
