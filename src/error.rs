use chrono::{DateTime, Utc};
use thiserror::Error;

/// Failures that abort a backtest run. None of these are recoverable: a
/// backtest is a deterministic replay, so masking an error would corrupt the
/// result instead of approximating it. No partial report is ever returned.
#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("invalid risk parameters: {0}")]
    InvalidRiskParameters(String),

    /// Illegal state transition: the loop tried to open on top of an open
    /// position. Indicates a bug in the execution loop, not user error.
    #[error("a position opened at {entry_time} is already open")]
    PositionAlreadyOpen { entry_time: DateTime<Utc> },

    /// Illegal state transition: close with no open position.
    #[error("no open position to close")]
    NoOpenPosition,

    #[error("data integrity violation at bar {index}: {reason}")]
    DataIntegrity { index: usize, reason: String },

    #[error("strategy evaluation failed at bar {index} ({timestamp})")]
    StrategyEvaluation {
        index: usize,
        timestamp: DateTime<Utc>,
        #[source]
        source: anyhow::Error,
    },
}

pub type Result<T> = std::result::Result<T, BacktestError>;
