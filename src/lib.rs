pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod indicators;
pub mod models;
pub mod param_utils;
pub mod performance;
pub mod position;
pub mod report;
pub mod risk;
pub mod strategy;

pub use config::{BacktestConfig, RiskConfig};
pub use engine::{run_backtest, Engine};
pub use error::{BacktestError, Result};
pub use models::{Bar, EquityPoint, ExitReason, Position, Side, Trade};
pub use performance::PerformanceMetrics;
pub use report::Report;
pub use strategy::{create_strategy, Decision, Strategy};
