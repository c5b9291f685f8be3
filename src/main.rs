use anyhow::{anyhow, Context, Result};
use backtester::{
    config::BacktestConfig,
    data,
    engine::Engine,
    strategy::create_strategy,
};
use clap::{Parser, Subcommand};
use log::info;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "backtester")]
#[command(about = "A bar-by-bar trading strategy backtester")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a backtest of a strategy template over synthetic market data
    Run {
        /// Template ID of the strategy to run (e.g. rsi, ema_cross)
        template_id: String,
        /// Number of hourly bars to simulate
        #[arg(long, default_value_t = 2_000)]
        bars: usize,
        /// Seed for the synthetic data generator
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Starting capital
        #[arg(long, default_value_t = 10_000.0)]
        capital: f64,
        /// Strategy and risk parameters as key=value pairs (e.g. riskPct=0.02)
        #[arg(short, long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
        /// Write the full JSON report to this file instead of a summary to stdout
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Generate synthetic bars and print them as JSON
    GenerateData {
        /// Number of hourly bars to generate
        #[arg(long, default_value_t = 500)]
        bars: usize,
        /// Seed for the generator
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            template_id,
            bars,
            seed,
            capital,
            params,
            output,
        } => run(&template_id, bars, seed, capital, &params, output),
        Commands::GenerateData { bars, seed } => {
            let series = data::default_bars(seed, bars);
            println!("{}", serde_json::to_string_pretty(&series)?);
            Ok(())
        }
    }
}

fn run(
    template_id: &str,
    bars: usize,
    seed: u64,
    capital: f64,
    params: &[String],
    output: Option<PathBuf>,
) -> Result<()> {
    let mut parameters = parse_params(params)?;
    parameters.insert("initialCapital".to_string(), capital);

    let strategy = create_strategy(template_id, &parameters)?;
    let config = BacktestConfig::from_parameters(&parameters);
    let series = data::default_bars(seed, bars);

    info!(
        "Running {} over {} synthetic bars (seed {})",
        strategy.name(),
        series.len(),
        seed
    );

    let report = Engine::new(config).run(&series, strategy.as_ref())?;

    match output {
        Some(path) => {
            let json = serde_json::to_string_pretty(&report)?;
            fs::write(&path, json)
                .with_context(|| format!("failed to write report to {}", path.display()))?;
            info!("Report {} written to {}", report.id, path.display());
        }
        None => {
            let m = &report.metrics;
            println!("Strategy:        {}", report.strategy);
            println!("Bars:            {}", report.equity_curve.len());
            println!("Trades:          {}", m.total_trades);
            println!("Win rate:        {:.1}%", m.win_rate * 100.0);
            println!("Total return:    {:.2}%", m.total_return * 100.0);
            println!("Sharpe ratio:    {:.3}", m.sharpe_ratio);
            println!("Max drawdown:    {:.2}%", m.max_drawdown * 100.0);
            println!("Profit factor:   {:.3}", m.profit_factor);
            println!("Final equity:    {:.2}", report.final_equity);
            println!("Commission paid: {:.2}", report.total_commission);
        }
    }

    Ok(())
}

fn parse_params(params: &[String]) -> Result<HashMap<String, f64>> {
    let mut map = HashMap::new();
    for raw in params {
        let (key, value) = raw
            .split_once('=')
            .ok_or_else(|| anyhow!("invalid parameter '{raw}', expected KEY=VALUE"))?;
        let value: f64 = value
            .parse()
            .with_context(|| format!("parameter '{key}' has a non-numeric value"))?;
        map.insert(key.trim().to_string(), value);
    }
    Ok(map)
}
