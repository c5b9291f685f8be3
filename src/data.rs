use crate::models::Bar;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use statrs::distribution::Normal;

/// Geometric random walk over hourly bars. Seeded, so a given seed always
/// reproduces the same series; used by the CLI and the integration tests.
pub fn generate_bars(
    seed: u64,
    count: usize,
    start: DateTime<Utc>,
    initial_price: f64,
    drift: f64,
    volatility: f64,
) -> Vec<Bar> {
    let mut rng = StdRng::seed_from_u64(seed);
    let returns = Normal::new(drift, volatility).unwrap_or_else(|_| {
        Normal::new(0.0, 0.01).expect("fallback normal parameters are valid")
    });

    let mut bars = Vec::with_capacity(count);
    let mut price = initial_price.max(0.01);

    for i in 0..count {
        let open = price;
        let close = (open * (1.0 + rng.sample(returns))).max(0.01);
        // Wicks extend beyond the body by a volatility-scaled fraction.
        let body_high = open.max(close);
        let body_low = open.min(close);
        let upper_wick = body_high * volatility * rng.gen::<f64>();
        let lower_wick = body_low * volatility * rng.gen::<f64>();
        let high = body_high + upper_wick;
        let low = (body_low - lower_wick).max(0.005);
        let volume = 500.0 + rng.gen::<f64>() * 1_500.0;

        bars.push(Bar::new(
            start + Duration::hours(i as i64),
            open,
            high,
            low,
            close,
            volume,
        ));
        price = close;
    }

    bars
}

/// Defaults tuned to look like an hourly crypto series: mild upward drift,
/// 2% per-bar volatility.
pub fn default_bars(seed: u64, count: usize) -> Vec<Bar> {
    let start = Utc::now() - Duration::hours(count as i64);
    generate_bars(seed, count, start, 100.0, 0.0005, 0.02)
}
