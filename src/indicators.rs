use crate::models::Bar;

/// Simple moving average; positions before the first full window are NaN.
pub fn calculate_sma(prices: &[f64], period: usize) -> Vec<f64> {
    let mut result = vec![f64::NAN; prices.len()];
    if period == 0 || prices.len() < period {
        return result;
    }
    let mut window_sum: f64 = prices[..period].iter().sum();
    result[period - 1] = window_sum / period as f64;
    for i in period..prices.len() {
        window_sum += prices[i] - prices[i - period];
        result[i] = window_sum / period as f64;
    }
    result
}

/// Exponential moving average seeded with the first price.
pub fn calculate_ema(prices: &[f64], period: usize) -> Vec<f64> {
    let mut result = Vec::with_capacity(prices.len());
    if prices.is_empty() || period == 0 {
        return result;
    }
    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut ema = prices[0];
    result.push(ema);
    for &price in &prices[1..] {
        ema = (price - ema) * multiplier + ema;
        result.push(ema);
    }
    result
}

/// RSI of the closes ending at `index`, averaging gains and losses over the
/// last `period` close-to-close changes. None until enough history exists.
pub fn rsi_at(bars: &[Bar], period: usize, index: usize) -> Option<f64> {
    if period == 0 || index >= bars.len() || index < period {
        return None;
    }
    let mut gains = 0.0;
    let mut losses = 0.0;
    for i in (index - period + 1)..=index {
        let change = bars[i].close - bars[i - 1].close;
        if change > 0.0 {
            gains += change;
        } else {
            losses -= change;
        }
    }
    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;
    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Average true range over the `period` bars ending at `index`.
pub fn atr_at(bars: &[Bar], period: usize, index: usize) -> Option<f64> {
    if period == 0 || index >= bars.len() || index < period {
        return None;
    }
    let mut sum = 0.0;
    for i in (index - period + 1)..=index {
        let prev_close = bars[i - 1].close;
        let true_range = (bars[i].high - bars[i].low)
            .max((bars[i].high - prev_close).abs())
            .max((bars[i].low - prev_close).abs());
        sum += true_range;
    }
    Some(sum / period as f64)
}
