//! Return and volatility estimators.
//!
//! Volatility here is always the population standard deviation (divisor `n`).
//! Downside volatility is the semi-deviation measured directly on daily
//! returns below the minimum acceptable return, never `sigma / sqrt(2)`.

use volrisk_data::{PriceSeries, ReturnSeries};

/// Default number of trading days used to annualize daily figures.
pub const TRADING_DAYS_PER_YEAR: u32 = 252;

/// Simple returns `P_t / P_{t-1} - 1`, dated at `t`.
///
/// Pairs involving a missing price are skipped.
pub fn returns(prices: &PriceSeries) -> ReturnSeries {
    let mut dates = Vec::with_capacity(prices.len().saturating_sub(1));
    let mut values = Vec::with_capacity(prices.len().saturating_sub(1));

    let closes = prices.values();
    for t in 1..closes.len() {
        let r = closes[t] / closes[t - 1] - 1.0;
        if r.is_finite() {
            dates.push(prices.dates()[t]);
            values.push(r);
        }
    }

    // Dates come from an ordered series, so ordering cannot fail.
    ReturnSeries::new(dates, values).unwrap_or_else(|_| ReturnSeries::empty())
}

fn annualized(daily: f64, annualize: bool, trading_days_per_year: u32) -> f64 {
    if annualize {
        daily * f64::from(trading_days_per_year).sqrt()
    } else {
        daily
    }
}

/// Population standard deviation of `returns`, optionally annualized.
///
/// Returns NaN for an empty input.
pub fn total_volatility(returns: &[f64], annualize: bool, trading_days_per_year: u32) -> f64 {
    if returns.is_empty() {
        return f64::NAN;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    annualized(variance.sqrt(), annualize, trading_days_per_year)
}

/// Downside semi-deviation of `returns` below `mar`, optionally annualized.
///
/// Each return contributes `min(r - mar, 0)^2`; the root of the mean is the
/// daily figure. Returns NaN for an empty input.
pub fn downside_volatility(
    returns: &[f64],
    mar: f64,
    annualize: bool,
    trading_days_per_year: u32,
) -> f64 {
    if returns.is_empty() {
        return f64::NAN;
    }
    let n = returns.len() as f64;
    let semi_variance = returns
        .iter()
        .map(|r| (r - mar).min(0.0).powi(2))
        .sum::<f64>()
        / n;
    annualized(semi_variance.sqrt(), annualize, trading_days_per_year)
}

/// Annualized downside semi-deviation straight from prices.
pub fn semidev_annual(prices: &PriceSeries, mar: f64, trading_days_per_year: u32) -> f64 {
    downside_volatility(returns(prices).values(), mar, true, trading_days_per_year)
}

/// Annualized total volatility straight from prices.
pub fn total_volatility_annual(prices: &PriceSeries, trading_days_per_year: u32) -> f64 {
    total_volatility(returns(prices).values(), true, trading_days_per_year)
}
