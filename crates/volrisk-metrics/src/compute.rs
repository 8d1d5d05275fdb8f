//! All per-series metrics in one pass.

use crate::blend::RiskProfile;
use crate::drawdown::max_drawdown;
use crate::volatility::{TRADING_DAYS_PER_YEAR, downside_volatility, returns, total_volatility};
use serde::{Deserialize, Serialize};
use volrisk_data::{PriceSeries, ReturnSeries};

/// Parameters shared by every metric computation in a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Minimum acceptable return for downside volatility
    pub mar: f64,
    /// Scale volatilities by `sqrt(trading_days_per_year)`
    pub annualize: bool,
    /// Trading days per year (default: 252)
    pub trading_days_per_year: u32,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            mar: 0.0,
            annualize: true,
            trading_days_per_year: TRADING_DAYS_PER_YEAR,
        }
    }
}

/// Risk metrics of a single price series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesMetrics {
    /// Daily simple returns
    pub returns: ReturnSeries,
    /// Total volatility
    pub sigma_total: f64,
    /// Downside semi-deviation
    pub sigma_down: f64,
    /// Maximum drawdown (signed)
    pub mdd: f64,
    /// Number of prices
    pub sample_days: usize,
    /// Number of returns
    pub trading_days: usize,
    /// Whether volatilities are annualized
    pub annualize: bool,
    /// Trading days per year used for annualization
    pub trading_days_per_year: u32,
}

impl SeriesMetrics {
    /// Compute returns, volatilities and drawdown for `prices`.
    pub fn compute(prices: &PriceSeries, config: &MetricsConfig) -> Self {
        let returns = returns(prices);
        let td = config.trading_days_per_year;
        Self {
            sigma_total: total_volatility(returns.values(), config.annualize, td),
            sigma_down: downside_volatility(returns.values(), config.mar, config.annualize, td),
            mdd: max_drawdown(prices.values()),
            sample_days: prices.len(),
            trading_days: returns.len(),
            annualize: config.annualize,
            trading_days_per_year: td,
            returns,
        }
    }
}

impl RiskProfile for SeriesMetrics {
    fn sigma_down(&self) -> f64 {
        self.sigma_down
    }

    fn sigma_total(&self) -> f64 {
        self.sigma_total
    }

    fn mdd(&self) -> f64 {
        self.mdd
    }
}
