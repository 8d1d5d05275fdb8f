//! Sector proxies: per-ticker metrics blended into one risk profile.

use crate::config::{EngineSettings, SectorsConfig};
use crate::error::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use volrisk_data::{PriceFetcher, QuoteSource, ReturnSeries};
use volrisk_metrics::blend::{blend_returns, weighted_blend};
use volrisk_metrics::{
    MetricsError, RiskProfile, SeriesMetrics, check_weight_sum, validate_data_quality,
};
use volrisk_output::SectorRow;

/// What to do when per-ticker weights don't sum to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightPolicy {
    /// Log a warning and use the weights as given
    #[default]
    Warn,
    /// Reject the sector
    Strict,
}

/// Blended metrics of one sector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorMetrics {
    /// Sector name
    pub name: String,
    /// ETF tickers
    pub tickers: Vec<String>,
    /// Weight of each ticker
    pub weights: Vec<f64>,
    /// Weighted downside volatility
    pub sigma_down: f64,
    /// Weighted total volatility
    pub sigma_total: f64,
    /// Weighted maximum drawdown
    pub mdd: f64,
    /// Price observations of the first ticker
    pub sample_days: usize,
    /// Return observations of the first ticker
    pub trading_days: usize,
    /// First price date of the first ticker
    pub start_date: Option<NaiveDate>,
    /// Last price date of the first ticker
    pub end_date: Option<NaiveDate>,
    /// Weighted daily returns on dates common to every ticker
    pub returns: ReturnSeries,
}

impl SectorMetrics {
    /// `NAME(T1,T2)`
    pub fn descriptor(&self) -> String {
        format!("{}({})", self.name, self.tickers.join(","))
    }

    /// Export row.
    pub fn to_row(&self) -> SectorRow {
        SectorRow {
            name: self.name.clone(),
            tickers: self.tickers.join(","),
            weights: self
                .weights
                .iter()
                .map(|w| w.to_string())
                .collect::<Vec<_>>()
                .join(","),
            sigma_down: self.sigma_down,
            sigma_total: self.sigma_total,
            mdd: self.mdd,
            sample_days: self.sample_days,
            trading_days: self.trading_days,
            start_date: self.start_date,
            end_date: self.end_date,
        }
    }
}

impl RiskProfile for SectorMetrics {
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

/// Sectors computed in a run, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct ComputedSectors {
    entries: Vec<Arc<SectorMetrics>>,
}

impl ComputedSectors {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sector, replacing one with the same name.
    pub fn insert(&mut self, metrics: SectorMetrics) {
        let metrics = Arc::new(metrics);
        match self.entries.iter_mut().find(|m| m.name == metrics.name) {
            Some(slot) => *slot = metrics,
            None => self.entries.push(metrics),
        }
    }

    /// Look up a sector by name.
    pub fn get(&self, name: &str) -> Option<&Arc<SectorMetrics>> {
        self.entries.iter().find(|m| m.name == name)
    }

    /// Whether `name` was computed.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of sectors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was computed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sectors in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<SectorMetrics>> {
        self.entries.iter()
    }

    /// Export rows.
    pub fn rows(&self) -> Vec<SectorRow> {
        self.entries.iter().map(|m| m.to_row()).collect()
    }
}

impl FromIterator<SectorMetrics> for ComputedSectors {
    fn from_iter<I: IntoIterator<Item = SectorMetrics>>(iter: I) -> Self {
        let mut sectors = Self::new();
        for metrics in iter {
            sectors.insert(metrics);
        }
        sectors
    }
}

/// Risk proxy a company is measured against: one sector or a weighted mix.
#[derive(Debug, Clone, PartialEq)]
pub struct SectorBlend {
    /// Downside volatility
    pub sigma_down: f64,
    /// Total volatility
    pub sigma_total: f64,
    /// Maximum drawdown
    pub mdd: f64,
    /// Proxy daily returns
    pub returns: ReturnSeries,
    /// Sectors and their weights
    pub parts: Vec<(Arc<SectorMetrics>, f64)>,
}

impl SectorBlend {
    /// A single sector at full weight.
    pub fn single(metrics: Arc<SectorMetrics>) -> Self {
        Self {
            sigma_down: metrics.sigma_down,
            sigma_total: metrics.sigma_total,
            mdd: metrics.mdd,
            returns: metrics.returns.clone(),
            parts: vec![(metrics, 1.0)],
        }
    }

    /// Whether this blends more than one sector.
    pub fn is_mix(&self) -> bool {
        self.parts.len() > 1
    }
}

impl RiskProfile for SectorBlend {
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

/// Computes sector metrics from ETF prices.
#[derive(Debug)]
pub struct SectorAnalyzer<S> {
    fetcher: PriceFetcher<S>,
    settings: EngineSettings,
}

impl<S: QuoteSource> SectorAnalyzer<S> {
    /// Create an analyzer.
    pub const fn new(fetcher: PriceFetcher<S>, settings: EngineSettings) -> Self {
        Self { fetcher, settings }
    }

    /// Price fetcher.
    pub const fn fetcher(&self) -> &PriceFetcher<S> {
        &self.fetcher
    }

    /// Run settings.
    pub const fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Compute one sector.
    ///
    /// Every ticker must have data passing the quality check, otherwise the
    /// whole sector fails. Weights not summing to one are handled according to
    /// [`EngineSettings::weight_policy`]. Sample sizes and dates come from the
    /// first ticker.
    pub async fn compute(
        &self,
        name: &str,
        tickers: &[String],
        weights: &[f64],
    ) -> Result<SectorMetrics> {
        if tickers.is_empty() || tickers.len() != weights.len() {
            return Err(Error::invalid_config(
                name,
                format!("{} weights for {} tickers", weights.len(), tickers.len()),
            ));
        }
        if let Err(e) = check_weight_sum(weights.iter().copied()) {
            match self.settings.weight_policy {
                WeightPolicy::Warn => warn!(sector = %name, error = %e, "using weights as given"),
                WeightPolicy::Strict => return Err(e.into()),
            }
        }

        let mut per_ticker = Vec::with_capacity(tickers.len());
        for ticker in tickers {
            let prices = self
                .fetcher
                .fetch(ticker, &self.settings.request)
                .await
                .ok_or_else(|| Error::DataUnavailable {
                    ticker: ticker.clone(),
                })?;
            validate_data_quality(&prices, self.settings.min_days).inspect_err(|e| {
                warn!(sector = %name, ticker = %ticker, error = %e, "ticker failed quality check");
            })?;

            let metrics = SeriesMetrics::compute(&prices, &self.settings.metrics);
            debug!(
                sector = %name,
                ticker = %ticker,
                sigma_down = metrics.sigma_down,
                sigma_total = metrics.sigma_total,
                mdd = metrics.mdd,
                "ticker metrics"
            );
            per_ticker.push((prices, metrics));
        }

        let blended = weighted_blend(
            per_ticker
                .iter()
                .map(|(_, m)| m)
                .zip(weights.iter().copied()),
        );
        let return_parts: Vec<(&ReturnSeries, f64)> = per_ticker
            .iter()
            .map(|(_, m)| &m.returns)
            .zip(weights.iter().copied())
            .collect();
        let returns = blend_returns(&return_parts)?;

        let (first_prices, first_metrics) = &per_ticker[0];
        Ok(SectorMetrics {
            name: name.to_string(),
            tickers: tickers.to_vec(),
            weights: weights.to_vec(),
            sigma_down: blended.sigma_down,
            sigma_total: blended.sigma_total,
            mdd: blended.mdd,
            sample_days: first_metrics.sample_days,
            trading_days: first_metrics.trading_days,
            start_date: first_prices.first_date(),
            end_date: first_prices.last_date(),
            returns,
        })
    }

    /// Compute every configured sector, in order.
    ///
    /// A failing sector is logged and left out; the rest still compute.
    pub async fn compute_all(&self, config: &SectorsConfig) -> ComputedSectors {
        let mut computed = ComputedSectors::new();
        for spec in &config.sectors {
            if let Err(e) = spec.validate() {
                error!(sector = %spec.name, error = %e, "invalid sector configuration");
                continue;
            }
            match self.compute(&spec.name, &spec.tickers, &spec.weights).await {
                Ok(metrics) => {
                    info!(
                        sector = %spec.name,
                        sigma_down = metrics.sigma_down,
                        sigma_total = metrics.sigma_total,
                        mdd = metrics.mdd,
                        "sector computed"
                    );
                    computed.insert(metrics);
                }
                Err(e) => error!(sector = %spec.name, error = %e, "sector failed"),
            }
        }
        info!(
            computed = computed.len(),
            configured = config.sectors.len(),
            "sector batch finished"
        );
        computed
    }

    /// Blend already computed sectors by exposure weight.
    ///
    /// Every referenced sector must be in `computed`. Mix weights that don't
    /// sum to one only produce a warning.
    pub fn blend_across_sectors(
        &self,
        mix: &[(String, f64)],
        computed: &ComputedSectors,
    ) -> Result<SectorBlend> {
        let parts = mix
            .iter()
            .map(|(name, weight)| match computed.get(name) {
                Some(metrics) => Ok((Arc::clone(metrics), *weight)),
                None => {
                    error!(sector = %name, "sector mix references an uncomputed sector");
                    Err(MetricsError::MissingSector(name.clone()))
                }
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if let Err(e) = check_weight_sum(parts.iter().map(|(_, w)| *w)) {
            warn!(error = %e, "sector mix weights used as given");
        }

        let blended = weighted_blend(parts.iter().map(|(m, w)| (m, *w)));
        let return_parts: Vec<(&ReturnSeries, f64)> =
            parts.iter().map(|(m, w)| (&m.returns, *w)).collect();
        let returns = blend_returns(&return_parts)?;

        Ok(SectorBlend {
            sigma_down: blended.sigma_down,
            sigma_total: blended.sigma_total,
            mdd: blended.mdd,
            returns,
            parts,
        })
    }
}
