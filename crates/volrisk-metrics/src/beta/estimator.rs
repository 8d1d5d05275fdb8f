//! Beta estimation with overlap checks, fallback and memoization.

#[cfg(feature = "robust")]
use super::HuberRegression;
use super::{
    BetaDiagnostics, DEFAULT_MIN_OVERLAP, OlsRegression, RegressionMethod, RegressionStrategy,
    align,
};
use crate::error::BetaError;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use tracing::warn;
use volrisk_data::ReturnSeries;

/// Content fingerprint of a return series.
fn fingerprint(series: &ReturnSeries) -> u64 {
    let mut hasher = DefaultHasher::new();
    for (date, value) in series.iter() {
        date.hash(&mut hasher);
        value.to_bits().hash(&mut hasher);
    }
    hasher.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct MemoKey {
    stock: u64,
    sector: u64,
    method: RegressionMethod,
    fallback: Option<u64>,
}

/// Resolve a requested method to an available strategy.
///
/// Without the `robust` feature a Huber request resolves to OLS, with a
/// warning.
fn resolve_strategy(method: RegressionMethod) -> Box<dyn RegressionStrategy> {
    match method {
        RegressionMethod::Ols => Box::new(OlsRegression),
        #[cfg(feature = "robust")]
        RegressionMethod::Huber => Box::new(HuberRegression::default()),
        #[cfg(not(feature = "robust"))]
        RegressionMethod::Huber => {
            warn!("robust regression not compiled in; using OLS for beta");
            Box::new(OlsRegression)
        }
    }
}

/// Estimates stock beta against a sector proxy.
#[derive(Debug)]
pub struct BetaEstimator {
    strategy: Box<dyn RegressionStrategy>,
    min_overlap: usize,
    memo: HashMap<MemoKey, (f64, BetaDiagnostics)>,
}

impl Default for BetaEstimator {
    fn default() -> Self {
        Self::new(RegressionMethod::Ols, DEFAULT_MIN_OVERLAP)
    }
}

impl BetaEstimator {
    /// Create an estimator, resolving `method` to an available strategy.
    pub fn new(method: RegressionMethod, min_overlap: usize) -> Self {
        Self::with_strategy(resolve_strategy(method), min_overlap)
    }

    /// Create an estimator around an explicit strategy.
    pub fn with_strategy(strategy: Box<dyn RegressionStrategy>, min_overlap: usize) -> Self {
        Self {
            strategy,
            min_overlap,
            memo: HashMap::new(),
        }
    }

    /// Method actually used for fitting.
    pub fn method(&self) -> RegressionMethod {
        self.strategy.method()
    }

    /// Minimum number of common observations.
    pub const fn min_overlap(&self) -> usize {
        self.min_overlap
    }

    /// Align the two series and fit the regression.
    pub fn estimate(
        &self,
        stock: &ReturnSeries,
        sector: &ReturnSeries,
    ) -> Result<(f64, BetaDiagnostics), BetaError> {
        let aligned = align(stock, sector);
        if aligned.len() < self.min_overlap {
            return Err(BetaError::InsufficientOverlap {
                required: self.min_overlap,
                actual: aligned.len(),
            });
        }
        let diagnostics = self.strategy.fit(&aligned.sector, &aligned.stock)?;
        Ok((diagnostics.beta, diagnostics))
    }

    /// Like [`Self::estimate`], substituting `fallback` when the fit fails.
    pub fn estimate_or(
        &self,
        stock: &ReturnSeries,
        sector: &ReturnSeries,
        fallback: Option<f64>,
    ) -> Result<(f64, BetaDiagnostics), BetaError> {
        match (self.estimate(stock, sector), fallback) {
            (Ok(result), _) => Ok(result),
            (Err(e), Some(beta)) => {
                warn!(error = %e, fallback = beta, "beta regression failed; using fallback");
                Ok((beta, BetaDiagnostics::fallback(beta, &e)))
            }
            (Err(e), None) => Err(e),
        }
    }

    /// Memoized [`Self::estimate_or`].
    ///
    /// Results are keyed by the contents of both series, the method and the
    /// fallback, so repeated calls on equal inputs reuse the first answer.
    /// Failures are not memoized.
    pub fn calculate(
        &mut self,
        stock: &ReturnSeries,
        sector: &ReturnSeries,
        fallback: Option<f64>,
        use_cache: bool,
    ) -> Result<(f64, BetaDiagnostics), BetaError> {
        if !use_cache {
            return self.estimate_or(stock, sector, fallback);
        }

        let key = MemoKey {
            stock: fingerprint(stock),
            sector: fingerprint(sector),
            method: self.method(),
            fallback: fallback.map(f64::to_bits),
        };
        if let Some(hit) = self.memo.get(&key) {
            return Ok(hit.clone());
        }

        let result = self.estimate_or(stock, sector, fallback)?;
        self.memo.insert(key, result.clone());
        Ok(result)
    }

    /// Number of memoized results.
    pub fn cache_len(&self) -> usize {
        self.memo.len()
    }

    /// Drop all memoized results.
    pub fn clear_cache(&mut self) {
        self.memo.clear();
    }
}

/// One-shot beta estimate.
pub fn calculate_beta(
    stock: &ReturnSeries,
    sector: &ReturnSeries,
    method: RegressionMethod,
    min_overlap: usize,
    fallback: Option<f64>,
) -> Result<(f64, BetaDiagnostics), BetaError> {
    BetaEstimator::new(method, min_overlap).estimate_or(stock, sector, fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beta::FitMethod;
    use approx::assert_relative_eq;
    use chrono::{Days, NaiveDate};
    use rstest::rstest;

    fn series(values: impl IntoIterator<Item = f64>) -> ReturnSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let values: Vec<f64> = values.into_iter().collect();
        let dates = (0..values.len() as u64).map(|i| start + Days::new(i)).collect();
        ReturnSeries::new(dates, values).unwrap()
    }

    fn sector_returns(n: usize) -> ReturnSeries {
        series((0..n).map(|i| ((i * 11) % 17) as f64 / 1000.0 - 0.008))
    }

    fn stock_returns(sector: &ReturnSeries, beta: f64) -> ReturnSeries {
        series(sector.values().iter().map(|r| 0.0005 + beta * r))
    }

    #[rstest]
    #[case(RegressionMethod::Ols)]
    #[case(RegressionMethod::Huber)]
    fn test_recovers_beta(#[case] method: RegressionMethod) {
        let sector = sector_returns(120);
        let stock = stock_returns(&sector, 1.15);

        let (beta, diag) = calculate_beta(&stock, &sector, method, 50, None).unwrap();
        assert_relative_eq!(beta, 1.15, epsilon = 1e-8);
        assert_eq!(diag.n_obs, 120);
        assert_relative_eq!(diag.r_squared, 1.0, epsilon = 1e-8);
    }

    #[test]
    fn test_insufficient_overlap() {
        let sector = sector_returns(40);
        let stock = stock_returns(&sector, 1.0);

        let result = calculate_beta(&stock, &sector, RegressionMethod::Ols, 50, None);
        assert!(matches!(
            result,
            Err(BetaError::InsufficientOverlap {
                required: 50,
                actual: 40
            })
        ));
    }

    #[test]
    fn test_fallback_on_degenerate_sector() {
        let sector = series(vec![0.01; 80]);
        let stock = sector_returns(80);

        let (beta, diag) =
            calculate_beta(&stock, &sector, RegressionMethod::Ols, 50, Some(0.85)).unwrap();
        assert_eq!(beta, 0.85);
        assert_eq!(diag.method, FitMethod::Fallback);
        assert!(diag.error.is_some());

        let result = calculate_beta(&stock, &sector, RegressionMethod::Ols, 50, None);
        assert!(matches!(result, Err(BetaError::DegenerateRegression)));
    }

    #[test]
    fn test_memoization_and_clear() {
        let sector = sector_returns(100);
        let stock = stock_returns(&sector, 0.9);
        let mut estimator = BetaEstimator::default();

        let first = estimator.calculate(&stock, &sector, None, true).unwrap();
        let second = estimator.calculate(&stock.clone(), &sector, None, true).unwrap();
        assert_eq!(first, second);
        assert_eq!(estimator.cache_len(), 1);

        estimator.calculate(&stock, &sector, None, false).unwrap();
        assert_eq!(estimator.cache_len(), 1);

        estimator.clear_cache();
        assert_eq!(estimator.cache_len(), 0);
    }

    #[test]
    fn test_failures_are_not_memoized() {
        let sector = sector_returns(10);
        let stock = stock_returns(&sector, 1.0);
        let mut estimator = BetaEstimator::default();

        assert!(estimator.calculate(&stock, &sector, None, true).is_err());
        assert_eq!(estimator.cache_len(), 0);
    }

    #[test]
    fn test_resolved_method() {
        assert_eq!(BetaEstimator::default().method(), RegressionMethod::Ols);
        let huber = BetaEstimator::new(RegressionMethod::Huber, 50);
        if cfg!(feature = "robust") {
            assert_eq!(huber.method(), RegressionMethod::Huber);
        } else {
            assert_eq!(huber.method(), RegressionMethod::Ols);
        }
    }
}
