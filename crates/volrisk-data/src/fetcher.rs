//! Cache-first price fetching with bounded retries.
//!
//! [`PriceFetcher`] sits between the engine and a [`QuoteSource`]. It serves
//! fresh cache entries without touching the source, otherwise tries the source
//! up to [`RetryPolicy::max_retries`] times, persists the full table and hands
//! back only the adjusted-close series. Failures are logged and surface as
//! `None`; they never propagate to the caller.

use crate::cache::{CacheKey, CacheStats, SqliteCache};
use crate::error::{DataError, Result};
use crate::series::{ADJUSTED_CLOSE, PriceSeries};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// File name of the price cache inside a cache directory.
pub const CACHE_FILE: &str = "prices.sqlite";

/// Source of raw OHLCV tables.
///
/// Implementors return a frame with the columns `symbol, date, open, high,
/// low, close, volume, adjusted_close`. An empty frame or
/// [`DataError::NoData`] both mean "the source had nothing".
pub trait QuoteSource {
    /// Fetch the full table for `symbol` over the request's window.
    fn fetch_table(
        &self,
        symbol: &str,
        request: &FetchRequest,
    ) -> impl Future<Output = Result<DataFrame>> + Send;
}

/// Price window and cache behaviour for one fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Window start; takes precedence over `period` when set
    pub start: Option<NaiveDate>,
    /// Window end
    pub end: Option<NaiveDate>,
    /// Lookback period when no start is given
    pub period: String,
    /// Bar interval
    pub interval: String,
    /// Read and write the cache
    pub use_cache: bool,
    /// Ignore cached entries but still refresh them
    pub force_refresh: bool,
}

impl Default for FetchRequest {
    fn default() -> Self {
        Self {
            start: None,
            end: None,
            period: "1y".to_string(),
            interval: "1d".to_string(),
            use_cache: true,
            force_refresh: false,
        }
    }
}

impl FetchRequest {
    /// Request a lookback period such as `"1y"` or `"2y"`.
    pub fn period(period: impl Into<String>) -> Self {
        Self {
            period: period.into(),
            ..Self::default()
        }
    }

    /// Request an explicit date window.
    pub fn window(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self {
            start,
            end,
            ..Self::default()
        }
    }

    /// Cache key for `symbol` under this request.
    pub fn cache_key(&self, symbol: &str) -> CacheKey {
        CacheKey {
            symbol: symbol.to_string(),
            start: self.start,
            end: self.end,
            period: self.period.clone(),
            interval: self.interval.clone(),
        }
    }
}

/// Attempt count and backoff delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts against the source
    pub max_retries: u32,
    /// Delay after an empty result
    pub empty_backoff: Duration,
    /// Delay after a failed request
    pub error_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            empty_backoff: Duration::from_secs(1),
            error_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Retry without waiting between attempts.
    pub const fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            empty_backoff: Duration::ZERO,
            error_backoff: Duration::ZERO,
        }
    }
}

/// Cache-first fetcher over a [`QuoteSource`].
#[derive(Debug)]
pub struct PriceFetcher<S> {
    source: S,
    cache: Option<SqliteCache>,
    max_age: chrono::Duration,
    retry: RetryPolicy,
}

impl<S: QuoteSource> PriceFetcher<S> {
    /// Create a fetcher without a cache.
    pub fn new(source: S) -> Self {
        Self {
            source,
            cache: None,
            max_age: chrono::Duration::days(1),
            retry: RetryPolicy::default(),
        }
    }

    /// Attach a cache.
    pub fn with_cache(mut self, cache: SqliteCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Attach the cache file inside `dir`, creating the directory if needed.
    pub fn with_cache_dir<P: AsRef<Path>>(self, dir: P) -> Result<Self> {
        std::fs::create_dir_all(dir.as_ref())?;
        let cache = SqliteCache::new(dir.as_ref().join(CACHE_FILE))?;
        Ok(self.with_cache(cache))
    }

    /// Maximum age of a cache entry still considered fresh.
    pub const fn with_max_age(mut self, max_age: chrono::Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Replace the retry policy.
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The underlying source.
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// Fetch the adjusted-close series for `symbol`.
    ///
    /// Returns `None` when every attempt came back empty or failed.
    pub async fn fetch(&self, symbol: &str, request: &FetchRequest) -> Option<PriceSeries> {
        let key = request.cache_key(symbol);

        if request.use_cache && !request.force_refresh {
            if let Some(series) = self.load_cached(symbol, &key) {
                return Some(series);
            }
        }

        let attempts = self.retry.max_retries;
        for attempt in 1..=attempts {
            let last = attempt == attempts;
            match self.source.fetch_table(symbol, request).await {
                Ok(df) if df.height() > 0 => {
                    return self.accept(symbol, &key, request, df);
                }
                Ok(_) => {
                    warn!(ticker = %symbol, attempt, attempts, "empty price table");
                    if !last {
                        sleep(self.retry.empty_backoff).await;
                    }
                }
                Err(e) if e.is_empty_result() => {
                    warn!(ticker = %symbol, attempt, attempts, error = %e, "empty price table");
                    if !last {
                        sleep(self.retry.empty_backoff).await;
                    }
                }
                Err(e) => {
                    warn!(ticker = %symbol, attempt, attempts, error = %e, "price fetch failed");
                    if !last {
                        sleep(self.retry.error_backoff).await;
                    }
                }
            }
        }

        error!(ticker = %symbol, attempts, "giving up on price fetch");
        None
    }

    /// Fetch several symbols in order, skipping the ones that fail.
    pub async fn fetch_many(
        &self,
        symbols: &[String],
        request: &FetchRequest,
    ) -> Vec<(String, PriceSeries)> {
        let mut results = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            info!(ticker = %symbol, "fetching prices");
            match self.fetch(symbol, request).await {
                Some(series) => results.push((symbol.clone(), series)),
                None => warn!(ticker = %symbol, "skipping ticker without data"),
            }
        }
        results
    }

    /// Delete cache entries for `symbol`, or all entries.
    ///
    /// Returns the number of entries removed.
    pub fn clear_cache(&self, symbol: Option<&str>) -> Result<usize> {
        let Some(cache) = &self.cache else {
            return Ok(0);
        };
        let removed = cache.clear(symbol)?;
        info!(removed, ticker = symbol.unwrap_or("*"), "cleared price cache");
        Ok(removed)
    }

    /// Statistics of the attached cache.
    pub fn cache_stats(&self) -> Result<Option<CacheStats>> {
        self.cache.as_ref().map(SqliteCache::get_stats).transpose()
    }

    fn load_cached(&self, symbol: &str, key: &CacheKey) -> Option<PriceSeries> {
        let cache = self.cache.as_ref()?;
        match cache.get_table(key, self.max_age) {
            Ok(Some(df)) => match Self::extract(symbol, df) {
                Ok(series) => {
                    debug!(ticker = %symbol, rows = series.len(), "price cache hit");
                    Some(series)
                }
                Err(e) => {
                    warn!(ticker = %symbol, error = %e, "unreadable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(ticker = %symbol, error = %e, "price cache read failed");
                None
            }
        }
    }

    fn accept(
        &self,
        symbol: &str,
        key: &CacheKey,
        request: &FetchRequest,
        df: DataFrame,
    ) -> Option<PriceSeries> {
        let df = match with_adjusted_close(df) {
            Ok(df) => df,
            Err(e) => {
                error!(ticker = %symbol, error = %e, "price table has no close column");
                return None;
            }
        };

        if request.use_cache {
            if let Some(cache) = &self.cache {
                if let Err(e) = cache.put_table(key, &df) {
                    warn!(ticker = %symbol, error = %e, "price cache write failed");
                }
            }
        }

        match Self::extract(symbol, df) {
            Ok(series) => {
                debug!(ticker = %symbol, rows = series.len(), "fetched prices");
                Some(series)
            }
            Err(e) => {
                error!(ticker = %symbol, error = %e, "unusable price table");
                None
            }
        }
    }

    fn extract(symbol: &str, df: DataFrame) -> Result<PriceSeries> {
        let series = PriceSeries::from_frame(symbol, &df)?;
        if series.is_empty() {
            return Err(DataError::NoData {
                symbol: symbol.to_string(),
                reason: "no adjusted close values".to_string(),
            });
        }
        Ok(series)
    }
}

/// Fill a missing adjusted close from the raw close.
fn with_adjusted_close(df: DataFrame) -> Result<DataFrame> {
    if df.column(ADJUSTED_CLOSE).is_ok() {
        return Ok(df);
    }
    Ok(df
        .lazy()
        .with_column(col("close").alias(ADJUSTED_CLOSE))
        .collect()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays scripted responses; repeats the last one when exhausted.
    #[derive(Debug)]
    struct ScriptedSource {
        responses: Mutex<Vec<Result<DataFrame>>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<DataFrame>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn next(&self) -> Result<DataFrame> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                responses.remove(0)
            } else {
                match responses.first() {
                    Some(Ok(df)) => Ok(df.clone()),
                    Some(Err(e)) => Err(DataError::Source(e.to_string())),
                    None => Ok(DataFrame::empty()),
                }
            }
        }
    }

    impl QuoteSource for ScriptedSource {
        fn fetch_table(
            &self,
            _symbol: &str,
            _request: &FetchRequest,
        ) -> impl Future<Output = Result<DataFrame>> + Send {
            let response = self.next();
            async move { response }
        }
    }

    fn table(symbol: &str, closes: &[Option<f64>]) -> DataFrame {
        let n = closes.len();
        let dates: Vec<String> = (0..n)
            .map(|i| format!("2024-01-{:02}", i + 1))
            .collect();
        let raw: Vec<f64> = closes.iter().map(|c| c.unwrap_or(0.0)).collect();
        DataFrame::new(vec![
            Series::new("symbol".into(), vec![symbol; n]).into(),
            Series::new("date".into(), dates).into(),
            Series::new("open".into(), raw.clone()).into(),
            Series::new("high".into(), raw.clone()).into(),
            Series::new("low".into(), raw.clone()).into(),
            Series::new("close".into(), raw).into(),
            Series::new("volume".into(), vec![1_000_u64; n]).into(),
            Series::new(ADJUSTED_CLOSE.into(), closes.to_vec()).into(),
        ])
        .unwrap()
        .lazy()
        .with_column(col("date").cast(DataType::Date))
        .collect()
        .unwrap()
    }

    fn fetcher(source: ScriptedSource, retries: u32) -> PriceFetcher<ScriptedSource> {
        PriceFetcher::new(source)
            .with_cache(SqliteCache::in_memory().unwrap())
            .with_retry(RetryPolicy::immediate(retries))
    }

    #[tokio::test]
    async fn test_fetch_drops_missing_closes() {
        let source = ScriptedSource::new(vec![Ok(table("AAA", &[Some(1.0), None, Some(3.0)]))]);
        let fetcher = fetcher(source, 2);

        let series = fetcher.fetch("AAA", &FetchRequest::default()).await.unwrap();
        assert_eq!(series.values(), &[1.0, 3.0]);
        assert_eq!(fetcher.source().calls(), 1);
    }

    #[tokio::test]
    async fn test_fresh_cache_skips_source() {
        let source = ScriptedSource::new(vec![Ok(table("AAA", &[Some(1.0), Some(2.0)]))]);
        let fetcher = fetcher(source, 2);
        let request = FetchRequest::default();

        let first = fetcher.fetch("AAA", &request).await.unwrap();
        let second = fetcher.fetch("AAA", &request).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(fetcher.source().calls(), 1);

        let stats = fetcher.cache_stats().unwrap().unwrap();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.rows, 2);
    }

    #[tokio::test]
    async fn test_force_refresh_hits_source() {
        let source = ScriptedSource::new(vec![Ok(table("AAA", &[Some(1.0), Some(2.0)]))]);
        let fetcher = fetcher(source, 2);

        fetcher.fetch("AAA", &FetchRequest::default()).await.unwrap();
        let request = FetchRequest {
            force_refresh: true,
            ..FetchRequest::default()
        };
        fetcher.fetch("AAA", &request).await.unwrap();
        assert_eq!(fetcher.source().calls(), 2);
    }

    #[tokio::test]
    async fn test_stale_cache_refetches() {
        let source = ScriptedSource::new(vec![Ok(table("AAA", &[Some(1.0), Some(2.0)]))]);
        let fetcher = fetcher(source, 2).with_max_age(chrono::Duration::zero());
        let request = FetchRequest::default();

        fetcher.fetch("AAA", &request).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        fetcher.fetch("AAA", &request).await.unwrap();
        assert_eq!(fetcher.source().calls(), 2);
    }

    #[tokio::test]
    async fn test_retries_after_empty_then_succeeds() {
        let source = ScriptedSource::new(vec![
            Ok(DataFrame::empty()),
            Ok(table("AAA", &[Some(5.0), Some(6.0)])),
        ]);
        let fetcher = fetcher(source, 2);

        let series = fetcher.fetch("AAA", &FetchRequest::default()).await.unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(fetcher.source().calls(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_return_none() {
        let source = ScriptedSource::new(vec![Err(DataError::Source("boom".to_string()))]);
        let fetcher = fetcher(source, 3);

        assert!(fetcher.fetch("AAA", &FetchRequest::default()).await.is_none());
        assert_eq!(fetcher.source().calls(), 3);
        assert_eq!(fetcher.cache_stats().unwrap().unwrap().entries, 0);
    }

    #[tokio::test]
    async fn test_missing_data_counts_as_empty() {
        let source = ScriptedSource::new(vec![Err(DataError::NoData {
            symbol: "AAA".to_string(),
            reason: "none".to_string(),
        })]);
        let fetcher = fetcher(source, 2);
        assert!(fetcher.fetch("AAA", &FetchRequest::default()).await.is_none());
        assert_eq!(fetcher.source().calls(), 2);
    }

    #[tokio::test]
    async fn test_fetch_many_skips_failures() {
        let source = ScriptedSource::new(vec![
            Ok(table("AAA", &[Some(1.0), Some(2.0)])),
            Ok(DataFrame::empty()),
            Ok(DataFrame::empty()),
            Ok(table("CCC", &[Some(3.0), Some(4.0)])),
        ]);
        let fetcher = fetcher(source, 2);
        let symbols = vec!["AAA".to_string(), "BBB".to_string(), "CCC".to_string()];

        let results = fetcher.fetch_many(&symbols, &FetchRequest::default()).await;
        let names: Vec<&str> = results.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(names, vec!["AAA", "CCC"]);
    }

    #[tokio::test]
    async fn test_clear_cache() {
        let source = ScriptedSource::new(vec![Ok(table("AAA", &[Some(1.0), Some(2.0)]))]);
        let fetcher = fetcher(source, 2);
        fetcher.fetch("AAA", &FetchRequest::period("1y")).await.unwrap();
        fetcher.fetch("AAA", &FetchRequest::period("2y")).await.unwrap();

        assert_eq!(fetcher.clear_cache(Some("BBB")).unwrap(), 0);
        assert_eq!(fetcher.clear_cache(Some("AAA")).unwrap(), 2);
        assert_eq!(fetcher.clear_cache(None).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cache_dir_persists_between_fetchers() {
        let dir = tempfile::tempdir().unwrap();
        let request = FetchRequest::default();

        let first = PriceFetcher::new(ScriptedSource::new(vec![Ok(table(
            "AAA",
            &[Some(1.0), Some(2.0)],
        ))]))
        .with_cache_dir(dir.path())
        .unwrap();
        first.fetch("AAA", &request).await.unwrap();

        let second = PriceFetcher::new(ScriptedSource::new(vec![]))
            .with_cache_dir(dir.path())
            .unwrap();
        let series = second.fetch("AAA", &request).await.unwrap();
        assert_eq!(series.values(), &[1.0, 2.0]);
        assert_eq!(second.source().calls(), 0);
    }

    #[tokio::test]
    async fn test_repeated_trailing_bar_keeps_latest_close() {
        let mut df = table("AAA", &[Some(1.0), Some(2.0), Some(3.0)]);
        let latest = table("AAA", &[Some(1.0), Some(2.0), Some(3.5)]).slice(2, 1);
        df.vstack_mut(&latest).unwrap();
        let fetcher = fetcher(ScriptedSource::new(vec![Ok(df)]), 2);
        let request = FetchRequest::default();

        let series = fetcher.fetch("AAA", &request).await.unwrap();
        assert_eq!(series.values(), &[1.0, 2.0, 3.5]);
        assert_eq!(series.len(), 3);

        let cached = fetcher.fetch("AAA", &request).await.unwrap();
        assert_eq!(cached, series);
        assert_eq!(fetcher.source().calls(), 1);
        assert_eq!(fetcher.cache_stats().unwrap().unwrap().rows, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_depends_on_failure_kind() {
        let source = ScriptedSource::new(vec![
            Ok(DataFrame::empty()),
            Err(DataError::Source("timeout".to_string())),
            Ok(table("AAA", &[Some(1.0), Some(2.0)])),
        ]);
        let fetcher = PriceFetcher::new(source).with_retry(RetryPolicy {
            max_retries: 3,
            empty_backoff: Duration::from_secs(1),
            error_backoff: Duration::from_secs(5),
        });

        let started = tokio::time::Instant::now();
        let series = fetcher.fetch("AAA", &FetchRequest::default()).await;
        assert!(series.is_some());
        assert_eq!(fetcher.source().calls(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_backoff_after_last_attempt() {
        let source = ScriptedSource::new(vec![Err(DataError::Source("down".to_string()))]);
        let fetcher = PriceFetcher::new(source).with_retry(RetryPolicy {
            max_retries: 2,
            empty_backoff: Duration::from_secs(1),
            error_backoff: Duration::from_secs(5),
        });

        let started = tokio::time::Instant::now();
        assert!(fetcher.fetch("AAA", &FetchRequest::default()).await.is_none());
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }

    #[test]
    fn test_adjusted_close_falls_back_to_close() {
        let df = DataFrame::new(vec![
            Series::new("date".into(), vec!["2024-01-01"]).into(),
            Series::new("close".into(), vec![7.0]).into(),
        ])
        .unwrap();
        let df = with_adjusted_close(df).unwrap();
        let adj = df.column(ADJUSTED_CLOSE).unwrap().f64().unwrap();
        assert_eq!(adj.get(0), Some(7.0));
    }
}
