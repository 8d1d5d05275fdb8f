//! Deterministic in-memory quote source for unit tests.

use crate::config::EngineSettings;
use crate::sector::SectorAnalyzer;
use chrono::{Days, NaiveDate};
use polars::prelude::*;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use volrisk_data::{DataError, FetchRequest, PriceFetcher, PriceSeries, QuoteSource, RetryPolicy};

/// Serves fixed close paths; unknown symbols get an empty table.
#[derive(Debug, Default)]
pub(crate) struct StubSource {
    closes: HashMap<String, Vec<f64>>,
    calls: AtomicUsize,
}

fn dates(n: usize) -> Vec<NaiveDate> {
    let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    (0..n as u64).map(|i| start + Days::new(i)).collect()
}

impl StubSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(mut self, symbol: &str, closes: Vec<f64>) -> Self {
        self.closes.insert(symbol.to_string(), closes);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The series the fetcher will extract for `closes`.
    pub(crate) fn series(symbol: &str, closes: &[f64]) -> PriceSeries {
        PriceSeries::new(symbol, dates(closes.len()), closes.to_vec()).unwrap()
    }

    fn table(symbol: &str, closes: &[f64]) -> DataFrame {
        let n = closes.len();
        let dates: Vec<String> = dates(n).iter().map(|d| d.to_string()).collect();
        DataFrame::new(vec![
            Series::new("symbol".into(), vec![symbol; n]).into(),
            Series::new("date".into(), dates).into(),
            Series::new("open".into(), closes.to_vec()).into(),
            Series::new("high".into(), closes.to_vec()).into(),
            Series::new("low".into(), closes.to_vec()).into(),
            Series::new("close".into(), closes.to_vec()).into(),
            Series::new("volume".into(), vec![1_000_u64; n]).into(),
            Series::new("adjusted_close".into(), closes.to_vec()).into(),
        ])
        .unwrap()
        .lazy()
        .with_column(col("date").cast(DataType::Date))
        .collect()
        .unwrap()
    }
}

impl QuoteSource for StubSource {
    fn fetch_table(
        &self,
        symbol: &str,
        _request: &FetchRequest,
    ) -> impl Future<Output = Result<DataFrame, DataError>> + Send {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let table = self
            .closes
            .get(symbol)
            .map_or_else(DataFrame::empty, |c| Self::table(symbol, c));
        async move { Ok(table) }
    }
}

/// Price path starting at 100 whose daily returns cycle through
/// `amplitude * [-1, 1]` with a pattern set by `step`.
pub(crate) fn wave(n: usize, amplitude: f64, step: usize) -> Vec<f64> {
    let mut price = 100.0;
    let mut path = Vec::with_capacity(n);
    for i in 0..n {
        path.push(price);
        let r = amplitude * (((i * step) % 13) as f64 / 6.0 - 1.0);
        price *= 1.0 + r;
    }
    path
}

/// Analyzer over `source` with default settings, no cache and a single attempt.
pub(crate) fn analyzer(source: StubSource) -> SectorAnalyzer<StubSource> {
    let mut settings = EngineSettings::default();
    settings.retry = RetryPolicy::immediate(1);
    let fetcher = PriceFetcher::new(source).with_retry(settings.retry);
    SectorAnalyzer::new(fetcher, settings)
}
