//! Quote data fetching from Yahoo Finance.

use crate::error::{DataError, Result};
use crate::fetcher::{FetchRequest, QuoteSource};
use chrono::{NaiveDate, NaiveTime, Utc};
use polars::prelude::*;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use yahoo_finance_api as yahoo;

/// Yahoo Finance quote provider with rate limiting.
pub struct YahooQuoteProvider {
    provider: yahoo::YahooConnector,
    rate_limit_delay: Duration,
}

impl std::fmt::Debug for YahooQuoteProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YahooQuoteProvider")
            .field("rate_limit_delay", &self.rate_limit_delay)
            .finish_non_exhaustive()
    }
}

fn to_offset(date: NaiveDate) -> Result<time::OffsetDateTime> {
    let ts = date.and_time(NaiveTime::MIN).and_utc().timestamp();
    time::OffsetDateTime::from_unix_timestamp(ts)
        .map_err(|e| DataError::TimeConversion(e.to_string()))
}

impl YahooQuoteProvider {
    /// Create a provider with the default rate limit (250 ms between requests).
    pub fn new() -> Result<Self> {
        Self::with_rate_limit(Duration::from_millis(250))
    }

    /// Create a provider with a custom delay applied after each request.
    pub fn with_rate_limit(rate_limit_delay: Duration) -> Result<Self> {
        Ok(Self {
            provider: yahoo::YahooConnector::new()?,
            rate_limit_delay,
        })
    }

    /// Fetch OHLCV data for a single symbol.
    ///
    /// An explicit `start` takes precedence over the request's period. A
    /// missing `end` means today.
    ///
    /// # Returns
    /// A Polars DataFrame with columns: symbol, date, open, high, low, close,
    /// volume, adjusted_close
    pub async fn fetch_quotes(&self, symbol: &str, request: &FetchRequest) -> Result<DataFrame> {
        if symbol.is_empty() {
            return Err(DataError::InvalidSymbol("Empty symbol".to_string()));
        }

        let response = match request.start {
            Some(start) => {
                let end = request.end.unwrap_or_else(|| Utc::now().date_naive());
                if start > end {
                    return Err(DataError::InvalidDateRange {
                        start: start.to_string(),
                        end: end.to_string(),
                    });
                }
                self.provider
                    .get_quote_history_interval(
                        symbol,
                        to_offset(start)?,
                        to_offset(end)?,
                        &request.interval,
                    )
                    .await?
            }
            None => {
                self.provider
                    .get_quote_period_interval(symbol, &request.period, &request.interval, false)
                    .await?
            }
        };

        let quotes = response
            .quotes()
            .map_err(|e| DataError::Source(e.to_string()))?;

        sleep(self.rate_limit_delay).await;

        if quotes.is_empty() {
            return Err(DataError::NoData {
                symbol: symbol.to_string(),
                reason: "No data returned from Yahoo Finance".to_string(),
            });
        }

        let dates: Vec<i64> = quotes.iter().map(|q| q.timestamp).collect();
        let opens: Vec<f64> = quotes.iter().map(|q| q.open).collect();
        let highs: Vec<f64> = quotes.iter().map(|q| q.high).collect();
        let lows: Vec<f64> = quotes.iter().map(|q| q.low).collect();
        let closes: Vec<f64> = quotes.iter().map(|q| q.close).collect();
        let volumes: Vec<u64> = quotes.iter().map(|q| q.volume).collect();
        let adj_closes: Vec<f64> = quotes.iter().map(|q| q.adjclose).collect();

        let mut df = DataFrame::new(vec![
            Series::new("timestamp".into(), dates).into(),
            Series::new("open".into(), opens).into(),
            Series::new("high".into(), highs).into(),
            Series::new("low".into(), lows).into(),
            Series::new("close".into(), closes).into(),
            Series::new("volume".into(), volumes).into(),
            Series::new("adjusted_close".into(), adj_closes).into(),
        ])?;

        let symbol_col: Column = Series::new("symbol".into(), vec![symbol; df.height()]).into();
        df.with_column(symbol_col)?;

        let df = df
            .lazy()
            .with_column(
                (col("timestamp") * lit(1_000_000_000))
                    .cast(DataType::Datetime(TimeUnit::Nanoseconds, None))
                    .cast(DataType::Date)
                    .alias("date"),
            )
            .select(&[
                col("symbol"),
                col("date"),
                col("open"),
                col("high"),
                col("low"),
                col("close"),
                col("volume"),
                col("adjusted_close"),
            ])
            .collect()?;

        Ok(df)
    }
}

impl QuoteSource for YahooQuoteProvider {
    fn fetch_table(
        &self,
        symbol: &str,
        request: &FetchRequest,
    ) -> impl Future<Output = Result<DataFrame>> + Send {
        self.fetch_quotes(symbol, request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_date_range() {
        let provider = YahooQuoteProvider::with_rate_limit(Duration::ZERO).unwrap();
        let request = FetchRequest::window(
            NaiveDate::from_ymd_opt(2024, 6, 1),
            NaiveDate::from_ymd_opt(2024, 1, 1),
        );

        let result = provider.fetch_quotes("AAPL", &request).await;
        assert!(matches!(result, Err(DataError::InvalidDateRange { .. })));
    }

    #[tokio::test]
    async fn test_invalid_symbol() {
        let provider = YahooQuoteProvider::with_rate_limit(Duration::ZERO).unwrap();
        let result = provider.fetch_quotes("", &FetchRequest::default()).await;
        assert!(matches!(result, Err(DataError::InvalidSymbol(_))));
    }

    #[test]
    fn test_to_offset_is_midnight_utc() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let offset = to_offset(date).unwrap();
        assert_eq!(offset.unix_timestamp(), 1_710_460_800);
    }
}
