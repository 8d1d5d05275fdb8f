//! Errors raised while fetching, caching and shaping price data.

use thiserror::Error;

/// Result type for data operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Data layer errors.
///
/// The fetcher never surfaces these to engine callers; it logs them and
/// reports an absent series. They matter to the cache, the quote source
/// and [`PriceSeries`](crate::PriceSeries) construction.
#[derive(Debug, Error)]
pub enum DataError {
    /// The quote source failed to answer
    #[error("quote source error: {0}")]
    Source(String),

    /// The quote source answered with nothing for the request
    #[error("no data for {symbol}: {reason}")]
    NoData {
        /// Ticker symbol
        symbol: String,
        /// What came back instead
        reason: String,
    },

    /// Cache database failure
    #[error("cache database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Cached or fetched table has an unexpected shape
    #[error("malformed price table: {0}")]
    Parse(String),

    /// Frame manipulation failure
    #[error("dataframe error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    /// Window start after window end
    #[error("invalid window: start {start} is after end {end}")]
    InvalidDateRange {
        /// Window start
        start: String,
        /// Window end
        end: String,
    },

    /// Date outside what the quote source can represent
    #[error("time conversion error: {0}")]
    TimeConversion(String),

    /// Ticker rejected before any request was made
    #[error("invalid ticker: {0:?}")]
    InvalidSymbol(String),

    /// Dates not strictly increasing
    #[error("price series for {symbol} is not strictly increasing at {date}")]
    UnorderedSeries {
        /// Ticker symbol
        symbol: String,
        /// Offending date
        date: String,
    },

    /// Filesystem failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DataError {
    /// Whether the source answered but had nothing for the request.
    pub const fn is_empty_result(&self) -> bool {
        matches!(self, Self::NoData { .. })
    }
}

impl From<yahoo_finance_api::YahooError> for DataError {
    fn from(err: yahoo_finance_api::YahooError) -> Self {
        Self::Source(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_result_classification() {
        let empty = DataError::NoData {
            symbol: "XLK".into(),
            reason: "no quotes".into(),
        };
        assert!(empty.is_empty_result());
        assert!(!DataError::Source("timeout".into()).is_empty_result());
        assert_eq!(empty.to_string(), "no data for XLK: no quotes");
    }
}
