//! Date-indexed price and return series.
//!
//! Both series keep dates strictly increasing with no duplicates. Construction
//! rejects anything else, so downstream math can assume ordering.

use crate::error::{DataError, Result};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Name of the column holding the adjusted close in fetched tables.
pub const ADJUSTED_CLOSE: &str = "adjusted_close";

fn check_ordering(symbol: &str, dates: &[NaiveDate]) -> Result<()> {
    for pair in dates.windows(2) {
        if pair[1] <= pair[0] {
            return Err(DataError::UnorderedSeries {
                symbol: symbol.to_string(),
                date: pair[1].to_string(),
            });
        }
    }
    Ok(())
}

/// Ordered sequence of (date, adjusted close) observations for one ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    symbol: String,
    dates: Vec<NaiveDate>,
    values: Vec<f64>,
}

impl PriceSeries {
    /// Build a series from parallel date/value vectors.
    ///
    /// Values may contain NaN to mark missing observations.
    pub fn new(symbol: impl Into<String>, dates: Vec<NaiveDate>, values: Vec<f64>) -> Result<Self> {
        let symbol = symbol.into();
        if dates.len() != values.len() {
            return Err(DataError::Parse(format!(
                "{symbol}: {} dates but {} values",
                dates.len(),
                values.len()
            )));
        }
        check_ordering(&symbol, &dates)?;
        Ok(Self {
            symbol,
            dates,
            values,
        })
    }

    /// Build a series from (date, value) pairs.
    pub fn from_points(
        symbol: impl Into<String>,
        points: impl IntoIterator<Item = (NaiveDate, f64)>,
    ) -> Result<Self> {
        let (dates, values) = points.into_iter().unzip();
        Self::new(symbol, dates, values)
    }

    /// Extract the adjusted close column of a fetched table.
    ///
    /// Rows with a missing date or a missing/non-finite close are dropped.
    /// Rows are put in date order; a repeated date keeps its last row.
    pub fn from_frame(symbol: &str, df: &DataFrame) -> Result<Self> {
        let dates = df.column("date")?.cast(&DataType::String)?;
        let dates = dates.str()?;
        let closes = df.column(ADJUSTED_CLOSE)?.f64()?;

        let mut points = Vec::with_capacity(df.height());
        for i in 0..df.height() {
            let (Some(date), Some(close)) = (dates.get(i), closes.get(i)) else {
                continue;
            };
            if !close.is_finite() {
                continue;
            }
            let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map_err(|e| DataError::Parse(format!("{symbol}: bad date {date}: {e}")))?;
            points.push((date, close));
        }

        points.sort_by_key(|(date, _)| *date);
        let mut deduped: Vec<(NaiveDate, f64)> = Vec::with_capacity(points.len());
        for (date, close) in points {
            match deduped.last_mut() {
                Some(last) if last.0 == date => last.1 = close,
                _ => deduped.push((date, close)),
            }
        }

        Self::from_points(symbol, deduped)
    }

    /// Ticker symbol.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Observation dates.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Observed prices, parallel to [`Self::dates`].
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of observations, missing ones included.
    pub const fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the series has no observations.
    pub const fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of finite observations.
    pub fn valid_len(&self) -> usize {
        self.values.iter().filter(|v| v.is_finite()).count()
    }

    /// Copy of the series without missing observations.
    pub fn dropna(&self) -> Self {
        let (dates, values) = self
            .dates
            .iter()
            .zip(&self.values)
            .filter(|(_, v)| v.is_finite())
            .map(|(d, v)| (*d, *v))
            .unzip();
        Self {
            symbol: self.symbol.clone(),
            dates,
            values,
        }
    }

    /// First observation date.
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    /// Last observation date.
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Iterate over (date, price) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.dates.iter().copied().zip(self.values.iter().copied())
    }

    /// The last `n` observations.
    pub fn tail(&self, n: usize) -> Vec<(NaiveDate, f64)> {
        let skip = self.len().saturating_sub(n);
        self.iter().skip(skip).collect()
    }
}

/// Daily simple returns, dated at the later of the two closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnSeries {
    dates: Vec<NaiveDate>,
    values: Vec<f64>,
}

impl ReturnSeries {
    /// Build a return series from parallel date/value vectors.
    pub fn new(dates: Vec<NaiveDate>, values: Vec<f64>) -> Result<Self> {
        if dates.len() != values.len() {
            return Err(DataError::Parse(format!(
                "returns: {} dates but {} values",
                dates.len(),
                values.len()
            )));
        }
        check_ordering("returns", &dates)?;
        Ok(Self { dates, values })
    }

    /// An empty series.
    pub const fn empty() -> Self {
        Self {
            dates: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Return dates.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Return values, parallel to [`Self::dates`].
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of returns.
    pub const fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the series has no returns.
    pub const fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over (date, return) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.dates.iter().copied().zip(self.values.iter().copied())
    }
}
