//! SQLite caching layer for fetched price tables.
//!
//! Each entry is one full OHLCV table for a [`CacheKey`], stored alongside the
//! time it was fetched. Freshness is decided from that stored timestamp, never
//! from file metadata.

use crate::error::{DataError, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use polars::prelude::*;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Identity of one cached price table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Ticker symbol
    pub symbol: String,
    /// Explicit window start, if any
    pub start: Option<NaiveDate>,
    /// Explicit window end, if any
    pub end: Option<NaiveDate>,
    /// Lookback period used when no start is given (e.g. "1y")
    pub period: String,
    /// Bar interval (e.g. "1d")
    pub interval: String,
}

impl CacheKey {
    /// Stable string form used as the primary key.
    pub fn id(&self) -> String {
        let fmt = |d: Option<NaiveDate>| d.map(|d| d.to_string()).unwrap_or_default();
        format!(
            "{}|{}|{}|{}|{}",
            self.symbol,
            fmt(self.start),
            fmt(self.end),
            self.period,
            self.interval
        )
    }
}

/// SQLite cache for price tables.
#[derive(Debug)]
pub struct SqliteCache {
    conn: Connection,
}

impl SqliteCache {
    /// Create a new SQLite cache.
    ///
    /// # Arguments
    /// * `path` - Path to the SQLite database file
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let cache = Self { conn };
        cache.initialize_schema()?;
        Ok(cache)
    }

    /// Create an in-memory cache (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let cache = Self { conn };
        cache.initialize_schema()?;
        Ok(cache)
    }

    /// Initialize the database schema.
    fn initialize_schema(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS price_tables (
                cache_key TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                start_date TEXT,
                end_date TEXT,
                period TEXT NOT NULL,
                interval TEXT NOT NULL,
                row_count INTEGER NOT NULL,
                fetched_at TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_price_tables_symbol ON price_tables(symbol)",
            [],
        )?;

        // Price columns are nullable so gaps survive a round trip.
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS price_rows (
                cache_key TEXT NOT NULL,
                date TEXT NOT NULL,
                open REAL,
                high REAL,
                low REAL,
                close REAL,
                volume INTEGER,
                adjusted_close REAL,
                PRIMARY KEY (cache_key, date)
            )",
            [],
        )?;

        Ok(())
    }

    /// When the entry for `key` was fetched, if it exists.
    pub fn fetched_at(&self, key: &CacheKey) -> Result<Option<DateTime<Utc>>> {
        let stamp: Option<String> = self
            .conn
            .query_row(
                "SELECT fetched_at FROM price_tables WHERE cache_key = ?1",
                params![key.id()],
                |row| row.get(0),
            )
            .optional()?;

        stamp
            .map(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| DataError::Parse(format!("Invalid fetched_at {s}: {e}")))
            })
            .transpose()
    }

    /// Get the cached table for `key` if it is no older than `max_age`.
    pub fn get_table(&self, key: &CacheKey, max_age: Duration) -> Result<Option<DataFrame>> {
        self.get_table_at(key, max_age, Utc::now())
    }

    /// Same as [`Self::get_table`], evaluated at an explicit `now`.
    pub fn get_table_at(
        &self,
        key: &CacheKey,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<DataFrame>> {
        let Some(fetched_at) = self.fetched_at(key)? else {
            return Ok(None);
        };
        if now - fetched_at > max_age {
            return Ok(None);
        }

        let mut stmt = self.conn.prepare(
            "SELECT date, open, high, low, close, volume, adjusted_close
             FROM price_rows
             WHERE cache_key = ?1
             ORDER BY date ASC",
        )?;

        let mut dates = Vec::new();
        let mut opens = Vec::new();
        let mut highs = Vec::new();
        let mut lows = Vec::new();
        let mut closes = Vec::new();
        let mut volumes = Vec::new();
        let mut adj_closes = Vec::new();

        let rows = stmt.query_map(params![key.id()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<f64>>(1)?,
                row.get::<_, Option<f64>>(2)?,
                row.get::<_, Option<f64>>(3)?,
                row.get::<_, Option<f64>>(4)?,
                row.get::<_, Option<i64>>(5)?,
                row.get::<_, Option<f64>>(6)?,
            ))
        })?;

        for row in rows {
            let (date, open, high, low, close, volume, adj_close) = row?;
            dates.push(date);
            opens.push(open);
            highs.push(high);
            lows.push(low);
            closes.push(close);
            volumes.push(volume);
            adj_closes.push(adj_close);
        }

        let symbols = vec![key.symbol.as_str(); dates.len()];
        let df = DataFrame::new(vec![
            Series::new("symbol".into(), symbols).into(),
            Series::new("date".into(), dates).into(),
            Series::new("open".into(), opens).into(),
            Series::new("high".into(), highs).into(),
            Series::new("low".into(), lows).into(),
            Series::new("close".into(), closes).into(),
            Series::new("volume".into(), volumes).into(),
            Series::new("adjusted_close".into(), adj_closes).into(),
        ])?;

        let df = df
            .lazy()
            .with_column(col("date").cast(DataType::Date))
            .collect()?;

        Ok(Some(df))
    }

    /// Store a fetched table, replacing any previous entry for `key`.
    pub fn put_table(&self, key: &CacheKey, df: &DataFrame) -> Result<()> {
        self.put_table_at(key, df, Utc::now())
    }

    /// Same as [`Self::put_table`] with an explicit fetch timestamp.
    ///
    /// The delete and re-insert run in one transaction, so a reader never
    /// sees a half-written entry. A repeated date keeps its last row.
    pub fn put_table_at(
        &self,
        key: &CacheKey,
        df: &DataFrame,
        fetched_at: DateTime<Utc>,
    ) -> Result<()> {
        let dates = df.column("date")?.cast(&DataType::String)?;
        let dates = dates.str()?;
        let opens = df.column("open")?.cast(&DataType::Float64)?;
        let opens = opens.f64()?;
        let highs = df.column("high")?.cast(&DataType::Float64)?;
        let highs = highs.f64()?;
        let lows = df.column("low")?.cast(&DataType::Float64)?;
        let lows = lows.f64()?;
        let closes = df.column("close")?.cast(&DataType::Float64)?;
        let closes = closes.f64()?;
        let volumes = df.column("volume")?.cast(&DataType::Int64)?;
        let volumes = volumes.i64()?;
        let adj_closes = df.column("adjusted_close")?.cast(&DataType::Float64)?;
        let adj_closes = adj_closes.f64()?;

        let id = key.id();
        let tx = self.conn.unchecked_transaction()?;

        tx.execute("DELETE FROM price_rows WHERE cache_key = ?1", params![id])?;

        for i in 0..df.height() {
            let date = dates
                .get(i)
                .ok_or_else(|| DataError::Parse("Missing date".to_string()))?;

            tx.execute(
                "INSERT OR REPLACE INTO price_rows
                 (cache_key, date, open, high, low, close, volume, adjusted_close)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id,
                    date,
                    opens.get(i),
                    highs.get(i),
                    lows.get(i),
                    closes.get(i),
                    volumes.get(i),
                    adj_closes.get(i)
                ],
            )?;
        }

        tx.execute(
            "INSERT OR REPLACE INTO price_tables
             (cache_key, symbol, start_date, end_date, period, interval, row_count, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                key.symbol,
                key.start.map(|d| d.to_string()),
                key.end.map(|d| d.to_string()),
                key.period,
                key.interval,
                df.height() as i64,
                fetched_at.to_rfc3339()
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Delete cached entries, for one symbol or for everything.
    ///
    /// Returns the number of entries removed.
    pub fn clear(&self, symbol: Option<&str>) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let removed = match symbol {
            Some(symbol) => {
                tx.execute(
                    "DELETE FROM price_rows WHERE cache_key IN
                     (SELECT cache_key FROM price_tables WHERE symbol = ?1)",
                    params![symbol],
                )?;
                tx.execute(
                    "DELETE FROM price_tables WHERE symbol = ?1",
                    params![symbol],
                )?
            }
            None => {
                tx.execute("DELETE FROM price_rows", [])?;
                tx.execute("DELETE FROM price_tables", [])?
            }
        };
        tx.commit()?;
        Ok(removed)
    }

    /// Get cache statistics.
    pub fn get_stats(&self) -> Result<CacheStats> {
        let entries: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM price_tables", [], |row| row.get(0))?;

        let rows: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM price_rows", [], |row| row.get(0))?;

        let symbols: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT symbol) FROM price_tables",
            [],
            |row| row.get(0),
        )?;

        Ok(CacheStats {
            entries: entries as usize,
            rows: rows as usize,
            unique_symbols: symbols as usize,
        })
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cached tables
    pub entries: usize,
    /// Total number of cached price rows
    pub rows: usize,
    /// Number of unique symbols
    pub unique_symbols: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(symbol: &str, period: &str) -> CacheKey {
        CacheKey {
            symbol: symbol.to_string(),
            start: None,
            end: None,
            period: period.to_string(),
            interval: "1d".to_string(),
        }
    }

    fn table(symbol: &str) -> DataFrame {
        DataFrame::new(vec![
            Series::new("symbol".into(), vec![symbol; 3]).into(),
            Series::new("date".into(), vec!["2024-01-02", "2024-01-03", "2024-01-04"]).into(),
            Series::new("open".into(), vec![10.0, 11.0, 12.0]).into(),
            Series::new("high".into(), vec![10.5, 11.5, 12.5]).into(),
            Series::new("low".into(), vec![9.5, 10.5, 11.5]).into(),
            Series::new("close".into(), vec![10.2, 11.2, 12.2]).into(),
            Series::new("volume".into(), vec![100_u64, 200, 300]).into(),
            Series::new("adjusted_close".into(), vec![Some(10.1), None, Some(12.1)]).into(),
        ])
        .unwrap()
    }

    #[test]
    fn test_cache_initialization() {
        let cache = SqliteCache::in_memory();
        assert!(cache.is_ok());
    }

    #[test]
    fn test_key_id_distinguishes_windows() {
        let a = key("AAA", "1y");
        let mut b = key("AAA", "1y");
        b.start = NaiveDate::from_ymd_opt(2024, 1, 1);
        assert_ne!(a.id(), b.id());
        assert_ne!(a.id(), key("AAA", "2y").id());
    }

    #[test]
    fn test_put_and_get_round_trip_keeps_gaps() {
        let cache = SqliteCache::in_memory().unwrap();
        let k = key("AAA", "1y");
        cache.put_table(&k, &table("AAA")).unwrap();

        let df = cache.get_table(&k, Duration::days(1)).unwrap().unwrap();
        assert_eq!(df.height(), 3);
        assert_eq!(df.column("date").unwrap().dtype(), &DataType::Date);
        let adj = df.column("adjusted_close").unwrap().f64().unwrap();
        assert_eq!(adj.get(0), Some(10.1));
        assert_eq!(adj.get(1), None);
        let volume = df.column("volume").unwrap().i64().unwrap();
        assert_eq!(volume.get(2), Some(300));
    }

    #[test]
    fn test_stale_entry_is_absent() {
        let cache = SqliteCache::in_memory().unwrap();
        let k = key("AAA", "1y");
        let fetched = Utc::now() - Duration::days(3);
        cache.put_table_at(&k, &table("AAA"), fetched).unwrap();

        assert!(cache.get_table(&k, Duration::days(1)).unwrap().is_none());
        assert!(cache.get_table(&k, Duration::days(7)).unwrap().is_some());
    }

    #[test]
    fn test_put_replaces_previous_rows() {
        let cache = SqliteCache::in_memory().unwrap();
        let k = key("AAA", "1y");
        cache.put_table(&k, &table("AAA")).unwrap();
        cache.put_table(&k, &table("AAA").head(Some(1))).unwrap();

        let stats = cache.get_stats().unwrap();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.rows, 1);
    }

    #[test]
    fn test_missing_entry_is_absent() {
        let cache = SqliteCache::in_memory().unwrap();
        assert!(cache.get_table(&key("ZZZ", "1y"), Duration::days(1)).unwrap().is_none());
        assert!(cache.fetched_at(&key("ZZZ", "1y")).unwrap().is_none());
    }

    #[test]
    fn test_clear_by_symbol_and_all() {
        let cache = SqliteCache::in_memory().unwrap();
        cache.put_table(&key("AAA", "1y"), &table("AAA")).unwrap();
        cache.put_table(&key("AAA", "2y"), &table("AAA")).unwrap();
        cache.put_table(&key("BBB", "1y"), &table("BBB")).unwrap();

        assert_eq!(cache.clear(Some("AAA")).unwrap(), 2);
        let stats = cache.get_stats().unwrap();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.unique_symbols, 1);
        assert_eq!(stats.rows, 3);

        assert_eq!(cache.clear(None).unwrap(), 1);
        assert_eq!(cache.get_stats().unwrap().rows, 0);
    }
}
