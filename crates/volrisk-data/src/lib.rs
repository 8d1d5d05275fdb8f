#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/volrisk/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod error;
pub mod fetcher;
pub mod series;
pub mod yahoo;

pub use cache::{CacheKey, CacheStats, SqliteCache};
pub use error::{DataError, Result};
pub use fetcher::{FetchRequest, PriceFetcher, QuoteSource, RetryPolicy};
pub use series::{PriceSeries, ReturnSeries};
pub use yahoo::YahooQuoteProvider;

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
