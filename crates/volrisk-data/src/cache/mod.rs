//! Caching layer for fetched price tables.

pub mod sqlite;

pub use sqlite::{CacheKey, CacheStats, SqliteCache};
