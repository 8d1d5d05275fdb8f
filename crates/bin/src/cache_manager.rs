//! Location of the on-disk price cache.

use std::path::{Path, PathBuf};
use volrisk::data::{CacheStats, PriceFetcher, QuoteSource, fetcher::CACHE_FILE};

/// Platform cache directory for volrisk.
///
/// - Linux: `~/.cache/volrisk/`
/// - macOS: `~/Library/Caches/volrisk/`
/// - Windows: `%LOCALAPPDATA%\volrisk\`
pub(crate) fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("volrisk")
}

/// `--cache-dir` if given, else the platform default.
pub(crate) fn resolve_cache_dir(flag: Option<PathBuf>) -> PathBuf {
    flag.unwrap_or_else(default_cache_dir)
}

/// Print where the cache lives and what it holds.
pub(crate) fn print_cache_info<S: QuoteSource>(dir: &Path, fetcher: &PriceFetcher<S>) {
    println!("  Cache location: {}", dir.join(CACHE_FILE).display());
    match fetcher.cache_stats() {
        Ok(Some(CacheStats {
            entries,
            rows,
            unique_symbols,
        })) => println!("  Cached data: {entries} tables, {rows} rows, {unique_symbols} symbols"),
        Ok(None) => println!("  Cache: disabled"),
        Err(e) => println!("  Cache: unreadable ({e})"),
    }
}
