//! Yahoo Finance price provider.

pub mod quotes;

pub use quotes::YahooQuoteProvider;
