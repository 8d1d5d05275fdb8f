//! Tracing subscriber setup.
//!
//! `RUST_LOG` overrides `--log-level` entirely. Without it, HTTP and TLS
//! internals pulled in by the quote provider are held at `warn`.

use clap::ValueEnum;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Modules clamped to `warn` unless `RUST_LOG` says otherwise.
const NOISY_MODULES: &[&str] = &[
    "hyper",
    "hyper_util",
    "reqwest",
    "h2",
    "rustls",
    "yahoo_finance_api",
];

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub(crate) enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

fn build_filter(log_level: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let directives = NOISY_MODULES
        .iter()
        .fold(log_level.to_string(), |acc, module| format!("{acc},{module}=warn"));
    EnvFilter::new(directives)
}

/// Install the global subscriber. Logs go to stderr so stdout stays clean
/// for tables and summaries.
pub(crate) fn init_logging(log_level: &str, format: LogFormat) {
    let subscriber = tracing_subscriber::registry().with(build_filter(log_level));
    match format {
        LogFormat::Json => {
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(true)
                .with_target(true);
            let _ = subscriber.with(layer).try_init();
        }
        LogFormat::Pretty => {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true)
                .with_target(false);
            let _ = subscriber.with(layer).try_init();
        }
    }
    tracing::debug!(log_level, ?format, "logging initialized");
}
