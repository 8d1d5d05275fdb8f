//! volrisk CLI binary.
//!
//! Fetches prices, computes sector risk proxies and ranks companies by
//! value-to-risk.

mod cache_manager;
mod logging;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use logging::LogFormat;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration as StdDuration;
use volrisk::data::{FetchRequest, PriceFetcher, YahooQuoteProvider};
use volrisk::metrics::beta::RegressionMethod;
use volrisk::output::{DEFAULT_TOP_N, ExportFormat, RankingSummary};
use volrisk::{
    CompaniesConfig, EngineSettings, Ranker, SectorAnalyzer, SectorsConfig, WeightPolicy,
    rank_and_export,
};

#[derive(Parser)]
#[command(name = "volrisk")]
#[command(about = "volrisk: value-to-risk ranking against sector ETF proxies", long_about = None)]
#[command(version)]
struct Cli {
    /// Directory holding the price cache (default: platform cache dir)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Disable caching (always fetch fresh data)
    #[arg(long, global = true)]
    no_cache: bool,

    /// Base log level; `RUST_LOG` takes precedence
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Price window shared by the data-reading commands.
#[derive(Args, Debug, Clone)]
struct Window {
    /// Lookback period when no start date is given
    #[arg(long, default_value = "1y")]
    period: String,

    /// Start date (YYYY-MM-DD)
    #[arg(long)]
    start: Option<NaiveDate>,

    /// End date (YYYY-MM-DD)
    #[arg(long)]
    end: Option<NaiveDate>,
}

/// Metric knobs shared by `calc-sector` and `rank`.
#[derive(Args, Debug, Clone)]
struct MetricArgs {
    /// Minimum acceptable return for downside volatility
    #[arg(long, default_value_t = 0.0)]
    mar: f64,

    /// Minimum valid prices per ticker
    #[arg(long, default_value_t = volrisk::metrics::quality::DEFAULT_MIN_DAYS)]
    min_days: usize,

    /// Reject sectors whose ticker weights don't sum to one
    #[arg(long)]
    strict_weights: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch one price series and show its tail
    Fetch {
        /// Ticker symbol
        ticker: String,

        #[command(flatten)]
        window: Window,

        /// Bar interval
        #[arg(long, default_value = "1d")]
        interval: String,

        /// Ignore cached data but refresh the cache
        #[arg(long)]
        force: bool,
    },

    /// Compute blended risk metrics for every configured sector
    CalcSector {
        /// Sector configuration file
        #[arg(long, default_value = "sectors.yaml")]
        config: PathBuf,

        #[command(flatten)]
        window: Window,

        #[command(flatten)]
        metrics: MetricArgs,
    },

    /// Rank companies by value-to-risk and export the report
    Rank {
        /// Company configuration file
        #[arg(long, default_value = "companies.yaml")]
        companies: PathBuf,

        /// Sector configuration file
        #[arg(long, default_value = "sectors.yaml")]
        sectors: PathBuf,

        /// Report path; CSV output adds `_detail` and `_sectors` companions
        #[arg(long, default_value = "ranking.csv")]
        output: PathBuf,

        /// Report format (csv, json, json-pretty)
        #[arg(long, default_value = "csv")]
        format: ExportFormat,

        /// Rows shown in the terminal summary
        #[arg(long, default_value_t = DEFAULT_TOP_N)]
        top: usize,

        /// Use Huber regression for beta
        #[arg(long)]
        robust_beta: bool,

        #[command(flatten)]
        window: Window,

        #[command(flatten)]
        metrics: MetricArgs,
    },

    /// Delete cached price tables
    ClearCache {
        /// Only entries for this ticker
        #[arg(long)]
        ticker: Option<String>,
    },

    /// Print version information
    Version,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_logging(&cli.log_level, cli.log_format);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let cache_dir = cache_manager::resolve_cache_dir(cli.cache_dir);
    let mut settings = EngineSettings::default();
    settings.request.use_cache = !cli.no_cache;

    match cli.command {
        Commands::Fetch {
            ticker,
            window,
            interval,
            force,
        } => {
            apply_window(&mut settings.request, &window);
            settings.request.interval = interval;
            settings.request.force_refresh = force;
            fetch_ticker(&ticker.to_uppercase(), &settings, &cache_dir).await?;
        }
        Commands::CalcSector {
            config,
            window,
            metrics,
        } => {
            apply_window(&mut settings.request, &window);
            apply_metrics(&mut settings, &metrics);
            calc_sectors(&config, settings, &cache_dir).await?;
        }
        Commands::Rank {
            companies,
            sectors,
            output,
            format,
            top,
            robust_beta,
            window,
            metrics,
        } => {
            apply_window(&mut settings.request, &window);
            apply_metrics(&mut settings, &metrics);
            if robust_beta {
                settings.beta_method = RegressionMethod::Huber;
            }
            let paths = RankPaths {
                companies: &companies,
                sectors: &sectors,
                output: &output,
            };
            rank_companies(paths, format, top, settings, &cache_dir).await?;
        }
        Commands::ClearCache { ticker } => {
            let fetcher = open_fetcher(&EngineSettings::default(), &cache_dir)?;
            let removed = fetcher.clear_cache(ticker.as_deref())?;
            match ticker {
                Some(t) => println!("Removed {removed} cached table(s) for {t}"),
                None => println!("Removed {removed} cached table(s)"),
            }
        }
        Commands::Version => {
            println!("volrisk {}", volrisk::VERSION);
        }
    }

    Ok(())
}

fn apply_window(request: &mut FetchRequest, window: &Window) {
    request.period = window.period.clone();
    request.start = window.start;
    request.end = window.end;
}

const fn apply_metrics(settings: &mut EngineSettings, args: &MetricArgs) {
    settings.metrics.mar = args.mar;
    settings.min_days = args.min_days;
    if args.strict_weights {
        settings.weight_policy = WeightPolicy::Strict;
    }
}

fn open_fetcher(
    settings: &EngineSettings,
    cache_dir: &Path,
) -> Result<PriceFetcher<YahooQuoteProvider>, Box<dyn std::error::Error>> {
    let provider = YahooQuoteProvider::new()?;
    Ok(settings.fetcher(provider, Some(cache_dir))?)
}

fn spinner(message: &'static str) -> Result<ProgressBar, Box<dyn std::error::Error>> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.enable_steady_tick(StdDuration::from_millis(100));
    pb.set_message(message);
    Ok(pb)
}

fn require_file(path: &Path, what: &str) -> Result<(), Box<dyn std::error::Error>> {
    if path.is_file() {
        Ok(())
    } else {
        Err(format!("{what} file not found: {}", path.display()).into())
    }
}

async fn fetch_ticker(
    ticker: &str,
    settings: &EngineSettings,
    cache_dir: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let fetcher = open_fetcher(settings, cache_dir)?;
    if settings.request.use_cache {
        cache_manager::print_cache_info(cache_dir, &fetcher);
    }

    let pb = spinner("Fetching prices...")?;
    let Some(series) = fetcher.fetch(ticker, &settings.request).await else {
        pb.finish_with_message("Failed!");
        return Err(format!("no price data for {ticker}").into());
    };
    pb.finish_and_clear();

    let first = series.first_date().map_or_else(|| "-".into(), |d| d.to_string());
    let last = series.last_date().map_or_else(|| "-".into(), |d| d.to_string());
    println!("\n{ticker}: {} prices from {first} to {last}", series.len());
    println!("{}", "-".repeat(32));
    for (date, price) in series.tail(5) {
        println!("{date}  {price:>14.4}");
    }
    Ok(())
}

async fn calc_sectors(
    config: &Path,
    settings: EngineSettings,
    cache_dir: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    require_file(config, "Sector configuration")?;
    let sectors = SectorsConfig::from_path(config)?;
    let fetcher = open_fetcher(&settings, cache_dir)?;
    let analyzer = SectorAnalyzer::new(fetcher, settings);

    let pb = spinner("Computing sector metrics...")?;
    let computed = analyzer.compute_all(&sectors).await;
    pb.finish_and_clear();

    if computed.is_empty() {
        return Err("no sector could be computed".into());
    }

    println!(
        "\n{:<16} {:>10} {:>10} {:>10} {:>6}  {}",
        "Sector", "σ_down", "σ_total", "MDD", "Days", "Tickers"
    );
    println!("{}", "=".repeat(72));
    for m in computed.iter() {
        println!(
            "{:<16} {:>9.2}% {:>9.2}% {:>9.2}% {:>6}  {}",
            m.name,
            m.sigma_down * 100.0,
            m.sigma_total * 100.0,
            m.mdd * 100.0,
            m.trading_days,
            m.tickers.join(",")
        );
    }
    println!(
        "\n{} of {} sectors computed",
        computed.len(),
        sectors.sectors.len()
    );
    Ok(())
}

/// Files read and written by `rank`.
struct RankPaths<'a> {
    companies: &'a Path,
    sectors: &'a Path,
    output: &'a Path,
}

async fn rank_companies(
    paths: RankPaths<'_>,
    format: ExportFormat,
    top: usize,
    settings: EngineSettings,
    cache_dir: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    require_file(paths.companies, "Company configuration")?;
    require_file(paths.sectors, "Sector configuration")?;

    // Configuration problems surface before any network traffic.
    let companies = CompaniesConfig::from_path(paths.companies)?;
    let sectors = SectorsConfig::from_path(paths.sectors)?;

    let fetcher = open_fetcher(&settings, cache_dir)?;
    let mut ranker = Ranker::new(SectorAnalyzer::new(fetcher, settings));

    let pb = spinner("Computing sectors and evaluating companies...")?;
    let (computed, results) = ranker.run(&sectors, &companies).await;
    pb.finish_and_clear();

    if computed.is_empty() {
        return Err("no sector could be computed".into());
    }
    if results.is_empty() {
        return Err("no company could be ranked".into());
    }

    let report = rank_and_export(results, &computed, paths.output, format)?;
    print!("{}", RankingSummary::new(&report.ranking, top));
    println!(
        "{} of {} companies ranked; report written to {}",
        report.len(),
        companies.companies.len(),
        paths.output.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_defaults() {
        let cli = Cli::try_parse_from(["volrisk", "rank"]).unwrap();
        let Commands::Rank {
            companies,
            format,
            top,
            window,
            metrics,
            ..
        } = cli.command
        else {
            panic!("expected rank");
        };
        assert_eq!(companies, PathBuf::from("companies.yaml"));
        assert_eq!(format, ExportFormat::Csv);
        assert_eq!(top, DEFAULT_TOP_N);
        assert_eq!(window.period, "1y");
        assert_eq!(metrics.min_days, 150);
        assert!(!cli.no_cache);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "volrisk",
            "fetch",
            "xlk",
            "--start",
            "2024-01-02",
            "--no-cache",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert!(cli.no_cache);
        assert_eq!(cli.log_format, LogFormat::Json);
        let Commands::Fetch { ticker, window, .. } = cli.command else {
            panic!("expected fetch");
        };
        assert_eq!(ticker, "xlk");
        assert_eq!(window.start, NaiveDate::from_ymd_opt(2024, 1, 2));
    }

    #[test]
    fn test_unknown_format_rejected() {
        assert!(Cli::try_parse_from(["volrisk", "rank", "--format", "xlsx"]).is_err());
    }

    #[test]
    fn test_apply_metrics() {
        let mut settings = EngineSettings::default();
        let args = MetricArgs {
            mar: 0.01,
            min_days: 60,
            strict_weights: true,
        };
        apply_metrics(&mut settings, &args);
        assert_eq!(settings.metrics.mar, 0.01);
        assert_eq!(settings.min_days, 60);
        assert_eq!(settings.weight_policy, WeightPolicy::Strict);
    }
}
