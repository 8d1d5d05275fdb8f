//! Sector and company configuration, plus per-run engine settings.
//!
//! Files are parsed into raw serde structs first and then converted into typed
//! values, so every shape problem (both or neither of a pair of fields set,
//! weights that don't add up, out-of-range parameters) surfaces before any
//! price is fetched.

use crate::error::{Error, Result};
use crate::sector::WeightPolicy;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::path::Path;
use volrisk_data::{FetchRequest, PriceFetcher, QuoteSource, RetryPolicy};
use volrisk_metrics::quality::DEFAULT_MIN_DAYS;
use volrisk_metrics::{MetricsConfig, RegressionMethod, WEIGHT_TOLERANCE};
use volrisk_risk::{
    ReturnSource, RiskConfig, RiskMode, SchemeCParams, SchemeCWeights, SemiMddParams,
    ValuationModel,
};

/// Deserialize a map into `(key, value)` pairs, keeping file order.
fn ordered<'de, D, V>(deserializer: D) -> std::result::Result<Vec<(String, V)>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    struct OrderedVisitor<V>(PhantomData<V>);

    impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedVisitor<V> {
        type Value = Vec<(String, V)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map")
        }

        fn visit_map<A: MapAccess<'de>>(
            self,
            mut map: A,
        ) -> std::result::Result<Self::Value, A::Error> {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some(entry) = map.next_entry()? {
                entries.push(entry);
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(OrderedVisitor(PhantomData))
}

fn ordered_opt<'de, D, V>(
    deserializer: D,
) -> std::result::Result<Option<Vec<(String, V)>>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    ordered(deserializer).map(Some)
}

fn check_weights(entry: &str, weights: &[f64]) -> Result<()> {
    let sum: f64 = weights.iter().sum();
    if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(Error::invalid_config(
            entry,
            format!("weights sum to {sum:.4}, expected 1.0"),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Sectors
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSector {
    tickers: Vec<String>,
    weights: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct RawSectorsFile {
    #[serde(deserialize_with = "ordered")]
    sectors: Vec<(String, RawSector)>,
}

/// A named basket of ETFs with weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorSpec {
    /// Sector name
    pub name: String,
    /// ETF tickers
    pub tickers: Vec<String>,
    /// Weight of each ticker
    pub weights: Vec<f64>,
}

impl SectorSpec {
    /// Create a validated sector.
    pub fn new(name: impl Into<String>, tickers: Vec<String>, weights: Vec<f64>) -> Result<Self> {
        let spec = Self {
            name: name.into(),
            tickers,
            weights,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Require one weight per ticker, summing to 1.0.
    pub fn validate(&self) -> Result<()> {
        if self.tickers.is_empty() {
            return Err(Error::invalid_config(&self.name, "no tickers"));
        }
        if self.tickers.len() != self.weights.len() {
            return Err(Error::invalid_config(
                &self.name,
                format!(
                    "{} weights for {} tickers",
                    self.weights.len(),
                    self.tickers.len()
                ),
            ));
        }
        check_weights(&self.name, &self.weights)
    }
}

/// All configured sectors, in file order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectorsConfig {
    /// Sectors
    pub sectors: Vec<SectorSpec>,
}

impl SectorsConfig {
    /// Parse and validate a sector file.
    ///
    /// ```
    /// let config = volrisk::SectorsConfig::from_yaml_str(
    ///     "sectors:\n  Semis:\n    tickers: [SMH, SOXX]\n    weights: [0.5, 0.5]\n",
    /// )
    /// .unwrap();
    /// assert_eq!(config.sectors[0].tickers, ["SMH", "SOXX"]);
    /// ```
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let raw: RawSectorsFile = serde_yaml::from_str(yaml)?;
        let sectors = raw
            .sectors
            .into_iter()
            .map(|(name, s)| SectorSpec::new(name, s.tickers, s.weights))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { sectors })
    }

    /// Read and validate a sector file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_yaml_str(&std::fs::read_to_string(path)?)
    }

    /// Look up a sector by name.
    pub fn get(&self, name: &str) -> Option<&SectorSpec> {
        self.sectors.iter().find(|s| s.name == name)
    }
}

// ---------------------------------------------------------------------------
// Companies
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRisk {
    mode: Option<String>,
    beta: Option<f64>,
    frag: Option<f64>,
    scheme_c_weights: Option<SchemeCWeights>,
    idio: Option<f64>,
    w: Option<f64>,
    fragility_add: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCompany {
    name: String,
    ticker: Option<String>,
    sector: Option<String>,
    #[serde(default, deserialize_with = "ordered_opt")]
    sector_mix: Option<Vec<(String, f64)>>,
    expected_return: Option<f64>,
    model: Option<ValuationModel>,
    #[serde(default)]
    risk: RawRisk,
    beta_fallback: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawCompaniesFile {
    companies: Vec<RawCompany>,
}

/// Which sector proxy a company is measured against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SectorSelector {
    /// One configured sector
    Single(String),
    /// Weighted mix of configured sectors, in file order
    Mix(Vec<(String, f64)>),
}

impl SectorSelector {
    /// Names of the sectors referenced.
    pub fn sectors(&self) -> Vec<&str> {
        match self {
            Self::Single(name) => vec![name.as_str()],
            Self::Mix(mix) => mix.iter().map(|(name, _)| name.as_str()).collect(),
        }
    }
}

fn in_range(entry: &str, name: &str, value: f64, lo: f64, hi: f64) -> Result<f64> {
    if (lo..=hi).contains(&value) {
        Ok(value)
    } else {
        Err(Error::invalid_config(
            entry,
            format!("{name} = {value} outside [{lo}, {hi}]"),
        ))
    }
}

fn risk_config(entry: &str, raw: RawRisk) -> Result<RiskConfig> {
    let mode = match raw.mode.as_deref() {
        None => RiskMode::SchemeC,
        Some(mode) => mode.parse()?,
    };
    let fragility_add = raw
        .fragility_add
        .map(|v| in_range(entry, "fragility_add", v, 0.0, 0.1))
        .transpose()?;

    let config = match mode {
        RiskMode::SchemeC => {
            let beta = raw
                .beta
                .map(|v| in_range(entry, "beta", v, 0.0, f64::MAX))
                .transpose()?;
            let mut frag = raw
                .frag
                .map(|v| in_range(entry, "frag", v, 0.0, 10.0))
                .transpose()?
                .unwrap_or(0.0);
            // Legacy decimal add-on, expressed in percentage points.
            if let Some(add) = fragility_add.filter(|a| *a > 0.0) {
                frag = frag.max(add * 100.0);
            }
            let weights = raw.scheme_c_weights.unwrap_or_default();
            weights.validate()?;
            RiskConfig::SchemeC(SchemeCParams {
                beta,
                frag,
                weights,
            })
        }
        RiskMode::SemiMdd => {
            let defaults = SemiMddParams::default();
            RiskConfig::SemiMdd(SemiMddParams {
                idio: raw.idio.unwrap_or(defaults.idio),
                w: raw
                    .w
                    .map(|v| in_range(entry, "w", v, 0.0, 1.0))
                    .transpose()?
                    .unwrap_or(defaults.w),
                fragility_add: fragility_add.unwrap_or(defaults.fragility_add),
            })
        }
    };
    Ok(config)
}

/// One company to rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyConfig {
    /// Display name
    pub name: String,
    /// Listing ticker, used to regress beta when none is configured
    pub ticker: Option<String>,
    /// Sector proxy
    pub selector: SectorSelector,
    /// Expected return input
    pub returns: ReturnSource,
    /// Loss-risk formula and parameters
    pub risk: RiskConfig,
    /// Beta to use when the regression fails
    pub beta_fallback: Option<f64>,
}

impl CompanyConfig {
    /// Re-check invariants of a programmatically built company.
    pub fn validate(&self) -> Result<()> {
        if let SectorSelector::Mix(mix) = &self.selector {
            if mix.is_empty() {
                return Err(Error::invalid_config(&self.name, "empty sector_mix"));
            }
            let weights: Vec<f64> = mix.iter().map(|(_, w)| *w).collect();
            check_weights(&self.name, &weights)?;
        }
        if let ReturnSource::Model(model) = &self.returns {
            model.validate()?;
        }
        if let RiskConfig::SchemeC(params) = &self.risk {
            params.weights.validate()?;
        }
        Ok(())
    }
}

impl TryFrom<RawCompany> for CompanyConfig {
    type Error = Error;

    fn try_from(raw: RawCompany) -> Result<Self> {
        let name = raw.name;
        let selector = match (raw.sector, raw.sector_mix) {
            (Some(sector), None) => SectorSelector::Single(sector),
            (None, Some(mix)) => SectorSelector::Mix(mix),
            (Some(_), Some(_)) => {
                return Err(Error::invalid_config(
                    &name,
                    "sector and sector_mix are mutually exclusive",
                ));
            }
            (None, None) => {
                return Err(Error::invalid_config(&name, "one of sector or sector_mix is required"));
            }
        };
        let returns = match (raw.expected_return, raw.model) {
            (Some(value), None) => ReturnSource::Direct(value),
            (None, Some(model)) => ReturnSource::Model(model),
            (Some(_), Some(_)) => {
                return Err(Error::invalid_config(
                    &name,
                    "expected_return and model are mutually exclusive",
                ));
            }
            (None, None) => {
                return Err(Error::invalid_config(
                    &name,
                    "one of expected_return or model is required",
                ));
            }
        };
        let risk = risk_config(&name, raw.risk)?;
        let beta_fallback = raw
            .beta_fallback
            .map(|v| in_range(&name, "beta_fallback", v, 0.0, f64::MAX))
            .transpose()?;

        let company = Self {
            name,
            ticker: raw.ticker,
            selector,
            returns,
            risk,
            beta_fallback,
        };
        company.validate()?;
        Ok(company)
    }
}

/// All companies to rank, in file order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompaniesConfig {
    /// Companies
    pub companies: Vec<CompanyConfig>,
}

impl CompaniesConfig {
    /// Parse and validate a company file.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let raw: RawCompaniesFile = serde_yaml::from_str(yaml)?;
        let companies = raw
            .companies
            .into_iter()
            .map(CompanyConfig::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { companies })
    }

    /// Read and validate a company file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_yaml_str(&std::fs::read_to_string(path)?)
    }
}

// ---------------------------------------------------------------------------
// Engine settings
// ---------------------------------------------------------------------------

/// Knobs of one engine run. Built fresh per run; never global.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Price window and cache behaviour
    pub request: FetchRequest,
    /// Return, volatility and annualization settings
    pub metrics: MetricsConfig,
    /// Minimum valid prices per ticker
    pub min_days: usize,
    /// Minimum common observations for a beta regression
    pub min_overlap: usize,
    /// Beta regression method
    pub beta_method: RegressionMethod,
    /// Maximum age of a fresh cache entry
    pub max_age: chrono::Duration,
    /// Fetch retry policy
    pub retry: RetryPolicy,
    /// Handling of per-ticker weights that don't sum to one
    pub weight_policy: WeightPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            request: FetchRequest::default(),
            metrics: MetricsConfig::default(),
            min_days: DEFAULT_MIN_DAYS,
            min_overlap: volrisk_metrics::beta::DEFAULT_MIN_OVERLAP,
            beta_method: RegressionMethod::default(),
            max_age: chrono::Duration::days(1),
            retry: RetryPolicy::default(),
            weight_policy: WeightPolicy::default(),
        }
    }
}

impl EngineSettings {
    /// Build a fetcher over `source` using these settings.
    ///
    /// The cache lives in `cache_dir` when given and caching is enabled.
    pub fn fetcher<S: QuoteSource>(
        &self,
        source: S,
        cache_dir: Option<&Path>,
    ) -> Result<PriceFetcher<S>> {
        let fetcher = PriceFetcher::new(source)
            .with_max_age(self.max_age)
            .with_retry(self.retry);
        match cache_dir {
            Some(dir) if self.request.use_cache => Ok(fetcher.with_cache_dir(dir)?),
            _ => Ok(fetcher),
        }
    }
}
