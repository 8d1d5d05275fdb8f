//! Export rows for ranked companies, calculation provenance and sectors.
//!
//! Every number in [`RankedRow`] can be re-derived from the matching
//! [`DetailRow`]: the three risk terms add up to `verify_sum`, the
//! expected-return terms give `verify_er`, and `verify_vtr` is their ratio.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use volrisk_risk::{MultipleType, ReturnSourceKind, RiskMode};

/// Errors that can occur during export operations.
#[derive(Debug, Error)]
pub enum ExportError {
    /// CSV serialization error.
    #[error("CSV serialization error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Output format the exporter does not write.
    #[error("unsupported export format: {0}")]
    UnsupportedFormat(String),
}

/// Export format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    /// Comma-separated values format.
    #[default]
    Csv,

    /// Compact JSON format.
    Json,

    /// Pretty-printed JSON format.
    PrettyJson,
}

impl ExportFormat {
    /// Get the file extension for this format.
    pub const fn extension(&self) -> &str {
        match self {
            Self::Csv => "csv",
            Self::Json | Self::PrettyJson => "json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Csv => write!(f, "csv"),
            Self::Json => write!(f, "json"),
            Self::PrettyJson => write!(f, "json-pretty"),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "json-pretty" | "pretty-json" => Ok(Self::PrettyJson),
            other => Err(ExportError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Serde helpers writing `+inf` as the string `"inf"`.
///
/// JSON has no infinity literal and CSV readers disagree on spelling, so a
/// ratio that blew up is written the same way in both formats.
pub mod ratio {
    use super::*;

    /// Serialize a ratio.
    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_infinite() && value.is_sign_positive() {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_f64(*value)
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    /// Deserialize a ratio written by [`serialize`].
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Number(value) => Ok(value),
            Raw::Text(text) => match text.trim() {
                "inf" | "+inf" | "Infinity" => Ok(f64::INFINITY),
                other => other.parse().map_err(serde::de::Error::custom),
            },
        }
    }
}

/// Where the beta used by Scheme C came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetaSource {
    /// Set in the company configuration
    Config,
    /// Regressed against the sector proxy
    Regression,
    /// Configured fallback after a failed regression
    Fallback,
    /// Neither configured nor estimable; 1.0
    Default,
}

impl fmt::Display for BetaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config => write!(f, "config"),
            Self::Regression => write!(f, "regression"),
            Self::Fallback => write!(f, "fallback"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// One line of the ranked table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedRow {
    /// 1-based rank by VTR
    pub rank: usize,
    /// Company name
    pub name: String,
    /// Sector descriptor, e.g. `XLK(XLK,SMH)` or `Tech(60%) + Semis(40%)`
    pub sector: String,
    /// Risk formula family
    pub mode: RiskMode,
    /// Annualized total volatility of the sector proxy
    pub sigma_total: f64,
    /// Annualized downside volatility of the sector proxy
    pub sigma_down: f64,
    /// Maximum drawdown of the sector proxy (<= 0)
    pub mdd: f64,
    /// Expected return before execution probability
    pub er_raw: f64,
    /// Execution-adjusted expected return
    pub er: f64,
    /// Loss risk
    pub loss_risk: f64,
    /// Value-to-risk ratio
    #[serde(with = "ratio")]
    pub vtr: f64,
    /// Beta (Scheme C)
    pub beta: Option<f64>,
    /// Fragility in percentage points (Scheme C)
    pub frag: Option<f64>,
    /// Idiosyncratic multiplier (SemiMDD)
    pub idio: Option<f64>,
    /// Downside weight (SemiMDD)
    pub w: Option<f64>,
    /// Absolute fragility add-on (SemiMDD)
    pub fragility_add: Option<f64>,
}

/// Every intermediate quantity behind a [`RankedRow`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailRow {
    /// 1-based rank by VTR
    pub rank: usize,
    /// Company name
    pub name: String,
    /// Sector descriptor
    pub sector: String,
    /// Risk formula family
    pub mode: RiskMode,

    /// Origin of the expected return
    pub er_source: ReturnSourceKind,
    /// Valuation multiple, for model-based returns
    pub multiple_type: Option<MultipleType>,
    /// Re-rating return
    pub multiple_return: Option<f64>,
    /// Dividend yield
    pub dividend_yield: Option<f64>,
    /// Net buyback yield
    pub buyback_yield: Option<f64>,
    /// Execution probability
    pub execution_prob: Option<f64>,
    /// Expected return before execution probability
    pub er_raw: f64,
    /// Execution-adjusted expected return
    pub er: f64,
    /// `er` recomputed from the terms above
    pub verify_er: f64,

    /// Sector downside volatility
    pub sigma_down: f64,
    /// Sector total volatility
    pub sigma_total: f64,
    /// Sector maximum drawdown
    pub mdd: f64,

    /// Beta (Scheme C)
    pub beta: Option<f64>,
    /// Beta provenance (Scheme C)
    pub beta_source: Option<BetaSource>,
    /// Regression R² when beta was estimated
    pub beta_r_squared: Option<f64>,
    /// Regression sample size when beta was estimated
    pub beta_n_obs: Option<usize>,
    /// Fragility in percentage points (Scheme C)
    pub frag: Option<f64>,
    /// Downside weight (Scheme C)
    pub w_down: Option<f64>,
    /// Beta weight (Scheme C)
    pub w_beta: Option<f64>,
    /// Fragility weight (Scheme C)
    pub w_frag: Option<f64>,
    /// Idiosyncratic multiplier after clamping (SemiMDD)
    pub idio: Option<f64>,
    /// Downside weight (SemiMDD)
    pub w: Option<f64>,
    /// Absolute fragility add-on (SemiMDD)
    pub fragility_add: Option<f64>,

    /// First weighted risk term (downside)
    pub downside_term: f64,
    /// Second weighted risk term (beta × total vol, or drawdown)
    pub second_term: f64,
    /// Third weighted risk term (fragility)
    pub fragility_term: f64,
    /// Sum of the three terms
    pub verify_sum: f64,
    /// Loss risk as computed by the model
    pub loss_risk: f64,

    /// `verify_er / verify_sum`
    #[serde(with = "ratio")]
    pub verify_vtr: f64,
    /// Value-to-risk ratio
    #[serde(with = "ratio")]
    pub vtr: f64,
}

/// Metrics of one computed sector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorRow {
    /// Sector name
    pub name: String,
    /// Comma-joined tickers
    pub tickers: String,
    /// Comma-joined weights
    pub weights: String,
    /// Annualized downside volatility
    pub sigma_down: f64,
    /// Annualized total volatility
    pub sigma_total: f64,
    /// Maximum drawdown
    pub mdd: f64,
    /// Price observations of the first ticker
    pub sample_days: usize,
    /// Return observations of the first ticker
    pub trading_days: usize,
    /// First price date
    pub start_date: Option<NaiveDate>,
    /// Last price date
    pub end_date: Option<NaiveDate>,
}

/// Trait for exporting data in various formats.
pub trait Exporter {
    /// Export data to a string in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError>;

    /// Export data to a file in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or file writing fails.
    fn export_to_file(&self, path: &Path, format: ExportFormat) -> Result<(), ExportError> {
        let content = self.export_to_string(format)?;
        let mut file = File::create(path)?;
        file.write_all(content.as_bytes())?;
        Ok(())
    }
}

/// CSV text with a header row for `records`.
pub(crate) fn to_csv<T: Serialize>(records: &[T]) -> Result<String, ExportError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for record in records {
        wtr.serialize(record)?;
    }
    let bytes = wtr.into_inner().map_err(|e| e.into_error())?;
    String::from_utf8(bytes).map_err(|e| ExportError::Io(std::io::Error::other(e)))
}

macro_rules! impl_row_exporter {
    ($($row:ty),*) => {
        $(
            impl Exporter for Vec<$row> {
                fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
                    match format {
                        ExportFormat::Csv => to_csv(self),
                        ExportFormat::Json => Ok(serde_json::to_string(self)?),
                        ExportFormat::PrettyJson => Ok(serde_json::to_string_pretty(self)?),
                    }
                }
            }
        )*
    };
}

impl_row_exporter!(RankedRow, DetailRow, SectorRow);

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rstest::rstest;

    pub(crate) fn ranked(rank: usize, name: &str, vtr: f64) -> RankedRow {
        RankedRow {
            rank,
            name: name.to_string(),
            sector: "Tech(60%) + Semis(40%)".to_string(),
            mode: RiskMode::SchemeC,
            sigma_total: 0.22,
            sigma_down: 0.15,
            mdd: -0.28,
            er_raw: 0.30,
            er: 0.24,
            loss_risk: 0.16,
            vtr,
            beta: Some(1.1),
            frag: Some(1.5),
            idio: None,
            w: None,
            fragility_add: None,
        }
    }

    #[rstest]
    #[case("csv", ExportFormat::Csv)]
    #[case("JSON", ExportFormat::Json)]
    #[case("json-pretty", ExportFormat::PrettyJson)]
    fn test_format_parsing(#[case] text: &str, #[case] expected: ExportFormat) {
        assert_eq!(text.parse::<ExportFormat>().unwrap(), expected);
    }

    #[test]
    fn test_unsupported_format() {
        assert!(matches!(
            "xlsx".parse::<ExportFormat>(),
            Err(ExportError::UnsupportedFormat(f)) if f == "xlsx"
        ));
    }

    #[test]
    fn test_infinite_vtr_is_written_as_inf() {
        let rows = vec![ranked(1, "Cash Box", f64::INFINITY)];

        let json = rows.export_to_string(ExportFormat::Json).unwrap();
        assert!(json.contains(r#""vtr":"inf""#));

        let csv = rows.export_to_string(ExportFormat::Csv).unwrap();
        let data_line = csv.lines().nth(1).unwrap();
        assert!(data_line.contains(",inf,"));

        let back: Vec<RankedRow> = serde_json::from_str(&json).unwrap();
        assert!(back[0].vtr.is_infinite());
    }

    #[test]
    fn test_csv_header_and_empty_options() {
        let csv = vec![ranked(1, "Acme", 1.5)]
            .export_to_string(ExportFormat::Csv)
            .unwrap();
        let mut lines = csv.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("rank,name,sector,mode,sigma_total"));
        let row = lines.next().unwrap();
        assert!(row.contains("SchemeC"));
        // idio, w and fragility_add are unset
        assert!(row.ends_with(",,,"));
    }

    #[test]
    fn test_csv_round_trip_through_reader() {
        let csv = vec![ranked(2, "Acme", 1.5)]
            .export_to_string(ExportFormat::Csv)
            .unwrap();
        let mut reader = csv::Reader::from_reader(csv.as_bytes());
        let rows: Vec<RankedRow> = reader.deserialize().collect::<Result<_, _>>().unwrap();
        assert_eq!(rows, vec![ranked(2, "Acme", 1.5)]);
    }

    #[test]
    fn test_beta_source_labels() {
        assert_eq!(BetaSource::Regression.to_string(), "regression");
        assert_eq!(
            serde_json::to_string(&BetaSource::Fallback).unwrap(),
            r#""fallback""#
        );
    }
}
