//! Engine-level errors and their classification.

use std::fmt;
use thiserror::Error;
use volrisk_data::DataError;
use volrisk_metrics::{BetaError, MetricsError};
use volrisk_output::ExportError;
use volrisk_risk::{ExpectedReturnError, RiskError};

/// Broad failure classes, independent of which stage raised them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Empty or missing price data after retries
    DataUnavailable,
    /// Too few observations or too little regression overlap
    InsufficientSample,
    /// Zero variance, weights not summing to one, missing inputs
    DegenerateInput,
    /// Unknown risk mode or output format
    UnsupportedMode,
    /// Schema-level validation failure in a configuration file
    ConfigurationInvalid,
    /// Filesystem failure
    Io,
}

/// Step of the per-company pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Configuration checks
    Validate,
    /// Sector lookup or blending
    ResolveSector,
    /// Expected return
    ComputeExpectedReturn,
    /// Beta and loss risk
    ComputeRisk,
    /// Value-to-risk ratio
    ComputeVtr,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validate => "validate",
            Self::ResolveSector => "resolve_sector",
            Self::ComputeExpectedReturn => "compute_expected_return",
            Self::ComputeRisk => "compute_risk",
            Self::ComputeVtr => "compute_vtr",
        };
        f.write_str(name)
    }
}

/// Errors raised by the engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Data layer failure.
    #[error(transparent)]
    Data(#[from] DataError),

    /// Metric computation failure.
    #[error(transparent)]
    Metrics(#[from] MetricsError),

    /// Beta regression failure.
    #[error(transparent)]
    Beta(#[from] BetaError),

    /// Loss-risk failure.
    #[error(transparent)]
    Risk(#[from] RiskError),

    /// Expected-return failure.
    #[error(transparent)]
    ExpectedReturn(#[from] ExpectedReturnError),

    /// Export failure.
    #[error(transparent)]
    Export(#[from] ExportError),

    /// Malformed YAML.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration entry failed validation.
    #[error("invalid configuration for {entry}: {reason}")]
    InvalidConfig {
        /// Sector or company the entry belongs to
        entry: String,
        /// What is wrong with it
        reason: String,
    },

    /// No usable prices for a ticker.
    #[error("no price data for {ticker}")]
    DataUnavailable {
        /// Ticker symbol
        ticker: String,
    },

    /// Expected return over loss risk is not a number.
    #[error(
        "value-to-risk undefined for expected return {expected_return} and loss risk {loss_risk}"
    )]
    UndefinedRatio {
        /// Expected return
        expected_return: f64,
        /// Loss risk
        loss_risk: f64,
    },

    /// A company failed at one pipeline stage.
    #[error("{company} failed at {stage}: {source}")]
    Company {
        /// Company name
        company: String,
        /// Stage that failed
        stage: Stage,
        /// Underlying error
        source: Box<Self>,
    },
}

impl Error {
    /// Build an [`Error::InvalidConfig`].
    pub fn invalid_config(entry: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            entry: entry.into(),
            reason: reason.into(),
        }
    }

    /// Wrap `self` as the failure of `company` at `stage`.
    pub fn at_stage(self, company: &str, stage: Stage) -> Self {
        Self::Company {
            company: company.to_string(),
            stage,
            source: Box::new(self),
        }
    }

    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Data(e) => data_kind(e),
            Self::Metrics(e) => match e {
                MetricsError::EmptySeries
                | MetricsError::AllMissing
                | MetricsError::MissingSector(_) => ErrorKind::DataUnavailable,
                MetricsError::InsufficientData { .. } => ErrorKind::InsufficientSample,
                MetricsError::WeightSum { .. } => ErrorKind::DegenerateInput,
                MetricsError::Data(e) => data_kind(e),
            },
            Self::Beta(e) => match e {
                BetaError::InsufficientOverlap { .. } => ErrorKind::InsufficientSample,
                BetaError::DegenerateRegression => ErrorKind::DegenerateInput,
            },
            Self::Risk(e) => match e {
                RiskError::InvalidWeights { .. } => ErrorKind::DegenerateInput,
                RiskError::UnsupportedMode(_) => ErrorKind::UnsupportedMode,
                RiskError::InvalidParameter { .. } => ErrorKind::ConfigurationInvalid,
            },
            Self::ExpectedReturn(e) => match e {
                ExpectedReturnError::MissingInput => ErrorKind::DegenerateInput,
                ExpectedReturnError::InvalidParameter { .. } => ErrorKind::ConfigurationInvalid,
            },
            Self::Export(e) => match e {
                ExportError::UnsupportedFormat(_) => ErrorKind::UnsupportedMode,
                _ => ErrorKind::Io,
            },
            Self::Yaml(_) | Self::InvalidConfig { .. } => ErrorKind::ConfigurationInvalid,
            Self::Io(_) => ErrorKind::Io,
            Self::DataUnavailable { .. } => ErrorKind::DataUnavailable,
            Self::UndefinedRatio { .. } => ErrorKind::DegenerateInput,
            Self::Company { source, .. } => source.kind(),
        }
    }
}

const fn data_kind(e: &DataError) -> ErrorKind {
    match e {
        DataError::Io(_) | DataError::Database(_) => ErrorKind::Io,
        DataError::InvalidDateRange { .. } | DataError::InvalidSymbol(_) => {
            ErrorKind::ConfigurationInvalid
        }
        _ => ErrorKind::DataUnavailable,
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(
        MetricsError::InsufficientData { required: 150, actual: 20 }.into(),
        ErrorKind::InsufficientSample
    )]
    #[case(BetaError::DegenerateRegression.into(), ErrorKind::DegenerateInput)]
    #[case(RiskError::UnsupportedMode("Kelly".into()).into(), ErrorKind::UnsupportedMode)]
    #[case(ExportError::UnsupportedFormat("xlsx".into()).into(), ErrorKind::UnsupportedMode)]
    #[case(
        Error::invalid_config("Acme", "both sector and sector_mix set"),
        ErrorKind::ConfigurationInvalid
    )]
    #[case(Error::DataUnavailable { ticker: "XLK".into() }, ErrorKind::DataUnavailable)]
    fn test_kind(#[case] error: Error, #[case] kind: ErrorKind) {
        assert_eq!(error.kind(), kind);
    }

    #[test]
    fn test_stage_wrapping_keeps_kind() {
        let error = Error::from(BetaError::InsufficientOverlap {
            required: 50,
            actual: 10,
        })
        .at_stage("Acme", Stage::ComputeRisk);
        assert_eq!(error.kind(), ErrorKind::InsufficientSample);
        assert!(error.to_string().starts_with("Acme failed at compute_risk"));
    }
}
