//! Error types for metric and beta estimation.

use thiserror::Error;

/// Errors raised while turning price series into risk metrics.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Series has no observations
    #[error("Empty price series")]
    EmptySeries,

    /// Every observation is missing
    #[error("All observations are missing")]
    AllMissing,

    /// Fewer valid observations than required
    #[error("Insufficient data: need at least {required} valid observations, got {actual}")]
    InsufficientData {
        /// Required number of observations
        required: usize,
        /// Actual number of observations
        actual: usize,
    },

    /// Blend weights do not sum to one
    #[error("Weights must sum to 1.0 (±{tolerance}), got {sum}")]
    WeightSum {
        /// Observed weight sum
        sum: f64,
        /// Allowed deviation
        tolerance: f64,
    },

    /// Blend references a sector with no metrics
    #[error("No metrics for sector {0}")]
    MissingSector(String),

    /// Underlying series error
    #[error(transparent)]
    Data(#[from] volrisk_data::DataError),
}

/// Errors raised by beta regression.
#[derive(Debug, Error)]
pub enum BetaError {
    /// Too few dates shared by the two return series
    #[error("Insufficient overlap: need at least {required} common observations, got {actual}")]
    InsufficientOverlap {
        /// Required number of common observations
        required: usize,
        /// Actual number of common observations
        actual: usize,
    },

    /// Sector returns have zero variance
    #[error("Degenerate regression: sector return variance is zero")]
    DegenerateRegression,
}
