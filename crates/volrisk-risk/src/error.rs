//! Error types for the risk and expected-return models.

use thiserror::Error;

/// Errors raised by the loss-risk models.
#[derive(Debug, Error)]
pub enum RiskError {
    /// Scheme C weights do not sum to one
    #[error("Scheme C weights must sum to 1.0, got {sum}")]
    InvalidWeights {
        /// Observed weight sum
        sum: f64,
    },

    /// Unknown risk mode name
    #[error("Unsupported risk mode: {0}")]
    UnsupportedMode(String),

    /// Parameter outside its allowed range
    #[error("Invalid risk parameter {name} = {value}: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: &'static str,
        /// Offending value
        value: f64,
        /// Allowed range
        reason: &'static str,
    },
}

/// Errors raised by the expected-return model.
#[derive(Debug, Error)]
pub enum ExpectedReturnError {
    /// Neither a direct value nor a valuation model was given
    #[error("Missing input: provide either an expected return or a valuation model")]
    MissingInput,

    /// Valuation model parameter outside its allowed range
    #[error("Invalid valuation parameter {name} = {value}: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: &'static str,
        /// Offending value
        value: f64,
        /// Allowed range
        reason: &'static str,
    },
}
