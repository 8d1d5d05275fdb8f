#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/volrisk/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod beta;
pub mod blend;
pub mod compute;
pub mod drawdown;
pub mod error;
pub mod quality;
pub mod volatility;

// Re-export main types
pub use beta::{BetaDiagnostics, BetaEstimator, FitMethod, RegressionMethod, calculate_beta};
pub use blend::{BlendedRisk, RiskProfile, WEIGHT_TOLERANCE, blend_volatilities, check_weight_sum};
pub use compute::{MetricsConfig, SeriesMetrics};
pub use drawdown::max_drawdown;
pub use error::{BetaError, MetricsError};
pub use quality::validate_data_quality;
pub use volatility::{
    downside_volatility, returns, semidev_annual, total_volatility, total_volatility_annual,
};
