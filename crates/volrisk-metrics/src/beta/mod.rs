//! Beta of a stock against a sector proxy.
//!
//! The regression `r_stock = alpha + beta * r_sector + e` is fitted on the
//! dates both return series share. Two strategies exist: ordinary least
//! squares and, with the `robust` feature, a Huber M-estimator.

pub mod estimator;
#[cfg(feature = "robust")]
pub mod huber;
pub mod ols;

pub use estimator::{BetaEstimator, calculate_beta};
#[cfg(feature = "robust")]
pub use huber::HuberRegression;
pub use ols::OlsRegression;

use crate::error::BetaError;
use chrono::NaiveDate;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use volrisk_data::ReturnSeries;

/// Default minimum number of common observations.
pub const DEFAULT_MIN_OVERLAP: usize = 50;

/// Requested regression method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegressionMethod {
    /// Ordinary least squares
    #[default]
    #[serde(rename = "OLS", alias = "ols")]
    Ols,
    /// Huber robust regression
    #[serde(rename = "Huber", alias = "huber")]
    Huber,
}

impl fmt::Display for RegressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ols => write!(f, "OLS"),
            Self::Huber => write!(f, "Huber"),
        }
    }
}

impl FromStr for RegressionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ols" => Ok(Self::Ols),
            "huber" => Ok(Self::Huber),
            other => Err(format!("unsupported regression method: {other}")),
        }
    }
}

/// How a beta value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FitMethod {
    /// Ordinary least squares fit
    #[serde(rename = "OLS")]
    Ols,
    /// Huber fit
    Huber,
    /// Caller-supplied value after a failed fit
    Fallback,
}

impl fmt::Display for FitMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ols => write!(f, "OLS"),
            Self::Huber => write!(f, "Huber"),
            Self::Fallback => write!(f, "Fallback"),
        }
    }
}

/// Coefficients and goodness of fit of one regression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetaDiagnostics {
    /// Method that produced `beta`
    pub method: FitMethod,
    /// Intercept (NaN for a fallback)
    pub alpha: f64,
    /// Slope
    pub beta: f64,
    /// Coefficient of determination (NaN for a fallback)
    pub r_squared: f64,
    /// Standard error of the slope, when the method provides one
    pub std_err: Option<f64>,
    /// Number of aligned observations used
    pub n_obs: usize,
    /// Failure that triggered a fallback
    pub error: Option<String>,
}

impl BetaDiagnostics {
    /// Diagnostics for a caller-supplied beta after `error`.
    pub fn fallback(beta: f64, error: &BetaError) -> Self {
        Self {
            method: FitMethod::Fallback,
            alpha: f64::NAN,
            beta,
            r_squared: f64::NAN,
            std_err: None,
            n_obs: 0,
            error: Some(error.to_string()),
        }
    }
}

/// A way of fitting `y = alpha + beta * x`.
pub trait RegressionStrategy: fmt::Debug + Send + Sync {
    /// Method this strategy implements.
    fn method(&self) -> RegressionMethod;

    /// Fit the regression of `y` on `x`.
    ///
    /// Both arrays have the same, already validated, length.
    fn fit(&self, x: &Array1<f64>, y: &Array1<f64>) -> Result<BetaDiagnostics, BetaError>;
}

/// Stock and sector returns on their common dates.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedReturns {
    /// Shared dates
    pub dates: Vec<NaiveDate>,
    /// Sector returns (regressor)
    pub sector: Array1<f64>,
    /// Stock returns (response)
    pub stock: Array1<f64>,
}

impl AlignedReturns {
    /// Number of aligned observations.
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    /// Whether no dates are shared.
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

/// Keep only dates present in both series with finite values in each.
pub fn align(stock: &ReturnSeries, sector: &ReturnSeries) -> AlignedReturns {
    let sector_by_date: HashMap<NaiveDate, f64> = sector.iter().collect();

    let mut dates = Vec::new();
    let mut xs = Vec::new();
    let mut ys = Vec::new();
    for (date, y) in stock.iter() {
        let Some(&x) = sector_by_date.get(&date) else {
            continue;
        };
        if x.is_finite() && y.is_finite() {
            dates.push(date);
            xs.push(x);
            ys.push(y);
        }
    }

    AlignedReturns {
        dates,
        sector: Array1::from_vec(xs),
        stock: Array1::from_vec(ys),
    }
}

/// `1 - ss_res / ss_tot`, or 0 when `y` is constant.
pub(crate) fn r_squared(y: &Array1<f64>, fitted: &Array1<f64>) -> f64 {
    let mean = y.mean().unwrap_or(0.0);
    let ss_res: f64 = y.iter().zip(fitted).map(|(a, b)| (a - b).powi(2)).sum();
    let ss_tot: f64 = y.iter().map(|a| (a - mean).powi(2)).sum();
    if ss_tot == 0.0 { 0.0 } else { 1.0 - ss_res / ss_tot }
}

/// Whether every element equals the first.
pub(crate) fn is_constant(x: &Array1<f64>) -> bool {
    x.iter().all(|v| Some(v) == x.first())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_align_on_common_dates() {
        let stock =
            ReturnSeries::new(vec![day(1), day(2), day(3), day(5)], vec![0.1, f64::NAN, 0.3, 0.5])
                .unwrap();
        let sector =
            ReturnSeries::new(vec![day(2), day(3), day(4), day(5)], vec![0.2, 0.3, 0.4, 0.5])
                .unwrap();

        let aligned = align(&stock, &sector);
        assert_eq!(aligned.dates, vec![day(3), day(5)]);
        assert_eq!(aligned.sector.to_vec(), vec![0.3, 0.5]);
        assert_eq!(aligned.stock.to_vec(), vec![0.3, 0.5]);
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("OLS".parse::<RegressionMethod>().unwrap(), RegressionMethod::Ols);
        assert_eq!("huber".parse::<RegressionMethod>().unwrap(), RegressionMethod::Huber);
        assert!("ridge".parse::<RegressionMethod>().is_err());
        assert_eq!(RegressionMethod::default().to_string(), "OLS");
    }

    #[test]
    fn test_fallback_diagnostics() {
        let diag = BetaDiagnostics::fallback(0.9, &BetaError::DegenerateRegression);
        assert_eq!(diag.method, FitMethod::Fallback);
        assert_eq!(diag.beta, 0.9);
        assert!(diag.alpha.is_nan());
        assert_eq!(diag.n_obs, 0);
        assert!(diag.error.unwrap().contains("Degenerate"));
    }
}
