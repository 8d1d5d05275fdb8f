//! Huber M-estimator beta via iteratively reweighted least squares.

use super::{
    BetaDiagnostics, FitMethod, OlsRegression, RegressionMethod, RegressionStrategy, is_constant,
    r_squared,
};
use crate::error::BetaError;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Consistency constant turning a MAD into a normal-scale estimate.
const MAD_TO_SIGMA: f64 = 0.674_489_750_196_081_7;

/// Configuration for the Huber regression.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HuberConfig {
    /// Threshold (in scale units) beyond which residuals are down-weighted
    pub epsilon: f64,
    /// Maximum IRLS iterations
    pub max_iter: usize,
    /// Convergence tolerance on the coefficients
    pub tolerance: f64,
}

impl Default for HuberConfig {
    fn default() -> Self {
        Self {
            epsilon: 1.35,
            max_iter: 100,
            tolerance: 1e-10,
        }
    }
}

/// Outlier-resistant linear fit.
///
/// Starts from the OLS solution, then alternates between a MAD scale
/// estimate of the residuals and a weighted least-squares step with Huber
/// weights `min(1, epsilon / |r / s|)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HuberRegression {
    config: HuberConfig,
}

impl HuberRegression {
    /// Create a Huber regression with a custom configuration.
    pub const fn new(config: HuberConfig) -> Self {
        Self { config }
    }

    /// Current configuration.
    pub const fn config(&self) -> &HuberConfig {
        &self.config
    }
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let n = values.len();
    if n == 0 {
        return f64::NAN;
    }
    if n % 2 == 1 {
        values[n / 2]
    } else {
        0.5 * (values[n / 2 - 1] + values[n / 2])
    }
}

fn mad_scale(residuals: &Array1<f64>) -> f64 {
    let mut r = residuals.to_vec();
    let center = median(&mut r);
    let mut deviations: Vec<f64> = r.iter().map(|v| (v - center).abs()).collect();
    median(&mut deviations) / MAD_TO_SIGMA
}

impl RegressionStrategy for HuberRegression {
    fn method(&self) -> RegressionMethod {
        RegressionMethod::Huber
    }

    fn fit(&self, x: &Array1<f64>, y: &Array1<f64>) -> Result<BetaDiagnostics, BetaError> {
        if x.is_empty() || is_constant(x) {
            return Err(BetaError::DegenerateRegression);
        }

        let start = OlsRegression.fit(x, y)?;
        let (mut alpha, mut beta) = (start.alpha, start.beta);
        let eps = self.config.epsilon;

        for _ in 0..self.config.max_iter {
            let residuals = y - &x.mapv(|v| alpha + beta * v);
            let scale = mad_scale(&residuals);
            if scale.is_nan() || scale <= 0.0 {
                // More than half the points sit on the line already.
                break;
            }

            let weights = residuals.mapv(|r| {
                let z = (r / scale).abs();
                if z <= eps { 1.0 } else { eps / z }
            });

            let w_sum = weights.sum();
            let x_mean = weights.dot(x) / w_sum;
            let y_mean = weights.dot(y) / w_sum;
            let dx = x - x_mean;
            let dy = y - y_mean;
            let sxx = (&weights * &dx).dot(&dx);
            if sxx == 0.0 {
                return Err(BetaError::DegenerateRegression);
            }

            let next_beta = (&weights * &dx).dot(&dy) / sxx;
            let next_alpha = y_mean - next_beta * x_mean;
            let converged = (next_beta - beta).abs() < self.config.tolerance
                && (next_alpha - alpha).abs() < self.config.tolerance;
            alpha = next_alpha;
            beta = next_beta;
            if converged {
                break;
            }
        }

        let fitted = x.mapv(|v| alpha + beta * v);
        Ok(BetaDiagnostics {
            method: FitMethod::Huber,
            alpha,
            beta,
            r_squared: r_squared(y, &fitted),
            std_err: None,
            n_obs: x.len(),
            error: None,
        })
    }
}
