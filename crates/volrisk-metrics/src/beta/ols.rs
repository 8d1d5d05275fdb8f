//! Ordinary least squares beta.

use super::{
    BetaDiagnostics, FitMethod, RegressionMethod, RegressionStrategy, is_constant, r_squared,
};
use crate::error::BetaError;
use ndarray::Array1;

/// Closed-form OLS: `beta = Cov(x, y) / Var(x)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OlsRegression;

impl RegressionStrategy for OlsRegression {
    fn method(&self) -> RegressionMethod {
        RegressionMethod::Ols
    }

    fn fit(&self, x: &Array1<f64>, y: &Array1<f64>) -> Result<BetaDiagnostics, BetaError> {
        if x.is_empty() || is_constant(x) {
            return Err(BetaError::DegenerateRegression);
        }

        let n = x.len();
        let x_mean = x.mean().unwrap_or(0.0);
        let y_mean = y.mean().unwrap_or(0.0);
        let dx = x - x_mean;
        let dy = y - y_mean;
        let sxx = dx.dot(&dx);
        let sxy = dx.dot(&dy);
        if sxx == 0.0 {
            return Err(BetaError::DegenerateRegression);
        }

        let beta = sxy / sxx;
        let alpha = y_mean - beta * x_mean;
        let fitted = x.mapv(|v| alpha + beta * v);

        // Residual mean square over n - 2 degrees of freedom.
        let std_err = (n > 2).then(|| {
            let ss_res: f64 = y.iter().zip(&fitted).map(|(a, b)| (a - b).powi(2)).sum();
            (ss_res / (n - 2) as f64 / sxx).sqrt()
        });

        Ok(BetaDiagnostics {
            method: FitMethod::Ols,
            alpha,
            beta,
            r_squared: r_squared(y, &fitted),
            std_err,
            n_obs: n,
            error: None,
        })
    }
}
