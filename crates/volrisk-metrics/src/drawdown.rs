//! Maximum drawdown.

/// Drawdown path `P_t / max(P_0..=P_t) - 1`.
///
/// Missing prices yield NaN at their position and do not move the running peak.
pub fn drawdowns(prices: &[f64]) -> Vec<f64> {
    let mut peak = f64::NEG_INFINITY;
    prices
        .iter()
        .map(|&p| {
            if !p.is_finite() {
                return f64::NAN;
            }
            peak = peak.max(p);
            p / peak - 1.0
        })
        .collect()
}

/// Most negative drawdown over the path, in `[-1, 0]`.
///
/// Returns NaN when there is no valid price.
pub fn max_drawdown(prices: &[f64]) -> f64 {
    drawdowns(prices)
        .into_iter()
        .filter(|d| !d.is_nan())
        .fold(f64::NAN, f64::min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_peak_to_trough() {
        let mdd = max_drawdown(&[100.0, 110.0, 120.0, 90.0, 100.0, 110.0]);
        assert_relative_eq!(mdd, -0.25, epsilon = 0.01);
    }

    #[test]
    fn test_rising_path_has_zero_drawdown() {
        assert_eq!(max_drawdown(&[1.0, 2.0, 3.0]), 0.0);
    }

    #[test]
    fn test_never_positive() {
        let path = [5.0, 3.0, 8.0, 1.0, 9.0, 9.5];
        assert!(drawdowns(&path).iter().all(|d| *d <= 0.0));
        assert_relative_eq!(max_drawdown(&path), 1.0 / 8.0 - 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_missing_prices() {
        assert!(max_drawdown(&[]).is_nan());
        assert!(max_drawdown(&[f64::NAN]).is_nan());
        assert_relative_eq!(max_drawdown(&[10.0, f64::NAN, 5.0]), -0.5, epsilon = 1e-12);
    }
}
