//! Data quality gate applied before computing metrics.

use crate::error::MetricsError;
use volrisk_data::PriceSeries;

/// Default minimum number of valid observations (about six months).
pub const DEFAULT_MIN_DAYS: usize = 150;

/// Check that `prices` carries at least `min_days` valid observations.
pub fn validate_data_quality(prices: &PriceSeries, min_days: usize) -> Result<(), MetricsError> {
    if prices.is_empty() {
        return Err(MetricsError::EmptySeries);
    }

    let valid = prices.valid_len();
    if valid == 0 {
        return Err(MetricsError::AllMissing);
    }
    if valid < min_days {
        return Err(MetricsError::InsufficientData {
            required: min_days,
            actual: valid,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Days, NaiveDate};
    use rstest::rstest;

    fn series(values: Vec<f64>) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let dates = (0..values.len() as u64).map(|i| start + Days::new(i)).collect();
        PriceSeries::new("TEST", dates, values).unwrap()
    }

    #[test]
    fn test_empty_series_fails() {
        let result = validate_data_quality(&series(vec![]), DEFAULT_MIN_DAYS);
        assert!(matches!(result, Err(MetricsError::EmptySeries)));
    }

    #[test]
    fn test_all_missing_fails() {
        let result = validate_data_quality(&series(vec![f64::NAN; 200]), DEFAULT_MIN_DAYS);
        assert!(matches!(result, Err(MetricsError::AllMissing)));
    }

    #[rstest]
    #[case(149, false)]
    #[case(150, true)]
    #[case(400, true)]
    fn test_min_days_boundary(#[case] len: usize, #[case] ok: bool) {
        let result = validate_data_quality(&series(vec![1.0; len]), DEFAULT_MIN_DAYS);
        assert_eq!(result.is_ok(), ok);
    }

    #[test]
    fn test_missing_values_do_not_count() {
        let mut values = vec![1.0; 160];
        values[..20].fill(f64::NAN);
        let result = validate_data_quality(&series(values), DEFAULT_MIN_DAYS);
        assert!(matches!(
            result,
            Err(MetricsError::InsufficientData {
                required: 150,
                actual: 140
            })
        ));
    }
}
