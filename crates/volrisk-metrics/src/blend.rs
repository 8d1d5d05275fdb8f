//! Linear blending of risk metrics and return series.

use crate::error::MetricsError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use volrisk_data::ReturnSeries;

/// Allowed deviation of a weight sum from 1.0.
pub const WEIGHT_TOLERANCE: f64 = 0.001;

/// Anything carrying the three blended risk inputs.
pub trait RiskProfile {
    /// Downside volatility
    fn sigma_down(&self) -> f64;
    /// Total volatility
    fn sigma_total(&self) -> f64;
    /// Maximum drawdown (signed, `<= 0`)
    fn mdd(&self) -> f64;
}

impl<T: RiskProfile + ?Sized> RiskProfile for Arc<T> {
    fn sigma_down(&self) -> f64 {
        (**self).sigma_down()
    }

    fn sigma_total(&self) -> f64 {
        (**self).sigma_total()
    }

    fn mdd(&self) -> f64 {
        (**self).mdd()
    }
}

impl<T: RiskProfile + ?Sized> RiskProfile for &T {
    fn sigma_down(&self) -> f64 {
        (**self).sigma_down()
    }

    fn sigma_total(&self) -> f64 {
        (**self).sigma_total()
    }

    fn mdd(&self) -> f64 {
        (**self).mdd()
    }
}

/// Result of a weighted blend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlendedRisk {
    /// Weighted downside volatility
    pub sigma_down: f64,
    /// Weighted total volatility
    pub sigma_total: f64,
    /// Weighted maximum drawdown
    pub mdd: f64,
}

impl RiskProfile for BlendedRisk {
    fn sigma_down(&self) -> f64 {
        self.sigma_down
    }

    fn sigma_total(&self) -> f64 {
        self.sigma_total
    }

    fn mdd(&self) -> f64 {
        self.mdd
    }
}

/// Fail unless `weights` sum to 1.0 within [`WEIGHT_TOLERANCE`].
pub fn check_weight_sum(weights: impl IntoIterator<Item = f64>) -> Result<(), MetricsError> {
    let sum: f64 = weights.into_iter().sum();
    if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(MetricsError::WeightSum {
            sum,
            tolerance: WEIGHT_TOLERANCE,
        });
    }
    Ok(())
}

/// Weighted sum of each metric. Weights are used as given.
pub fn weighted_blend<P: RiskProfile>(parts: impl IntoIterator<Item = (P, f64)>) -> BlendedRisk {
    parts.into_iter().fold(
        BlendedRisk {
            sigma_down: 0.0,
            sigma_total: 0.0,
            mdd: 0.0,
        },
        |acc, (p, w)| BlendedRisk {
            sigma_down: acc.sigma_down + p.sigma_down() * w,
            sigma_total: acc.sigma_total + p.sigma_total() * w,
            mdd: acc.mdd + p.mdd() * w,
        },
    )
}

/// Blend sector volatilities by exposure weight.
///
/// Strict: the exposures must sum to 1.0 and every sector must be present.
/// Returns `(sigma_total, sigma_down)`.
pub fn blend_volatilities<P: RiskProfile>(
    sector_metrics: &HashMap<String, P>,
    exposures: &[(String, f64)],
) -> Result<(f64, f64), MetricsError> {
    check_weight_sum(exposures.iter().map(|(_, w)| *w))?;

    let parts = exposures
        .iter()
        .map(|(sector, w)| {
            sector_metrics
                .get(sector)
                .map(|m| (m, *w))
                .ok_or_else(|| MetricsError::MissingSector(sector.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let blended = weighted_blend(parts);
    Ok((blended.sigma_total, blended.sigma_down))
}

/// Weighted sum of return series on the dates common to all of them.
pub fn blend_returns(parts: &[(&ReturnSeries, f64)]) -> Result<ReturnSeries, MetricsError> {
    let Some(((first, first_weight), rest)) = parts.split_first() else {
        return Ok(ReturnSeries::empty());
    };

    let lookups: Vec<(HashMap<NaiveDate, f64>, f64)> = rest
        .iter()
        .map(|(s, w)| (s.iter().collect(), *w))
        .collect();

    let mut dates = Vec::new();
    let mut values = Vec::new();
    'dates: for (date, r) in first.iter() {
        let mut total = r * first_weight;
        for (lookup, w) in &lookups {
            match lookup.get(&date) {
                Some(r) => total += r * w,
                None => continue 'dates,
            }
        }
        dates.push(date);
        values.push(total);
    }

    Ok(ReturnSeries::new(dates, values)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn risk(sigma_down: f64, sigma_total: f64, mdd: f64) -> BlendedRisk {
        BlendedRisk {
            sigma_down,
            sigma_total,
            mdd,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, d).unwrap()
    }

    #[test]
    fn test_weighted_blend() {
        let a = risk(0.20, 0.30, -0.40);
        let b = risk(0.10, 0.20, -0.20);
        let blended = weighted_blend([(&a, 0.6), (&b, 0.4)]);
        assert_relative_eq!(blended.sigma_down, 0.16, epsilon = 1e-12);
        assert_relative_eq!(blended.sigma_total, 0.26, epsilon = 1e-12);
        assert_relative_eq!(blended.mdd, -0.32, epsilon = 1e-12);
    }

    #[test]
    fn test_blend_volatilities() {
        let mut metrics = HashMap::new();
        metrics.insert("NONFER".to_string(), risk(0.20, 0.30, -0.40));
        metrics.insert("GOLD".to_string(), risk(0.10, 0.20, -0.20));
        let exposures = vec![("NONFER".to_string(), 0.6), ("GOLD".to_string(), 0.4)];

        let (sigma_total, sigma_down) = blend_volatilities(&metrics, &exposures).unwrap();
        assert_relative_eq!(sigma_total, 0.26, epsilon = 1e-12);
        assert_relative_eq!(sigma_down, 0.16, epsilon = 1e-12);
    }

    #[test]
    fn test_blend_volatilities_rejects_bad_weights() {
        let mut metrics = HashMap::new();
        metrics.insert("A".to_string(), risk(0.2, 0.3, -0.1));
        metrics.insert("B".to_string(), risk(0.2, 0.3, -0.1));
        let exposures = vec![("A".to_string(), 0.6), ("B".to_string(), 0.5)];

        let result = blend_volatilities(&metrics, &exposures);
        assert!(matches!(result, Err(MetricsError::WeightSum { .. })));
    }

    #[test]
    fn test_blend_volatilities_rejects_missing_sector() {
        let metrics: HashMap<String, BlendedRisk> = HashMap::new();
        let exposures = vec![("A".to_string(), 1.0)];
        let result = blend_volatilities(&metrics, &exposures);
        assert!(matches!(result, Err(MetricsError::MissingSector(s)) if s == "A"));
    }

    #[test]
    fn test_weight_tolerance() {
        assert!(check_weight_sum([0.5, 0.5005]).is_ok());
        assert!(check_weight_sum([0.5, 0.502]).is_err());
    }

    #[test]
    fn test_blend_returns_on_common_dates() {
        let a = ReturnSeries::new(vec![day(1), day(2), day(3)], vec![0.01, 0.02, 0.03]).unwrap();
        let b = ReturnSeries::new(vec![day(2), day(3), day(4)], vec![0.10, 0.20, 0.30]).unwrap();

        let blended = blend_returns(&[(&a, 0.5), (&b, 0.5)]).unwrap();
        assert_eq!(blended.dates(), &[day(2), day(3)]);
        assert_relative_eq!(blended.values()[0], 0.06, epsilon = 1e-12);
        assert_relative_eq!(blended.values()[1], 0.115, epsilon = 1e-12);
    }

    #[test]
    fn test_blend_returns_empty() {
        assert!(blend_returns(&[]).unwrap().is_empty());
    }
}
