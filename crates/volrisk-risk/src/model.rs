//! Loss-Risk Model
//!
//! Turns sector risk inputs plus company parameters into a scalar loss risk.
//! Two formula families exist and the mode is fixed per call:
//!
//! Scheme C:
//! LossRisk = w_down * σ_down + w_beta * (β * σ_total) + w_frag * (Frag / 100)
//!
//! SemiMDD:
//! LossRisk = w * (σ_down * Idio) + (1 - w) * |MDD| + FragilityAdd
//!
//! Every assessment keeps its per-term breakdown and the inputs used, so the
//! total can be re-derived from an export.

use crate::error::RiskError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Allowed deviation of the Scheme C weight sum from 1.0.
pub const WEIGHT_TOLERANCE: f64 = 0.001;

/// Bounds applied to the SemiMDD idiosyncratic multiplier.
pub const IDIO_RANGE: (f64, f64) = (0.7, 1.5);

/// Risk formula family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskMode {
    /// Weighted downside, beta-scaled total volatility and fragility
    #[serde(rename = "SchemeC")]
    SchemeC,
    /// Weighted downside volatility and drawdown plus a fragility add-on
    #[serde(rename = "SemiMDD")]
    SemiMdd,
}

impl fmt::Display for RiskMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SchemeC => write!(f, "SchemeC"),
            Self::SemiMdd => write!(f, "SemiMDD"),
        }
    }
}

impl FromStr for RiskMode {
    type Err = RiskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SchemeC" => Ok(Self::SchemeC),
            "SemiMDD" => Ok(Self::SemiMdd),
            other => Err(RiskError::UnsupportedMode(other.to_string())),
        }
    }
}

/// Scheme C weight triple. Omitted fields take their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemeCWeights {
    /// Weight of downside volatility (default: 0.6)
    pub w_down: f64,
    /// Weight of beta-scaled total volatility (default: 0.3)
    pub w_beta: f64,
    /// Weight of fragility (default: 0.1)
    pub w_frag: f64,
}

impl Default for SchemeCWeights {
    fn default() -> Self {
        Self {
            w_down: 0.6,
            w_beta: 0.3,
            w_frag: 0.1,
        }
    }
}

impl SchemeCWeights {
    /// Build a validated weight triple.
    pub fn new(w_down: f64, w_beta: f64, w_frag: f64) -> Result<Self, RiskError> {
        let weights = Self {
            w_down,
            w_beta,
            w_frag,
        };
        weights.validate()?;
        Ok(weights)
    }

    /// Sum of the three weights.
    pub fn sum(&self) -> f64 {
        self.w_down + self.w_beta + self.w_frag
    }

    /// Each weight in `[0, 1]` and the sum within tolerance of 1.0.
    pub fn validate(&self) -> Result<(), RiskError> {
        for (name, value) in [
            ("w_down", self.w_down),
            ("w_beta", self.w_beta),
            ("w_frag", self.w_frag),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(RiskError::InvalidParameter {
                    name,
                    value,
                    reason: "must be within [0, 1]",
                });
            }
        }
        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(RiskError::InvalidWeights { sum });
        }
        Ok(())
    }
}

/// Scheme C parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SchemeCParams {
    /// Stock beta against its sector; 1.0 when unset
    pub beta: Option<f64>,
    /// Fragility in percentage points (1.5 means 1.5%)
    pub frag: f64,
    /// Weight triple
    pub weights: SchemeCWeights,
}

impl Default for SchemeCParams {
    fn default() -> Self {
        Self {
            beta: None,
            frag: 0.0,
            weights: SchemeCWeights::default(),
        }
    }
}

impl SchemeCParams {
    /// Beta used by the formula.
    pub fn effective_beta(&self) -> f64 {
        self.beta.unwrap_or(1.0)
    }
}

/// SemiMDD parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SemiMddParams {
    /// Idiosyncratic multiplier on downside volatility, clamped to [`IDIO_RANGE`]
    pub idio: f64,
    /// Weight of the downside term; the drawdown term gets `1 - w`
    pub w: f64,
    /// Absolute fragility add-on (decimal)
    pub fragility_add: f64,
}

impl Default for SemiMddParams {
    fn default() -> Self {
        Self {
            idio: 1.0,
            w: 0.5,
            fragility_add: 0.0,
        }
    }
}

/// Per-company risk configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode")]
pub enum RiskConfig {
    /// Scheme C
    #[serde(rename = "SchemeC")]
    SchemeC(SchemeCParams),
    /// SemiMDD
    #[serde(rename = "SemiMDD")]
    SemiMdd(SemiMddParams),
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self::SchemeC(SchemeCParams::default())
    }
}

impl RiskConfig {
    /// Formula family of this configuration.
    pub const fn mode(&self) -> RiskMode {
        match self {
            Self::SchemeC(_) => RiskMode::SchemeC,
            Self::SemiMdd(_) => RiskMode::SemiMdd,
        }
    }
}

/// Weighted terms that add up to the total risk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RiskTerms {
    /// Scheme C decomposition
    SchemeC {
        /// `w_down * σ_down`
        downside_component: f64,
        /// `w_beta * β * σ_total`
        beta_component: f64,
        /// `w_frag * frag / 100`
        fragility_component: f64,
    },
    /// Fixed-weight Scheme C decomposition
    LegacySchemeC {
        /// `0.6 * σ_down`
        downside_component: f64,
        /// `0.3 * β * σ_total`
        total_vol_component: f64,
        /// `0.1 * fragility_add`
        fragility_component: f64,
    },
    /// SemiMDD decomposition
    SemiMdd {
        /// `w * σ_down * idio`
        downside_component: f64,
        /// `(1 - w) * |mdd|`
        mdd_component: f64,
        /// Additive fragility
        fragility_add: f64,
    },
}

impl RiskTerms {
    /// Sum of the terms.
    pub fn sum(&self) -> f64 {
        match *self {
            Self::SchemeC {
                downside_component,
                beta_component,
                fragility_component,
            } => downside_component + beta_component + fragility_component,
            Self::LegacySchemeC {
                downside_component,
                total_vol_component,
                fragility_component,
            } => downside_component + total_vol_component + fragility_component,
            Self::SemiMdd {
                downside_component,
                mdd_component,
                fragility_add,
            } => downside_component + mdd_component + fragility_add,
        }
    }

    /// The three terms in formula order.
    pub fn components(&self) -> [f64; 3] {
        match *self {
            Self::SchemeC {
                downside_component,
                beta_component,
                fragility_component,
            } => [downside_component, beta_component, fragility_component],
            Self::LegacySchemeC {
                downside_component,
                total_vol_component,
                fragility_component,
            } => [downside_component, total_vol_component, fragility_component],
            Self::SemiMdd {
                downside_component,
                mdd_component,
                fragility_add,
            } => [downside_component, mdd_component, fragility_add],
        }
    }
}

/// Inputs and parameters an assessment was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskInputs {
    /// Downside volatility
    pub sigma_down: f64,
    /// Total volatility (not used by SemiMDD)
    pub sigma_total: Option<f64>,
    /// Maximum drawdown (SemiMDD only)
    pub mdd: Option<f64>,
    /// Beta (Scheme C only)
    pub beta: Option<f64>,
    /// Fragility in percentage points (Scheme C only)
    pub frag: Option<f64>,
    /// Weight triple (Scheme C only)
    pub weights: Option<SchemeCWeights>,
    /// Idiosyncratic multiplier after clamping (SemiMDD only)
    pub idio: Option<f64>,
    /// Downside weight (SemiMDD only)
    pub w: Option<f64>,
    /// Absolute fragility add-on (SemiMDD and fixed-weight Scheme C)
    pub fragility_add: Option<f64>,
}

impl RiskInputs {
    const fn base(sigma_down: f64) -> Self {
        Self {
            sigma_down,
            sigma_total: None,
            mdd: None,
            beta: None,
            frag: None,
            weights: None,
            idio: None,
            w: None,
            fragility_add: None,
        }
    }
}

/// Result of a loss-risk computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Formula family used
    pub mode: RiskMode,
    /// Total loss risk
    pub total_risk: f64,
    /// Per-term breakdown
    pub terms: RiskTerms,
    /// Inputs and parameters used
    pub inputs: RiskInputs,
}

/// Scheme C loss risk with a configurable weight triple.
///
/// # Arguments
/// * `sigma_down` - Sector downside volatility
/// * `sigma_total` - Sector total volatility
/// * `beta` - Stock beta against the sector
/// * `frag` - Fragility in percentage points
/// * `weights` - Weight triple, validated before use
pub fn scheme_c_loss_risk(
    sigma_down: f64,
    sigma_total: f64,
    beta: f64,
    frag: f64,
    weights: &SchemeCWeights,
) -> Result<RiskAssessment, RiskError> {
    weights.validate()?;

    let terms = RiskTerms::SchemeC {
        downside_component: weights.w_down * sigma_down,
        beta_component: weights.w_beta * (beta * sigma_total),
        fragility_component: weights.w_frag * (frag / 100.0),
    };

    Ok(RiskAssessment {
        mode: RiskMode::SchemeC,
        total_risk: terms.sum(),
        terms,
        inputs: RiskInputs {
            sigma_total: Some(sigma_total),
            beta: Some(beta),
            frag: Some(frag),
            weights: Some(*weights),
            ..RiskInputs::base(sigma_down)
        },
    })
}

/// Scheme C with the fixed 0.6 / 0.3 / 0.1 weights.
///
/// `fragility_add` is a decimal here, not percentage points.
pub fn risk_scheme_c(
    sigma_down: f64,
    sigma_total: f64,
    beta: f64,
    fragility_add: f64,
) -> RiskAssessment {
    let terms = RiskTerms::LegacySchemeC {
        downside_component: 0.6 * sigma_down,
        total_vol_component: 0.3 * (beta * sigma_total),
        fragility_component: 0.1 * fragility_add,
    };

    RiskAssessment {
        mode: RiskMode::SchemeC,
        total_risk: terms.sum(),
        terms,
        inputs: RiskInputs {
            sigma_total: Some(sigma_total),
            beta: Some(beta),
            fragility_add: Some(fragility_add),
            ..RiskInputs::base(sigma_down)
        },
    }
}

/// SemiMDD loss risk.
///
/// `idio` outside [`IDIO_RANGE`] is clamped, with a warning.
pub fn risk_semimdd(
    sigma_down: f64,
    mdd: f64,
    idio: f64,
    w: f64,
    fragility_add: f64,
) -> RiskAssessment {
    let (lo, hi) = IDIO_RANGE;
    let clamped = idio.clamp(lo, hi);
    if clamped != idio {
        warn!(idio, clamped, "idio outside [0.7, 1.5]; clamping");
    }

    let terms = RiskTerms::SemiMdd {
        downside_component: w * (sigma_down * clamped),
        mdd_component: (1.0 - w) * mdd.abs(),
        fragility_add,
    };

    RiskAssessment {
        mode: RiskMode::SemiMdd,
        total_risk: terms.sum(),
        terms,
        inputs: RiskInputs {
            mdd: Some(mdd),
            idio: Some(clamped),
            w: Some(w),
            fragility_add: Some(fragility_add),
            ..RiskInputs::base(sigma_down)
        },
    }
}

/// Dispatch on the configured mode.
pub fn calculate_risk(
    sigma_down: f64,
    sigma_total: f64,
    mdd: f64,
    config: &RiskConfig,
) -> Result<RiskAssessment, RiskError> {
    match config {
        RiskConfig::SchemeC(params) => scheme_c_loss_risk(
            sigma_down,
            sigma_total,
            params.effective_beta(),
            params.frag,
            &params.weights,
        ),
        RiskConfig::SemiMdd(params) => Ok(risk_semimdd(
            sigma_down,
            mdd,
            params.idio,
            params.w,
            params.fragility_add,
        )),
    }
}

/// Expected return per unit of loss risk.
///
/// A non-positive risk yields `+inf`.
pub fn value_to_risk_ratio(expected_return: f64, loss_risk: f64) -> f64 {
    if loss_risk <= 0.0 {
        return f64::INFINITY;
    }
    expected_return / loss_risk
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn test_scheme_c_decomposition() {
        let result =
            scheme_c_loss_risk(0.25, 0.30, 1.15, 3.0, &SchemeCWeights::default()).unwrap();

        let [down, beta, frag] = result.terms.components();
        assert_relative_eq!(down, 0.15, epsilon = 1e-12);
        assert_relative_eq!(beta, 0.1035, epsilon = 1e-12);
        assert_relative_eq!(frag, 0.003, epsilon = 1e-12);
        assert_relative_eq!(result.total_risk, 0.2565, epsilon = 1e-6);
        assert_relative_eq!(
            result.total_risk,
            0.6 * 0.25 + 0.3 * (1.15 * 0.30) + 0.1 * (3.0 / 100.0),
            epsilon = 1e-12
        );
        assert_eq!(result.mode, RiskMode::SchemeC);
        assert_eq!(result.inputs.beta, Some(1.15));
    }

    #[test]
    fn test_scheme_c_rejects_bad_weights() {
        let weights = SchemeCWeights {
            w_down: 0.5,
            w_beta: 0.3,
            w_frag: 0.1,
        };
        let result = scheme_c_loss_risk(0.25, 0.30, 1.0, 0.0, &weights);
        assert!(matches!(result, Err(RiskError::InvalidWeights { .. })));
        assert!(SchemeCWeights::new(0.7, 0.2, 0.1).is_ok());
        assert!(SchemeCWeights::new(1.2, -0.3, 0.1).is_err());
    }

    #[test]
    fn test_semimdd() {
        let result = risk_semimdd(0.25, -0.30, 1.10, 0.5, 0.025);
        let [down, mdd, frag] = result.terms.components();
        assert_relative_eq!(down, 0.1375, epsilon = 1e-12);
        assert_relative_eq!(mdd, 0.15, epsilon = 1e-12);
        assert_relative_eq!(frag, 0.025, epsilon = 1e-12);
        assert_relative_eq!(result.total_risk, 0.3125, epsilon = 1e-12);
        assert_eq!(result.mode, RiskMode::SemiMdd);
    }

    #[rstest]
    #[case(2.0, 1.5)]
    #[case(0.1, 0.7)]
    #[case(1.2, 1.2)]
    fn test_semimdd_clamps_idio(#[case] idio: f64, #[case] used: f64) {
        let result = risk_semimdd(0.2, -0.1, idio, 0.5, 0.0);
        assert_eq!(result.inputs.idio, Some(used));
        assert_relative_eq!(result.total_risk, 0.5 * 0.2 * used + 0.05, epsilon = 1e-12);
    }

    #[test]
    fn test_legacy_scheme_c_uses_fixed_weights() {
        let result = risk_scheme_c(0.25, 0.30, 1.15, 0.03);
        assert_relative_eq!(result.total_risk, 0.2565, epsilon = 1e-12);
        assert!(matches!(result.terms, RiskTerms::LegacySchemeC { .. }));
    }

    #[test]
    fn test_calculate_risk_dispatch() {
        let scheme_c = calculate_risk(0.25, 0.30, -0.30, &RiskConfig::default()).unwrap();
        // Beta defaults to 1.0
        assert_relative_eq!(scheme_c.total_risk, 0.15 + 0.09, epsilon = 1e-12);

        let semi = RiskConfig::SemiMdd(SemiMddParams {
            idio: 1.10,
            w: 0.5,
            fragility_add: 0.025,
        });
        let semi = calculate_risk(0.25, 0.30, -0.30, &semi).unwrap();
        assert_relative_eq!(semi.total_risk, 0.3125, epsilon = 1e-12);
    }

    #[test]
    fn test_value_to_risk_ratio() {
        assert_eq!(value_to_risk_ratio(0.40, 0.20), 2.0);
        assert_eq!(value_to_risk_ratio(0.5, 0.0), f64::INFINITY);
        assert_eq!(value_to_risk_ratio(0.5, -0.1), f64::INFINITY);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("SemiMDD".parse::<RiskMode>().unwrap(), RiskMode::SemiMdd);
        assert!(matches!(
            "Foo".parse::<RiskMode>(),
            Err(RiskError::UnsupportedMode(m)) if m == "Foo"
        ));
        assert_eq!(RiskMode::SemiMdd.to_string(), "SemiMDD");
    }

    #[test]
    fn test_config_serde_tag() {
        let config: RiskConfig = serde_json::from_str(
            r#"{"mode":"SemiMDD","idio":1.1,"w":0.4,"fragility_add":0.01}"#,
        )
        .unwrap();
        assert_eq!(config.mode(), RiskMode::SemiMdd);
    }

    #[rstest]
    #[case(r#"{"w_down":0.7,"w_beta":0.2}"#, [0.7, 0.2, 0.1])]
    #[case(r#"{"w_frag":0.2,"w_beta":0.2}"#, [0.6, 0.2, 0.2])]
    #[case("{}", [0.6, 0.3, 0.1])]
    fn test_partial_weights_take_defaults(#[case] json: &str, #[case] expected: [f64; 3]) {
        let weights: SchemeCWeights = serde_json::from_str(json).unwrap();
        assert_eq!([weights.w_down, weights.w_beta, weights.w_frag], expected);
        weights.validate().unwrap();
    }
}
