//! Expected return, either supplied directly or from a valuation re-rating.
//!
//! ER_raw = (Target / Current * (1 + growth) - 1) + DividendYield + BuybackYield
//! ER     = ER_raw * ExecutionProb

use crate::error::ExpectedReturnError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Valuation multiple the re-rating is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MultipleType {
    /// Price / earnings
    #[serde(rename = "PE")]
    Pe,
    /// Enterprise value / EBITDA
    #[serde(rename = "EV/EBITDA")]
    EvEbitda,
    /// Enterprise value / sales
    #[serde(rename = "EV/Sales")]
    EvSales,
}

impl fmt::Display for MultipleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pe => write!(f, "PE"),
            Self::EvEbitda => write!(f, "EV/EBITDA"),
            Self::EvSales => write!(f, "EV/Sales"),
        }
    }
}

const fn zero() -> f64 {
    0.0
}

const fn one() -> f64 {
    1.0
}

/// Multiple re-rating model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValuationModel {
    /// Multiple type
    #[serde(rename = "type")]
    pub multiple_type: MultipleType,
    /// Current multiple (> 0)
    pub current_multiple: f64,
    /// Target multiple (> 0)
    pub target_multiple: f64,
    /// Forward 12-month growth of the multiple's denominator
    pub growth_12m: f64,
    /// Dividend yield (>= 0)
    #[serde(default = "zero")]
    pub dividend_yield: f64,
    /// Net buyback yield (>= 0)
    #[serde(default = "zero")]
    pub buyback_yield: f64,
    /// Probability the re-rating happens, in `[0, 1]`
    #[serde(default = "one")]
    pub execution_prob: f64,
}

impl ValuationModel {
    /// Model with no yields and certain execution.
    pub const fn new(
        multiple_type: MultipleType,
        current_multiple: f64,
        target_multiple: f64,
        growth_12m: f64,
    ) -> Self {
        Self {
            multiple_type,
            current_multiple,
            target_multiple,
            growth_12m,
            dividend_yield: 0.0,
            buyback_yield: 0.0,
            execution_prob: 1.0,
        }
    }

    /// Price/earnings re-rating with EPS growth.
    pub const fn pe(current_pe: f64, target_pe: f64, eps_growth: f64) -> Self {
        Self::new(MultipleType::Pe, current_pe, target_pe, eps_growth)
    }

    /// EV/EBITDA re-rating with EBITDA growth.
    pub const fn ev_ebitda(current: f64, target: f64, ebitda_growth: f64) -> Self {
        Self::new(MultipleType::EvEbitda, current, target, ebitda_growth)
    }

    /// EV/sales re-rating with sales growth.
    pub const fn ev_sales(current: f64, target: f64, sales_growth: f64) -> Self {
        Self::new(MultipleType::EvSales, current, target, sales_growth)
    }

    /// Set the dividend yield.
    pub const fn with_dividend_yield(mut self, dividend_yield: f64) -> Self {
        self.dividend_yield = dividend_yield;
        self
    }

    /// Set the net buyback yield.
    pub const fn with_buyback_yield(mut self, buyback_yield: f64) -> Self {
        self.buyback_yield = buyback_yield;
        self
    }

    /// Set the execution probability.
    pub const fn with_execution_prob(mut self, execution_prob: f64) -> Self {
        self.execution_prob = execution_prob;
        self
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> Result<(), ExpectedReturnError> {
        let checks = [
            ("current_multiple", self.current_multiple, self.current_multiple > 0.0, "must be > 0"),
            ("target_multiple", self.target_multiple, self.target_multiple > 0.0, "must be > 0"),
            ("growth_12m", self.growth_12m, self.growth_12m.is_finite(), "must be finite"),
            ("dividend_yield", self.dividend_yield, self.dividend_yield >= 0.0, "must be >= 0"),
            ("buyback_yield", self.buyback_yield, self.buyback_yield >= 0.0, "must be >= 0"),
            (
                "execution_prob",
                self.execution_prob,
                (0.0..=1.0).contains(&self.execution_prob),
                "must be within [0, 1]",
            ),
        ];
        for (name, value, ok, reason) in checks {
            if !ok {
                return Err(ExpectedReturnError::InvalidParameter {
                    name,
                    value,
                    reason,
                });
            }
        }
        Ok(())
    }

    /// Re-rating return `target / current * (1 + growth) - 1`.
    pub fn multiple_return(&self) -> f64 {
        (self.target_multiple / self.current_multiple) * (1.0 + self.growth_12m) - 1.0
    }

    /// Evaluate the model.
    pub fn evaluate(&self) -> Result<ExpectedReturn, ExpectedReturnError> {
        self.validate()?;
        let multiple_return = self.multiple_return();
        let er_raw = multiple_return + self.dividend_yield + self.buyback_yield;
        Ok(ExpectedReturn {
            source: ReturnSourceKind::Model,
            er_raw,
            er: er_raw * self.execution_prob,
            model: Some(ModelTerms {
                multiple_type: self.multiple_type,
                multiple_return,
                dividend_yield: self.dividend_yield,
                buyback_yield: self.buyback_yield,
                execution_prob: self.execution_prob,
            }),
        })
    }
}

/// Where an expected return came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnSourceKind {
    /// Supplied verbatim
    Direct,
    /// Computed from a valuation model
    Model,
}

impl fmt::Display for ReturnSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Model => write!(f, "model"),
        }
    }
}

/// Terms of a model-based expected return.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelTerms {
    /// Multiple type
    pub multiple_type: MultipleType,
    /// Re-rating return
    pub multiple_return: f64,
    /// Dividend yield
    pub dividend_yield: f64,
    /// Net buyback yield
    pub buyback_yield: f64,
    /// Execution probability
    pub execution_prob: f64,
}

/// An expected return with its provenance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpectedReturn {
    /// Origin of the value
    pub source: ReturnSourceKind,
    /// Return before execution probability
    pub er_raw: f64,
    /// Execution-adjusted return
    pub er: f64,
    /// Model terms, for model-based returns
    pub model: Option<ModelTerms>,
}

impl ExpectedReturn {
    /// A directly supplied return; raw and adjusted are the same.
    pub const fn direct(value: f64) -> Self {
        Self {
            source: ReturnSourceKind::Direct,
            er_raw: value,
            er: value,
            model: None,
        }
    }
}

/// Either a direct expected return or a valuation model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ReturnSource {
    /// Expected return supplied verbatim
    Direct(f64),
    /// Valuation re-rating model
    Model(ValuationModel),
}

impl ReturnSource {
    /// Compute the expected return.
    pub fn evaluate(&self) -> Result<ExpectedReturn, ExpectedReturnError> {
        match self {
            Self::Direct(value) => Ok(ExpectedReturn::direct(*value)),
            Self::Model(model) => model.evaluate(),
        }
    }
}

/// Expected return from optional inputs; a direct value takes precedence.
pub fn calculate_expected_return(
    expected_return: Option<f64>,
    model: Option<&ValuationModel>,
) -> Result<ExpectedReturn, ExpectedReturnError> {
    match (expected_return, model) {
        (Some(value), _) => Ok(ExpectedReturn::direct(value)),
        (None, Some(model)) => model.evaluate(),
        (None, None) => Err(ExpectedReturnError::MissingInput),
    }
}
