#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/volrisk/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod expected;
pub mod model;

// Re-export main types
pub use error::{ExpectedReturnError, RiskError};
pub use expected::{
    ExpectedReturn, ModelTerms, MultipleType, ReturnSource, ReturnSourceKind, ValuationModel,
    calculate_expected_return,
};
pub use model::{
    RiskAssessment, RiskConfig, RiskInputs, RiskMode, RiskTerms, SchemeCParams, SchemeCWeights,
    SemiMddParams, calculate_risk, risk_scheme_c, risk_semimdd, scheme_c_loss_risk,
    value_to_risk_ratio,
};
