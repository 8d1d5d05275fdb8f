#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/volrisk/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod ranker;
pub mod sector;

#[cfg(test)]
mod testing;

// Re-export main types from sub-crates
pub use volrisk_data as data;
pub use volrisk_metrics as metrics;
pub use volrisk_output as output;
pub use volrisk_risk as risk;

pub use config::{
    CompaniesConfig, CompanyConfig, EngineSettings, SectorSelector, SectorSpec, SectorsConfig,
};
pub use error::{Error, ErrorKind, Result, Stage};
pub use ranker::{
    BetaResolution, CompanyResult, Ranker, build_report, rank, rank_and_export, sector_info,
};
pub use sector::{ComputedSectors, SectorAnalyzer, SectorBlend, SectorMetrics, WeightPolicy};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
