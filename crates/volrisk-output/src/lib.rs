#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/volrisk/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod export;
pub mod report;
pub mod summary;

pub use export::{
    BetaSource, DetailRow, ExportError, ExportFormat, Exporter, RankedRow, SectorRow,
};
pub use report::{RankingReport, companion_path};
pub use summary::{DEFAULT_TOP_N, RankingSummary, generate_ranking_summary};
