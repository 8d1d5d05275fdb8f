//! Ranking report: ranked table, provenance table and sector table.

use crate::export::{
    DetailRow, ExportError, ExportFormat, Exporter, RankedRow, SectorRow, to_csv,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// A complete ranking run, ready to be written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingReport {
    /// Report generation timestamp.
    pub generated_at: DateTime<Utc>,

    /// Ranked table, best VTR first.
    pub ranking: Vec<RankedRow>,

    /// Provenance table, one row per ranked company.
    pub details: Vec<DetailRow>,

    /// Sectors the run computed.
    pub sectors: Vec<SectorRow>,
}

/// `<dir>/<stem><suffix>.<ext>` next to `path`.
pub fn companion_path(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "ranking".to_string());
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "csv".to_string());
    path.with_file_name(format!("{stem}{suffix}.{ext}"))
}

impl RankingReport {
    /// Create a report stamped with the current time.
    pub fn new(ranking: Vec<RankedRow>, details: Vec<DetailRow>, sectors: Vec<SectorRow>) -> Self {
        Self {
            generated_at: Utc::now(),
            ranking,
            details,
            sectors,
        }
    }

    /// Number of ranked companies.
    pub fn len(&self) -> usize {
        self.ranking.len()
    }

    /// Whether no company was ranked.
    pub fn is_empty(&self) -> bool {
        self.ranking.is_empty()
    }

    /// Write the report and return the files produced.
    ///
    /// CSV writes the ranked table to `path`, the provenance table to
    /// `<stem>_detail.csv` and the sector table to `<stem>_sectors.csv`.
    /// JSON writes a single document holding all three tables.
    pub fn write(&self, path: &Path, format: ExportFormat) -> Result<Vec<PathBuf>, ExportError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let written = match format {
            ExportFormat::Csv => {
                let detail_path = companion_path(path, "_detail");
                let sectors_path = companion_path(path, "_sectors");
                self.ranking.export_to_file(path, format)?;
                self.details.export_to_file(&detail_path, format)?;
                self.sectors.export_to_file(&sectors_path, format)?;
                vec![path.to_path_buf(), detail_path, sectors_path]
            }
            ExportFormat::Json | ExportFormat::PrettyJson => {
                fs::write(path, self.export_to_string(format)?)?;
                vec![path.to_path_buf()]
            }
        };

        info!(
            companies = self.ranking.len(),
            format = %format,
            path = %path.display(),
            "ranking exported"
        );
        Ok(written)
    }
}

impl Exporter for RankingReport {
    /// CSV yields only the ranked table; JSON yields the whole report.
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        match format {
            ExportFormat::Csv => to_csv(&self.ranking),
            ExportFormat::Json => Ok(serde_json::to_string(self)?),
            ExportFormat::PrettyJson => Ok(serde_json::to_string_pretty(self)?),
        }
    }

    fn export_to_file(&self, path: &Path, format: ExportFormat) -> Result<(), ExportError> {
        self.write(path, format).map(|_| ())
    }
}
