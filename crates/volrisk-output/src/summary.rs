//! Terminal summary of the top of a ranking.

use crate::export::RankedRow;
use std::fmt;

/// Rows shown when no limit is given.
pub const DEFAULT_TOP_N: usize = 10;

/// Top-N view over a ranked table.
#[derive(Debug, Clone, Copy)]
pub struct RankingSummary<'a> {
    rows: &'a [RankedRow],
    top: usize,
}

fn percent(value: f64) -> String {
    format!("{:>6}", format!("{:.2}%", value * 100.0))
}

impl<'a> RankingSummary<'a> {
    /// Summary of the first `top` rows.
    pub const fn new(rows: &'a [RankedRow], top: usize) -> Self {
        Self { rows, top }
    }

    /// Rows that will be shown.
    pub fn shown(&self) -> &'a [RankedRow] {
        &self.rows[..self.top.min(self.rows.len())]
    }

    /// One line per company:
    /// ` 1. Acme         | VTR:   1.50 | ER: 24.00% | Risk: 16.00%`
    pub fn lines(&self) -> Vec<String> {
        self.shown()
            .iter()
            .map(|row| {
                format!(
                    "{:>2}. {:<12} | VTR: {:>6.2} | ER: {} | Risk: {}",
                    row.rank,
                    row.name,
                    row.vtr,
                    percent(row.er),
                    percent(row.loss_risk)
                )
            })
            .collect()
    }

    /// Format as ASCII table for terminal display.
    pub fn to_ascii_table(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!(
            "\nTop {} by value-to-risk ({} ranked)\n",
            self.shown().len(),
            self.rows.len()
        ));
        output.push_str(&"=".repeat(64));
        output.push('\n');
        for line in self.lines() {
            output.push_str(&line);
            output.push('\n');
        }
        output.push_str(&"=".repeat(64));
        output.push('\n');
        output
    }
}

impl fmt::Display for RankingSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_ascii_table())
    }
}

/// Render the default top-10 summary.
pub fn generate_ranking_summary(rows: &[RankedRow]) -> String {
    RankingSummary::new(rows, DEFAULT_TOP_N).to_ascii_table()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::tests::ranked;

    #[test]
    fn test_line_format() {
        let rows = vec![ranked(1, "Acme", 1.5)];
        let lines = RankingSummary::new(&rows, 10).lines();
        assert_eq!(
            lines,
            vec![" 1. Acme         | VTR:   1.50 | ER: 24.00% | Risk: 16.00%".to_string()]
        );
    }

    #[test]
    fn test_limits_to_top_n() {
        let rows: Vec<_> = (1..=15).map(|i| ranked(i, "Co", 1.0)).collect();
        let summary = RankingSummary::new(&rows, 10);
        assert_eq!(summary.shown().len(), 10);
        assert!(generate_ranking_summary(&rows).contains("Top 10 by value-to-risk (15 ranked)"));
        assert!(generate_ranking_summary(&rows).contains("10. Co"));
    }

    #[test]
    fn test_infinite_ratio_and_empty() {
        let rows = vec![ranked(1, "Cash Box", f64::INFINITY)];
        assert!(RankingSummary::new(&rows, 5).lines()[0].contains("VTR:    inf"));
        assert!(RankingSummary::new(&[], 10).lines().is_empty());
    }
}
