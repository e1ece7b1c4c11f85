//! Plain-text summary table

use std::fmt::Write;

use crate::coverage::CoverageData;

/// Per-file table with a totals row
#[derive(Debug)]
pub struct SummaryFormatter<'a> {
    data: &'a CoverageData,
}

impl<'a> SummaryFormatter<'a> {
    /// Create a summary formatter
    #[must_use]
    pub const fn new(data: &'a CoverageData) -> Self {
        Self { data }
    }

    /// Render the table
    #[must_use]
    pub fn generate(&self) -> String {
        let mut out = String::new();
        let files = self.data.files.as_ref();
        let width = files
            .and_then(|f| f.keys().map(String::len).max())
            .unwrap_or(0)
            .max("File".len())
            .max("Total".len());

        let _ = writeln!(
            out,
            "{:<width$}  {:>7}  {:>8}  {:>7}  {:>7}  {:>7}",
            "File", "Lines", "Executed", "Covered", "Funcs", "Blocks"
        );
        let _ = writeln!(out, "{}", "-".repeat(width + 48));

        for (path, file) in files.into_iter().flatten() {
            let _ = writeln!(
                out,
                "{path:<width$}  {:>7}  {:>8}  {:>6.1}%  {:>6.1}%  {:>6.1}%",
                file.total_lines,
                file.executed_lines,
                file.line_coverage_percent,
                file.function_coverage_percent,
                file.block_coverage_percent,
            );
        }

        if let Some(s) = &self.data.summary {
            let _ = writeln!(out, "{}", "-".repeat(width + 48));
            let _ = writeln!(
                out,
                "{:<width$}  {:>7}  {:>8}  {:>6.1}%  {:>6.1}%  {:>6.1}%",
                "Total",
                s.total_lines,
                s.executed_lines,
                s.line_coverage_percent,
                s.function_coverage_percent,
                s.block_coverage_percent,
            );
            let _ = writeln!(
                out,
                "Overall: {:.1}%  ({} of {} files with covered lines; {} lines executed but not covered)",
                s.overall_percent,
                s.covered_files,
                s.total_files,
                s.executed_lines.saturating_sub(s.covered_lines),
            );
        }
        out
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::coverage::formatters::fixtures::sample_data;

    #[test]
    fn test_summary_rows() {
        let data = sample_data();
        let out = SummaryFormatter::new(&data).generate();
        let row = out.lines().find(|l| l.starts_with("lib/calc.lua")).unwrap();
        assert!(row.contains("50.0%"));
        assert!(out.contains("Total"));
        assert!(out.contains("1 lines executed but not covered"));
    }

    #[test]
    fn test_empty_data_has_header_only() {
        let data = CoverageData::default();
        let out = SummaryFormatter::new(&data).generate();
        assert_eq!(out.lines().count(), 2);
    }
}
