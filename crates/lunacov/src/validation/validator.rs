//! Consistency checks over coverage data

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::ValidationConfig;
use crate::coverage::{overall_percent, percent, CoverageData, CoverageSummary, FileCoverage};

/// How bad an issue is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Data is inconsistent but usable
    Warning,
    /// Data cannot be validated
    Error,
}

/// What an issue is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    /// No summary present
    MissingSummary,
    /// No files table present
    MissingFiles,
    /// File counts disagree
    FileCount,
    /// Executable line totals disagree
    LineCount,
    /// Executed line totals disagree
    ExecutedLines,
    /// Covered line totals disagree
    CoveredLines,
    /// Function totals disagree
    FunctionCount,
    /// Covered function totals disagree
    CoveredFunctions,
    /// Block totals disagree
    BlockCount,
    /// Covered block totals disagree
    CoveredBlocks,
    /// A percentage does not match its counts
    Percentage,
    /// An absolute file path no longer exists
    FileExistence,
    /// `files` and `original_files` disagree
    CrossModule,
    /// Per-line state contradicts counts or executability
    LineState,
}

impl fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MissingSummary => "missing_summary",
            Self::MissingFiles => "missing_files",
            Self::FileCount => "file_count",
            Self::LineCount => "line_count",
            Self::ExecutedLines => "executed_lines",
            Self::CoveredLines => "covered_lines",
            Self::FunctionCount => "function_count",
            Self::CoveredFunctions => "covered_functions",
            Self::BlockCount => "block_count",
            Self::CoveredBlocks => "covered_blocks",
            Self::Percentage => "percentage",
            Self::FileExistence => "file_existence",
            Self::CrossModule => "cross_module",
            Self::LineState => "line_state",
        };
        f.write_str(name)
    }
}

/// One finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Kind of finding
    pub category: IssueCategory,
    /// Human-readable description
    pub message: String,
    /// Warning or error
    pub severity: Severity,
    /// Values involved
    #[serde(default)]
    pub details: serde_json::Value,
}

#[derive(Debug, Default)]
struct Issues(Vec<ValidationIssue>);

impl Issues {
    fn push(
        &mut self,
        severity: Severity,
        category: IssueCategory,
        message: String,
        details: serde_json::Value,
    ) {
        match severity {
            Severity::Warning => tracing::warn!(%category, "{message}"),
            Severity::Error => tracing::error!(%category, "{message}"),
        }
        self.0.push(ValidationIssue {
            category,
            message,
            severity,
            details,
        });
    }

    fn warn(&mut self, category: IssueCategory, message: String, details: serde_json::Value) {
        self.push(Severity::Warning, category, message, details);
    }

    fn count(&mut self, category: IssueCategory, scope: &str, field: &str, reported: usize, computed: usize) {
        if reported != computed {
            self.warn(
                category,
                format!("{scope} {field} is {reported}, recomputed {computed}"),
                json!({ "scope": scope, "field": field, "reported": reported, "computed": computed }),
            );
        }
    }

    fn percentage(&mut self, threshold: f64, scope: &str, field: &str, reported: f64, computed: f64) {
        if !reported.is_finite() || (reported - computed).abs() > threshold {
            let shown = if reported.is_finite() {
                json!(reported)
            } else {
                json!(reported.to_string())
            };
            self.warn(
                IssueCategory::Percentage,
                format!("{scope} {field} is {reported:.2}, recomputed {computed:.2}"),
                json!({
                    "scope": scope,
                    "field": field,
                    "reported": shown,
                    "computed": computed,
                    "threshold": threshold,
                }),
            );
        }
    }
}

/// Check coverage data for internal consistency
///
/// A missing summary or files table is an [`Severity::Error`] and ends
/// validation. Every other check runs to completion and contributes
/// [`Severity::Warning`]s, so one call returns the complete list. The
/// data is valid when no issue was found.
#[must_use]
pub fn validate_coverage_data(
    data: &CoverageData,
    config: &ValidationConfig,
) -> (bool, Vec<ValidationIssue>) {
    let mut issues = Issues::default();
    if data.summary.is_none() {
        issues.push(
            Severity::Error,
            IssueCategory::MissingSummary,
            "coverage data has no summary".to_string(),
            serde_json::Value::Null,
        );
    }
    if data.files.is_none() {
        issues.push(
            Severity::Error,
            IssueCategory::MissingFiles,
            "coverage data has no files table".to_string(),
            serde_json::Value::Null,
        );
    }
    let (Some(summary), Some(files)) = (&data.summary, &data.files) else {
        return (false, issues.0);
    };

    if config.check_line_counts {
        check_counts(&mut issues, summary, &CoverageSummary::from_files(files));
    }
    if config.check_percentages {
        let threshold = config.validation_threshold;
        for (path, file) in files {
            check_file_percentages(&mut issues, threshold, path, file);
        }
        check_summary_percentages(&mut issues, threshold, summary);
    }
    if config.check_file_existence {
        for path in files.keys() {
            let p = Path::new(path);
            if p.is_absolute() && !p.exists() {
                issues.warn(
                    IssueCategory::FileExistence,
                    format!("{path} does not exist"),
                    json!({ "file": path }),
                );
            }
        }
    }
    if config.check_cross_module {
        if let Some(original) = &data.original_files {
            let processed: BTreeSet<&String> = files.keys().collect();
            let raw: BTreeSet<&String> = original.keys().collect();
            if processed.len() != raw.len() {
                issues.warn(
                    IssueCategory::CrossModule,
                    format!(
                        "{} processed files but {} original files",
                        processed.len(),
                        raw.len()
                    ),
                    json!({ "files": processed.len(), "original_files": raw.len() }),
                );
            }
            for path in processed.difference(&raw) {
                issues.warn(
                    IssueCategory::CrossModule,
                    format!("{path} has coverage but no original file"),
                    json!({ "file": path, "missing_from": "original_files" }),
                );
            }
            for path in raw.difference(&processed) {
                issues.warn(
                    IssueCategory::CrossModule,
                    format!("{path} has an original file but no coverage"),
                    json!({ "file": path, "missing_from": "files" }),
                );
            }
        }
    }
    if config.check_line_states {
        for (path, file) in files {
            let executable = data
                .original_files
                .as_ref()
                .and_then(|o| o.get(path))
                .map(|o| o.executable_lines.iter().copied().collect::<BTreeSet<u32>>());
            check_line_states(&mut issues, path, file, executable.as_ref());
        }
    }

    let issues = issues.0;
    (issues.is_empty(), issues)
}

fn check_counts(issues: &mut Issues, reported: &CoverageSummary, computed: &CoverageSummary) {
    use IssueCategory as C;
    let pairs = [
        (C::FileCount, "total_files", reported.total_files, computed.total_files),
        (C::FileCount, "covered_files", reported.covered_files, computed.covered_files),
        (C::LineCount, "total_lines", reported.total_lines, computed.total_lines),
        (C::ExecutedLines, "executed_lines", reported.executed_lines, computed.executed_lines),
        (C::CoveredLines, "covered_lines", reported.covered_lines, computed.covered_lines),
        (C::FunctionCount, "total_functions", reported.total_functions, computed.total_functions),
        (C::CoveredFunctions, "covered_functions", reported.covered_functions, computed.covered_functions),
        (C::BlockCount, "total_blocks", reported.total_blocks, computed.total_blocks),
        (C::CoveredBlocks, "covered_blocks", reported.covered_blocks, computed.covered_blocks),
    ];
    for (category, field, r, c) in pairs {
        issues.count(category, "summary", field, r, c);
    }
}

fn check_file_percentages(issues: &mut Issues, threshold: f64, path: &str, file: &FileCoverage) {
    issues.percentage(
        threshold,
        path,
        "line_coverage_percent",
        file.line_coverage_percent,
        percent(file.covered_lines, file.total_lines),
    );
    issues.percentage(
        threshold,
        path,
        "function_coverage_percent",
        file.function_coverage_percent,
        percent(file.covered_functions, file.total_functions),
    );
    issues.percentage(
        threshold,
        path,
        "block_coverage_percent",
        file.block_coverage_percent,
        percent(file.covered_blocks, file.total_blocks),
    );
}

fn check_summary_percentages(issues: &mut Issues, threshold: f64, summary: &CoverageSummary) {
    let line = percent(summary.covered_lines, summary.total_lines);
    let function = percent(summary.covered_functions, summary.total_functions);
    let block = percent(summary.covered_blocks, summary.total_blocks);
    issues.percentage(threshold, "summary", "line_coverage_percent", summary.line_coverage_percent, line);
    issues.percentage(
        threshold,
        "summary",
        "function_coverage_percent",
        summary.function_coverage_percent,
        function,
    );
    issues.percentage(threshold, "summary", "block_coverage_percent", summary.block_coverage_percent, block);
    issues.percentage(
        threshold,
        "summary",
        "overall_percent",
        summary.overall_percent,
        overall_percent(line, function, block, summary.total_blocks > 0),
    );
}

fn check_line_states(
    issues: &mut Issues,
    path: &str,
    file: &FileCoverage,
    executable: Option<&BTreeSet<u32>>,
) {
    let executed = file.lines.values().filter(|l| l.executed).count();
    let covered = file.lines.values().filter(|l| l.covered).count();
    let called = file.functions.values().filter(|f| f.calls > 0).count();
    let entered = file.blocks.values().filter(|b| b.hits > 0).count();
    issues.count(IssueCategory::LineState, path, "total_lines", file.total_lines, file.lines.len());
    issues.count(IssueCategory::LineState, path, "executed_lines", file.executed_lines, executed);
    issues.count(IssueCategory::LineState, path, "covered_lines", file.covered_lines, covered);
    issues.count(IssueCategory::LineState, path, "total_functions", file.total_functions, file.functions.len());
    issues.count(IssueCategory::LineState, path, "covered_functions", file.covered_functions, called);
    issues.count(IssueCategory::LineState, path, "total_blocks", file.total_blocks, file.blocks.len());
    issues.count(IssueCategory::LineState, path, "covered_blocks", file.covered_blocks, entered);

    for (&line, state) in &file.lines {
        if state.covered && !state.executed {
            issues.warn(
                IssueCategory::LineState,
                format!("{path}:{line} is covered but was never executed"),
                json!({ "file": path, "line": line }),
            );
        }
        if executable.is_some_and(|lines| !lines.contains(&line)) {
            issues.warn(
                IssueCategory::LineState,
                format!("{path}:{line} is tracked but not executable"),
                json!({ "file": path, "line": line }),
            );
        }
    }
}
