//! Coverage data validation
//!
//! Three independent passes over a [`CoverageData`](crate::coverage::CoverageData):
//!
//! - [`validate_coverage_data`] re-derives every count and percentage and
//!   reports disagreements as [`ValidationIssue`]s
//! - [`analyze_coverage_statistics`] finds outlier and anomalous files
//! - [`cross_check_with_static_analysis`] re-analyzes embedded source and
//!   diffs it against what the instrumenter recorded
//!
//! [`ValidationReport::build`] runs all three. None of them fail; problems
//! are data.

mod cross_check;
mod report;
mod statistics;
mod validator;

pub use cross_check::{cross_check_with_static_analysis, CrossCheckResult, FileDiscrepancy};
pub use report::{ValidationReport, ValidationSection};
pub use statistics::{analyze_coverage_statistics, Anomaly, AnomalyKind, CoverageStatistics, Outlier};
pub use validator::{validate_coverage_data, IssueCategory, Severity, ValidationIssue};

use serde::{Deserialize, Serialize};

/// Validator settings; every check can be switched off
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Allowed difference between reported and recomputed percentages, in points
    pub validation_threshold: f64,
    /// z-score above which a file is an outlier
    pub outlier_z_threshold: f64,
    /// Compare summary counts with the per-file sums
    pub check_line_counts: bool,
    /// Recompute percentages
    pub check_percentages: bool,
    /// Check that absolute file paths exist
    pub check_file_existence: bool,
    /// Compare `files` with `original_files`
    pub check_cross_module: bool,
    /// Compare per-file counts and line states with the per-line map
    pub check_line_states: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            validation_threshold: 0.5,
            outlier_z_threshold: 2.0,
            check_line_counts: true,
            check_percentages: true,
            check_file_existence: true,
            check_cross_module: true,
            check_line_states: true,
        }
    }
}
