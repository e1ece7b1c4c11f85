//! Combined validation report

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{
    analyze_coverage_statistics, cross_check_with_static_analysis, validate_coverage_data,
    CoverageStatistics, CrossCheckResult, Severity, ValidationConfig, ValidationIssue,
};
use crate::coverage::CoverageData;
use crate::result::CoverageResult;

/// Result of the consistency checks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationSection {
    /// No issue was found
    pub is_valid: bool,
    /// Every issue found
    pub issues: Vec<ValidationIssue>,
}

/// Consistency checks, statistics and cross-check of one data set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Consistency checks
    pub validation: ValidationSection,
    /// Coverage distribution
    pub statistics: CoverageStatistics,
    /// Static re-analysis
    pub cross_check: CrossCheckResult,
}

impl ValidationReport {
    /// Run every pass over `data`
    #[must_use]
    pub fn build(data: &CoverageData, config: &ValidationConfig) -> Self {
        let (is_valid, issues) = validate_coverage_data(data, config);
        let statistics = analyze_coverage_statistics(data, config);
        let cross_check = cross_check_with_static_analysis(data);
        tracing::info!(
            is_valid,
            issues = issues.len(),
            outliers = statistics.outliers.len(),
            anomalies = statistics.anomalies.len(),
            discrepancies = cross_check.discrepancies.len(),
            "validation finished"
        );
        Self {
            validation: ValidationSection { is_valid, issues },
            statistics,
            cross_check,
        }
    }

    /// Number of error-severity issues
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.validation
            .issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }

    /// Number of warning-severity issues
    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.validation.issues.len() - self.error_count()
    }

    /// Whether the data passes under the given policy
    ///
    /// Errors always fail. Warnings fail only when `strict`.
    #[must_use]
    pub fn passes(&self, strict: bool) -> bool {
        self.error_count() == 0 && (!strict || self.validation.is_valid)
    }

    /// Serialize as pretty JSON
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoverageError::Json`] if serialization fails.
    pub fn to_json(&self) -> CoverageResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write as JSON
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoverageError::Json`] or [`crate::CoverageError::Io`].
    pub fn save(&self, path: &Path) -> CoverageResult<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::coverage::formatters::fixtures::sample_data_with_source;

    #[test]
    fn test_report_json_shape() {
        let report = ValidationReport::build(&sample_data_with_source(), &ValidationConfig::default());
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["validation"]["is_valid"], true);
        assert!(json["validation"]["issues"].as_array().unwrap().is_empty());
        for key in ["mean", "median", "std_dev", "outliers", "anomalies"] {
            assert!(json["statistics"].get(key).is_some(), "{key}");
        }
        for key in ["files_checked", "discrepancies", "unanalyzed_files", "analysis_success"] {
            assert!(json["cross_check"].get(key).is_some(), "{key}");
        }
        assert_eq!(json["cross_check"]["files_checked"], 1);
    }

    #[test]
    fn test_strict_policy() {
        let mut data = sample_data_with_source();
        data.summary.as_mut().unwrap().total_lines = 99;
        let report = ValidationReport::build(&data, &ValidationConfig::default());
        assert_eq!(report.error_count(), 0);
        assert!(report.warning_count() > 0);
        assert!(report.passes(false));
        assert!(!report.passes(true));

        let empty = ValidationReport::build(&CoverageData::default(), &ValidationConfig::default());
        assert_eq!(empty.error_count(), 2);
        assert!(!empty.passes(false));
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("validation.json");
        let report = ValidationReport::build(&sample_data_with_source(), &ValidationConfig::default());
        report.save(&path).unwrap();
        let back: ValidationReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back.validation, report.validation);
        assert_eq!(back.cross_check, report.cross_check);
    }
}
