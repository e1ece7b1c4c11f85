//! Distribution of per-file line coverage

use serde::{Deserialize, Serialize};

use super::ValidationConfig;
use crate::coverage::CoverageData;

/// Files this large with coverage this low are anomalous
const LARGE_FILE_LINES: usize = 100;
const LOW_COVERAGE_PERCENT: f64 = 20.0;
/// Maximum gap between line and function coverage, in points
const MAX_LINE_FUNCTION_GAP: f64 = 50.0;

/// A file far from the mean
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outlier {
    /// File path
    pub file: String,
    /// Its line coverage
    pub line_coverage_percent: f64,
    /// `|pct - mean| / std_dev`
    pub z_score: f64,
}

/// Which heuristic an anomaly tripped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// More than 100 executable lines, under 20% covered
    LargeFileLowCoverage,
    /// Line and function coverage more than 50 points apart
    LineFunctionMismatch,
}

/// A file matching an anomaly heuristic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    /// File path
    pub file: String,
    /// Heuristic
    pub kind: AnomalyKind,
    /// Description
    pub message: String,
}

/// Summary statistics over files with executable lines
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageStatistics {
    /// Mean line coverage
    pub mean: f64,
    /// Median line coverage
    pub median: f64,
    /// Population standard deviation
    pub std_dev: f64,
    /// Files whose z-score exceeds the threshold
    pub outliers: Vec<Outlier>,
    /// Files matching an anomaly heuristic
    pub anomalies: Vec<Anomaly>,
}

/// Compute mean, median, standard deviation, outliers and anomalies
///
/// Files without executable lines are left out. With a standard deviation
/// of zero no file is an outlier.
#[must_use]
pub fn analyze_coverage_statistics(data: &CoverageData, config: &ValidationConfig) -> CoverageStatistics {
    let Some(files) = &data.files else {
        return CoverageStatistics::default();
    };
    let samples: Vec<(&String, f64)> = files
        .iter()
        .filter(|(_, f)| f.total_lines > 0)
        .map(|(path, f)| (path, f.line_coverage_percent))
        .collect();
    if samples.is_empty() {
        return CoverageStatistics::default();
    }

    let n = samples.len() as f64;
    let mean = samples.iter().map(|(_, p)| p).sum::<f64>() / n;
    let std_dev = (samples.iter().map(|(_, p)| (p - mean).powi(2)).sum::<f64>() / n).sqrt();

    let mut sorted: Vec<f64> = samples.iter().map(|(_, p)| *p).collect();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    };

    let mut outliers = Vec::new();
    if std_dev > 0.0 {
        for (path, pct) in &samples {
            let z_score = (pct - mean).abs() / std_dev;
            if z_score > config.outlier_z_threshold {
                tracing::warn!(file = %path, z_score, "coverage outlier");
                outliers.push(Outlier {
                    file: (*path).clone(),
                    line_coverage_percent: *pct,
                    z_score,
                });
            }
        }
    }

    let mut anomalies = Vec::new();
    for (path, file) in files.iter().filter(|(_, f)| f.total_lines > 0) {
        if file.total_lines > LARGE_FILE_LINES && file.line_coverage_percent < LOW_COVERAGE_PERCENT {
            anomalies.push(Anomaly {
                file: path.clone(),
                kind: AnomalyKind::LargeFileLowCoverage,
                message: format!(
                    "{} executable lines but only {:.1}% covered",
                    file.total_lines, file.line_coverage_percent
                ),
            });
        }
        let gap = (file.line_coverage_percent - file.function_coverage_percent).abs();
        if file.total_functions > 0 && gap > MAX_LINE_FUNCTION_GAP {
            anomalies.push(Anomaly {
                file: path.clone(),
                kind: AnomalyKind::LineFunctionMismatch,
                message: format!(
                    "line coverage {:.1}% vs function coverage {:.1}%",
                    file.line_coverage_percent, file.function_coverage_percent
                ),
            });
        }
    }
    for anomaly in &anomalies {
        tracing::warn!(file = %anomaly.file, kind = ?anomaly.kind, "{}", anomaly.message);
    }

    CoverageStatistics {
        mean,
        median,
        std_dev,
        outliers,
        anomalies,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::coverage::{FileCoverage, FunctionCoverage, LineCoverage};
    use std::collections::BTreeMap;

    fn file(total: u32, covered: u32, functions: &[u64]) -> FileCoverage {
        let lines = (1..=total)
            .map(|n| {
                (
                    n,
                    LineCoverage {
                        executed: n <= covered,
                        covered: n <= covered,
                        hits: u64::from(n <= covered),
                    },
                )
            })
            .collect();
        let functions = functions
            .iter()
            .enumerate()
            .map(|(i, &calls)| {
                (
                    format!("f{i}:1"),
                    FunctionCoverage {
                        name: format!("f{i}"),
                        line: 1,
                        calls,
                    },
                )
            })
            .collect();
        FileCoverage::from_parts(lines, functions, BTreeMap::new())
    }

    fn data(files: Vec<(&str, FileCoverage)>) -> CoverageData {
        CoverageData::from_files(
            files.into_iter().map(|(p, f)| (p.to_string(), f)).collect(),
            None,
        )
    }

    #[test]
    fn test_identical_percentages_have_no_outliers() {
        let d = data(vec![("a.lua", file(10, 5, &[])), ("b.lua", file(20, 10, &[])), ("c.lua", file(4, 2, &[]))]);
        let stats = analyze_coverage_statistics(&d, &ValidationConfig::default());
        assert_eq!(stats.mean, 50.0);
        assert_eq!(stats.median, 50.0);
        assert_eq!(stats.std_dev, 0.0);
        assert!(stats.outliers.is_empty());
    }

    #[test]
    fn test_two_file_scenario() {
        let d = data(vec![("a.lua", file(100, 90, &[])), ("b.lua", file(50, 5, &[]))]);
        let stats = analyze_coverage_statistics(&d, &ValidationConfig::default());
        assert!((stats.mean - 50.0).abs() < 1e-9);
        assert!((stats.std_dev - 40.0).abs() < 1e-9);
        // with two samples every z-score is exactly 1
        assert!(stats.outliers.is_empty());
        // 50 lines is below the large-file threshold
        assert!(stats.anomalies.is_empty());

        let strict = ValidationConfig {
            outlier_z_threshold: 0.5,
            ..ValidationConfig::default()
        };
        let stats = analyze_coverage_statistics(&d, &strict);
        assert_eq!(stats.outliers.len(), 2);
    }

    #[test]
    fn test_outlier_detected() {
        let mut files: Vec<(String, FileCoverage)> =
            (0..9).map(|i| (format!("f{i}.lua"), file(10, 8, &[]))).collect();
        files.push(("low.lua".to_string(), file(10, 0, &[])));
        let d = CoverageData::from_files(files.into_iter().collect(), None);
        let stats = analyze_coverage_statistics(&d, &ValidationConfig::default());
        assert!((stats.mean - 72.0).abs() < 1e-9);
        assert!((stats.std_dev - 24.0).abs() < 1e-9);
        assert_eq!(stats.median, 80.0);
        assert_eq!(stats.outliers.len(), 1);
        assert_eq!(stats.outliers[0].file, "low.lua");
        assert!((stats.outliers[0].z_score - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_large_file_low_coverage_boundary() {
        let d = data(vec![("big.lua", file(101, 10, &[])), ("edge.lua", file(100, 10, &[]))]);
        let stats = analyze_coverage_statistics(&d, &ValidationConfig::default());
        assert_eq!(stats.anomalies.len(), 1);
        assert_eq!(stats.anomalies[0].file, "big.lua");
        assert_eq!(stats.anomalies[0].kind, AnomalyKind::LargeFileLowCoverage);
    }

    #[test]
    fn test_line_function_mismatch() {
        let d = data(vec![
            ("gap.lua", file(10, 1, &[1, 1])),
            ("no_funcs.lua", file(10, 1, &[])),
        ]);
        let stats = analyze_coverage_statistics(&d, &ValidationConfig::default());
        assert_eq!(stats.anomalies.len(), 1);
        assert_eq!(stats.anomalies[0].kind, AnomalyKind::LineFunctionMismatch);
        assert_eq!(stats.anomalies[0].file, "gap.lua");
    }

    #[test]
    fn test_empty_files_are_ignored() {
        let d = data(vec![("empty.lua", file(0, 0, &[])), ("a.lua", file(4, 1, &[]))]);
        let stats = analyze_coverage_statistics(&d, &ValidationConfig::default());
        assert_eq!(stats.mean, 25.0);
        assert!(analyze_coverage_statistics(&CoverageData::default(), &ValidationConfig::default())
            .outliers
            .is_empty());
    }
}
