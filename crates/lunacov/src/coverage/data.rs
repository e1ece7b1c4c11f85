//! Coverage data contract
//!
//! [`CoverageData`] is what every renderer and the validator consume. It
//! is plain serde data so a report written by one run can be validated by
//! another process.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::instrument::BlockKind;
use crate::result::{CoverageError, CoverageResult};

/// Line state within one file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineCoverage {
    /// The interpreter ran the line
    pub executed: bool,
    /// A passing assertion referenced the line
    pub covered: bool,
    /// Times the line probe fired
    pub hits: u64,
}

/// Function state within one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCoverage {
    /// Inferred function name
    pub name: String,
    /// Line of the `function` keyword
    pub line: u32,
    /// Times the function was entered
    pub calls: u64,
}

/// Block state within one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockCoverage {
    /// Kind of block
    pub kind: BlockKind,
    /// Line the block starts on
    pub line: u32,
    /// Times the block was entered
    pub hits: u64,
}

/// Coverage of one file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileCoverage {
    /// Executable lines
    pub total_lines: usize,
    /// Executable lines that ran
    pub executed_lines: usize,
    /// Executable lines validated by an assertion
    pub covered_lines: usize,
    /// `covered_lines / total_lines * 100`
    pub line_coverage_percent: f64,
    /// Functions defined in the file
    pub total_functions: usize,
    /// Functions entered at least once
    pub covered_functions: usize,
    /// `covered_functions / total_functions * 100`
    pub function_coverage_percent: f64,
    /// Blocks in the file
    pub total_blocks: usize,
    /// Blocks entered at least once
    pub covered_blocks: usize,
    /// `covered_blocks / total_blocks * 100`
    pub block_coverage_percent: f64,
    /// Per executable line
    #[serde(default)]
    pub lines: BTreeMap<u32, LineCoverage>,
    /// Per function, keyed `name:line`
    #[serde(default)]
    pub functions: BTreeMap<String, FunctionCoverage>,
    /// Per block, keyed by block index
    #[serde(default)]
    pub blocks: BTreeMap<u32, BlockCoverage>,
}

impl FileCoverage {
    /// Build a record whose counts and percentages agree with its maps
    #[must_use]
    pub fn from_parts(
        lines: BTreeMap<u32, LineCoverage>,
        functions: BTreeMap<String, FunctionCoverage>,
        blocks: BTreeMap<u32, BlockCoverage>,
    ) -> Self {
        let total_lines = lines.len();
        let executed_lines = lines.values().filter(|l| l.executed).count();
        let covered_lines = lines.values().filter(|l| l.covered).count();
        let total_functions = functions.len();
        let covered_functions = functions.values().filter(|f| f.calls > 0).count();
        let total_blocks = blocks.len();
        let covered_blocks = blocks.values().filter(|b| b.hits > 0).count();
        Self {
            total_lines,
            executed_lines,
            covered_lines,
            line_coverage_percent: percent(covered_lines, total_lines),
            total_functions,
            covered_functions,
            function_coverage_percent: percent(covered_functions, total_functions),
            total_blocks,
            covered_blocks,
            block_coverage_percent: percent(covered_blocks, total_blocks),
            lines,
            functions,
            blocks,
        }
    }

    /// Lines that ran without any assertion referencing them
    #[must_use]
    pub fn executed_not_covered(&self) -> Vec<u32> {
        self.lines
            .iter()
            .filter(|(_, l)| l.executed && !l.covered)
            .map(|(&n, _)| n)
            .collect()
    }
}

/// Aggregate over all files
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageSummary {
    /// Files tracked
    pub total_files: usize,
    /// Files with at least one covered line
    pub covered_files: usize,
    /// Executable lines across files
    pub total_lines: usize,
    /// Executed lines across files
    pub executed_lines: usize,
    /// Covered lines across files
    pub covered_lines: usize,
    /// `covered_lines / total_lines * 100`
    pub line_coverage_percent: f64,
    /// Functions across files
    pub total_functions: usize,
    /// Functions entered
    pub covered_functions: usize,
    /// `covered_functions / total_functions * 100`
    pub function_coverage_percent: f64,
    /// Blocks across files
    pub total_blocks: usize,
    /// Blocks entered
    pub covered_blocks: usize,
    /// `covered_blocks / total_blocks * 100`
    pub block_coverage_percent: f64,
    /// Weighted blend, see [`overall_percent`]
    pub overall_percent: f64,
}

impl CoverageSummary {
    /// Sum the per-file records
    #[must_use]
    pub fn from_files(files: &BTreeMap<String, FileCoverage>) -> Self {
        let mut s = Self {
            total_files: files.len(),
            ..Self::default()
        };
        for file in files.values() {
            if file.covered_lines > 0 {
                s.covered_files += 1;
            }
            s.total_lines += file.total_lines;
            s.executed_lines += file.executed_lines;
            s.covered_lines += file.covered_lines;
            s.total_functions += file.total_functions;
            s.covered_functions += file.covered_functions;
            s.total_blocks += file.total_blocks;
            s.covered_blocks += file.covered_blocks;
        }
        s.line_coverage_percent = percent(s.covered_lines, s.total_lines);
        s.function_coverage_percent = percent(s.covered_functions, s.total_functions);
        s.block_coverage_percent = percent(s.covered_blocks, s.total_blocks);
        s.overall_percent = overall_percent(
            s.line_coverage_percent,
            s.function_coverage_percent,
            s.block_coverage_percent,
            s.total_blocks > 0,
        );
        s
    }
}

/// Raw per-file facts recorded at instrumentation time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginalFile {
    /// Unmodified source text
    pub source: String,
    /// Executable lines found by the instrumenter
    pub executable_lines: Vec<u32>,
    /// Function keys found by the instrumenter
    pub functions: Vec<String>,
    /// Lines in the source
    pub lines: usize,
}

/// Complete coverage result of a run
///
/// `files` and `summary` are optional only so that incomplete data read
/// from disk can be reported by the validator instead of failing to load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageData {
    /// Per-file coverage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<BTreeMap<String, FileCoverage>>,
    /// Aggregate summary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<CoverageSummary>,
    /// Source and static facts per file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_files: Option<BTreeMap<String, OriginalFile>>,
}

impl CoverageData {
    /// Assemble data and compute its summary from `files`
    #[must_use]
    pub fn from_files(
        files: BTreeMap<String, FileCoverage>,
        original_files: Option<BTreeMap<String, OriginalFile>>,
    ) -> Self {
        let summary = CoverageSummary::from_files(&files);
        Self {
            files: Some(files),
            summary: Some(summary),
            original_files,
        }
    }

    /// Parse from JSON
    ///
    /// # Errors
    ///
    /// Returns [`CoverageError::Json`] for malformed input.
    pub fn from_json(json: &str) -> CoverageResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize as pretty JSON
    ///
    /// # Errors
    ///
    /// Returns [`CoverageError::Json`] if serialization fails.
    pub fn to_json(&self) -> CoverageResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read a JSON file
    ///
    /// # Errors
    ///
    /// Returns [`CoverageError::Read`] or [`CoverageError::Json`].
    pub fn load(path: &Path) -> CoverageResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|source| CoverageError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }
}

/// `covered / total * 100`, 0 when there is nothing to cover
#[must_use]
pub fn percent(covered: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        covered as f64 / total as f64 * 100.0
    }
}

/// Blend of line, function and block percentages
///
/// 40/20/40 when block data exists, otherwise 80/20 line/function.
#[must_use]
pub fn overall_percent(line: f64, function: f64, block: f64, has_blocks: bool) -> f64 {
    if has_blocks {
        line * 0.4 + function * 0.2 + block * 0.4
    } else {
        line * 0.8 + function * 0.2
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn lines(total: u32, executed: u32, covered: u32) -> BTreeMap<u32, LineCoverage> {
        (1..=total)
            .map(|n| {
                (
                    n,
                    LineCoverage {
                        executed: n <= executed,
                        covered: n <= covered,
                        hits: u64::from(n <= executed),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_percent_of_zero_total_is_zero() {
        assert_eq!(percent(0, 0), 0.0);
        let file = FileCoverage::from_parts(BTreeMap::new(), BTreeMap::new(), BTreeMap::new());
        assert_eq!(file.line_coverage_percent, 0.0);
        assert!(file.line_coverage_percent.is_finite());
    }

    #[test]
    fn test_line_percent_uses_covered_not_executed() {
        let file = FileCoverage::from_parts(lines(10, 6, 3), BTreeMap::new(), BTreeMap::new());
        assert_eq!(file.total_lines, 10);
        assert_eq!(file.executed_lines, 6);
        assert_eq!(file.covered_lines, 3);
        assert!((file.line_coverage_percent - 30.0).abs() < f64::EPSILON);
        assert_eq!(file.executed_not_covered(), vec![4, 5, 6]);
    }

    #[test]
    fn test_overall_weighting_switches_on_blocks() {
        assert!((overall_percent(50.0, 100.0, 0.0, false) - 60.0).abs() < 1e-9);
        assert!((overall_percent(50.0, 100.0, 25.0, true) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_summary_sums_files() {
        let mut files = BTreeMap::new();
        let _ = files.insert(
            "a.lua".to_string(),
            FileCoverage::from_parts(lines(100, 95, 90), BTreeMap::new(), BTreeMap::new()),
        );
        let _ = files.insert(
            "b.lua".to_string(),
            FileCoverage::from_parts(lines(50, 5, 5), BTreeMap::new(), BTreeMap::new()),
        );
        let data = CoverageData::from_files(files, None);
        let s = data.summary.unwrap();
        assert_eq!(s.total_files, 2);
        assert_eq!(s.covered_files, 2);
        assert_eq!(s.total_lines, 150);
        assert_eq!(s.covered_lines, 95);
        assert!((s.overall_percent - s.line_coverage_percent * 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_json_round_trip_keeps_line_keys() {
        let file = FileCoverage::from_parts(lines(4, 2, 1), BTreeMap::new(), BTreeMap::new());
        let data = CoverageData::from_files(BTreeMap::from([("m.lua".to_string(), file)]), None);
        let json = data.to_json().unwrap();
        assert!(json.contains("\"1\""));
        assert!(!json.contains("original_files"));
        let back = CoverageData::from_json(&json).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_missing_sections_deserialize_as_none() {
        let data = CoverageData::from_json("{}").unwrap();
        assert!(data.files.is_none());
        assert!(data.summary.is_none());
    }
}
