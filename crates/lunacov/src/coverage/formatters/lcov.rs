//! LCOV Report Formatter
//!
//! Generates LCOV tracefiles for CI integration.
//!
//! ## LCOV Format
//!
//! ```text
//! TN:<test name>
//! SF:<source file>
//! FN:<line>,<function name>
//! FNDA:<execution count>,<function name>
//! FNF:<functions found>
//! FNH:<functions hit>
//! # executed-not-covered:<line>,<line>,...
//! DA:<line>,<count>
//! LF:<lines found>
//! LH:<lines hit>
//! end_of_record
//! ```
//!
//! `DA` counts are only non-zero for covered lines. Lines that ran without
//! an assertion are reported with 0 and listed in the comment line, which
//! LCOV consumers ignore.

use std::fmt::Write;
use std::path::Path;

use crate::coverage::CoverageData;
use crate::result::CoverageResult;

/// LCOV format report generator
#[derive(Debug)]
pub struct LcovFormatter<'a> {
    data: &'a CoverageData,
    test_name: Option<String>,
}

impl<'a> LcovFormatter<'a> {
    /// Create a new LCOV formatter from coverage data
    #[must_use]
    pub const fn new(data: &'a CoverageData) -> Self {
        Self {
            data,
            test_name: None,
        }
    }

    /// Set the test name for the report
    #[must_use]
    pub fn with_test_name(mut self, name: impl Into<String>) -> Self {
        self.test_name = Some(name.into());
        self
    }

    /// Generate LCOV format report as a string
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();

        if let Some(ref name) = self.test_name {
            let _ = writeln!(output, "TN:{name}");
        } else {
            output.push_str("TN:\n");
        }

        let Some(files) = &self.data.files else {
            return output;
        };

        for (path, file) in files {
            let _ = writeln!(output, "SF:{path}");

            for (key, func) in &file.functions {
                let _ = writeln!(output, "FN:{},{key}", func.line);
            }
            for (key, func) in &file.functions {
                let _ = writeln!(output, "FNDA:{},{key}", func.calls);
            }
            let _ = writeln!(output, "FNF:{}", file.total_functions);
            let _ = writeln!(output, "FNH:{}", file.covered_functions);

            let unvalidated = file.executed_not_covered();
            if !unvalidated.is_empty() {
                let list: Vec<String> = unvalidated.iter().map(u32::to_string).collect();
                let _ = writeln!(output, "# executed-not-covered:{}", list.join(","));
            }

            for (line, state) in &file.lines {
                let count = if state.covered { state.hits.max(1) } else { 0 };
                let _ = writeln!(output, "DA:{line},{count}");
            }
            let _ = writeln!(output, "LF:{}", file.total_lines);
            let _ = writeln!(output, "LH:{}", file.covered_lines);

            output.push_str("end_of_record\n");
        }

        output
    }

    /// Save the LCOV report to a file
    ///
    /// # Errors
    ///
    /// Returns error if file write fails
    pub fn save(&self, path: &Path) -> CoverageResult<()> {
        std::fs::write(path, self.generate())?;
        Ok(())
    }
}
