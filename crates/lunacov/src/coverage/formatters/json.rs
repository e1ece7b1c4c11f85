//! JSON report formatter

use std::path::Path;

use crate::coverage::CoverageData;
use crate::result::CoverageResult;

/// Writes the whole [`CoverageData`] structure as JSON
#[derive(Debug)]
pub struct JsonFormatter<'a> {
    data: &'a CoverageData,
    pretty: bool,
}

impl<'a> JsonFormatter<'a> {
    /// Create a formatter producing pretty-printed JSON
    #[must_use]
    pub const fn new(data: &'a CoverageData) -> Self {
        Self { data, pretty: true }
    }

    /// Produce compact JSON instead
    #[must_use]
    pub const fn compact(mut self) -> Self {
        self.pretty = false;
        self
    }

    /// Generate the JSON text
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoverageError::Json`] if serialization fails.
    pub fn generate(&self) -> CoverageResult<String> {
        Ok(if self.pretty {
            serde_json::to_string_pretty(self.data)?
        } else {
            serde_json::to_string(self.data)?
        })
    }

    /// Save the report to a file
    ///
    /// # Errors
    ///
    /// Returns error if serialization or the write fails
    pub fn save(&self, path: &Path) -> CoverageResult<()> {
        std::fs::write(path, self.generate()?)?;
        Ok(())
    }
}
