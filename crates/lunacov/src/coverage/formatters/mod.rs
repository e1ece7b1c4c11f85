//! Coverage report formatters
//!
//! Every formatter reads only [`CoverageData`](super::CoverageData) and
//! keeps executed-but-unvalidated lines distinguishable from covered ones.

mod cobertura;
mod json;
mod lcov;
mod summary;

pub use cobertura::CoberturaFormatter;
pub use json::JsonFormatter;
pub use lcov::LcovFormatter;
pub use summary::SummaryFormatter;

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::CoverageData;
use crate::result::{CoverageError, CoverageResult};

/// Report output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Full `CoverageData` as JSON
    Json,
    /// LCOV tracefile
    Lcov,
    /// Cobertura XML
    Cobertura,
    /// Plain-text table
    Summary,
}

impl ReportFormat {
    /// Conventional file name for the format
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Json => "coverage.json",
            Self::Lcov => "lcov.info",
            Self::Cobertura => "cobertura.xml",
            Self::Summary => "coverage.txt",
        }
    }

    /// Render `data` in this format
    ///
    /// # Errors
    ///
    /// Returns [`CoverageError::Json`] if JSON serialization fails.
    pub fn render(self, data: &CoverageData) -> CoverageResult<String> {
        Ok(match self {
            Self::Json => JsonFormatter::new(data).generate()?,
            Self::Lcov => LcovFormatter::new(data).generate(),
            Self::Cobertura => CoberturaFormatter::new(data).generate(),
            Self::Summary => SummaryFormatter::new(data).generate(),
        })
    }
}

impl FromStr for ReportFormat {
    type Err = CoverageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "lcov" => Ok(Self::Lcov),
            "cobertura" | "xml" => Ok(Self::Cobertura),
            "summary" | "text" => Ok(Self::Summary),
            other => Err(CoverageError::config(format!("unknown report format '{other}'"))),
        }
    }
}
