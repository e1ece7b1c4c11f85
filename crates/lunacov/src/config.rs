//! Run configuration
//!
//! Loaded from YAML. Every section and field is optional; a missing file
//! yields [`Config::default`].
//!
//! ```yaml
//! coverage:
//!   enabled: true
//!   use_instrumentation: true
//!   include: ["lib/**/*.lua"]
//!   exclude: ["lib/vendor/**"]
//! validation:
//!   validation_threshold: 0.5
//! reporting:
//!   formats: [summary, lcov]
//!   output_dir: coverage
//!   strict_validation: false
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::coverage::ReportFormat;
use crate::result::{CoverageError, CoverageResult};
use crate::validation::ValidationConfig;

/// Settings read by the loader at install time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageConfig {
    /// Master switch
    pub enabled: bool,
    /// Instrument modules at load time
    pub use_instrumentation: bool,
    /// Globs (relative to `root`) of modules to instrument; empty means all
    pub include: Vec<String>,
    /// Globs of modules never instrumented
    pub exclude: Vec<String>,
    /// Directory module names are resolved against
    pub root: Option<PathBuf>,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            use_instrumentation: true,
            include: Vec::new(),
            exclude: Vec::new(),
            root: None,
        }
    }
}

impl CoverageConfig {
    /// Configuration with coverage switched off
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Whether `install` would do anything
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.enabled && self.use_instrumentation
    }
}

/// Report output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    /// Formats written after a run
    pub formats: Vec<ReportFormat>,
    /// Directory reports are written to
    pub output_dir: PathBuf,
    /// Treat validation warnings as failures
    pub strict_validation: bool,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            formats: vec![ReportFormat::Summary, ReportFormat::Json],
            output_dir: PathBuf::from("coverage"),
            strict_validation: false,
        }
    }
}

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Instrumentation settings
    pub coverage: CoverageConfig,
    /// Validator settings
    pub validation: ValidationConfig,
    /// Report settings
    pub reporting: ReportingConfig,
}

impl Config {
    /// Parse YAML text
    ///
    /// # Errors
    ///
    /// Returns [`CoverageError::Config`] for malformed YAML or invalid glob
    /// patterns.
    pub fn from_yaml(yaml: &str) -> CoverageResult<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)
            .map_err(|e| CoverageError::config(format!("invalid YAML: {e}")))?;
        config.check_patterns()?;
        Ok(config)
    }

    /// Load from a file; a missing file gives the defaults
    ///
    /// # Errors
    ///
    /// Returns [`CoverageError::Read`] if the file exists but cannot be
    /// read, or [`CoverageError::Config`] if it does not parse.
    pub fn load(path: &Path) -> CoverageResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let yaml = std::fs::read_to_string(path).map_err(|source| CoverageError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    /// Serialize as YAML
    ///
    /// # Errors
    ///
    /// Returns [`CoverageError::Config`] if serialization fails.
    pub fn to_yaml(&self) -> CoverageResult<String> {
        serde_yaml_ng::to_string(self).map_err(|e| CoverageError::config(e.to_string()))
    }

    fn check_patterns(&self) -> CoverageResult<()> {
        for pattern in self.coverage.include.iter().chain(&self.coverage.exclude) {
            let _ = glob::Pattern::new(pattern)
                .map_err(|e| CoverageError::config(format!("invalid pattern '{pattern}': {e}")))?;
        }
        Ok(())
    }
}
