//! Lunacov: instrumentation-based coverage for Lua
//!
//! Modules are rewritten as they are `require`d so that every executable
//! line, function entry and block entry reports to a [`CoverageStore`].
//! Lines that also pass through an assertion are recorded as *covered*,
//! which is what the percentages count; lines that merely ran are kept
//! separately and shown as such by every report format.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        LUNACOV Pipeline                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  require(name)                                                   │
//! │      │                                                           │
//! │      ▼                                                           │
//! │  ┌────────┐   ┌───────────┐   ┌─────────┐   ┌────────────┐       │
//! │  │ Loader │──►│ lua::parse│──►│transform│──►│ generate + │       │
//! │  │ chain  │   └───────────┘   └─────────┘   │ source map │       │
//! │  └────────┘◄──────────── cache ─────────────┴────────────┘       │
//! │      │                                                           │
//! │      ▼ run                                                       │
//! │  ┌───────────────┐   ┌──────────────┐   ┌─────────────────────┐  │
//! │  │ CoverageStore │──►│ CoverageData │──►│ validation / report │  │
//! │  └───────────────┘   └──────────────┘   └─────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use lunacov::{CoverageRuntime, ValidationConfig, ValidationReport};
//! use lunacov::config::CoverageConfig;
//!
//! let runtime = CoverageRuntime::new("project")?;
//! runtime.install(&CoverageConfig::default());
//! runtime.run_script(std::path::Path::new("project/test/calc_test.lua"))?;
//!
//! let data = runtime.get_data();
//! let report = ValidationReport::build(&data, &ValidationConfig::default());
//! println!("{}", report.to_json()?);
//! # Ok::<(), lunacov::CoverageError>(())
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

/// Run configuration loaded from YAML
pub mod config;

/// Coverage store, data contract and report formatters
pub mod coverage;

/// Parse, probe insertion, code generation, source maps and caching
pub mod instrument;

/// Module resolver chain
pub mod loader;

/// Lua tokenizer, syntax tree and parser
pub mod lua;

mod result;
mod runtime;

/// Consistency checks, statistics and static cross-check
pub mod validation;

pub use config::{Config, CoverageConfig, ReportingConfig};
pub use coverage::{CoverageData, CoverageStore, CoverageSummary, FileCoverage, ReportFormat};
pub use instrument::{instrument_source, Instrumented, SourceMap};
pub use loader::{Loader, ModuleResolver};
pub use result::{find_cause, CoverageError, CoverageResult};
pub use runtime::CoverageRuntime;
pub use validation::{ValidationConfig, ValidationIssue, ValidationReport};
