//! Coverage collection and reporting
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │  probes (__lunacov_l/f/b) ─┐                                  │
//! │                            ├─► CoverageStore ─► CoverageData  │
//! │  assert bridge ────────────┘        │                │        │
//! │  (mark_line_covered)                │                ▼        │
//! │                                     │      formatters / validator
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! A line is *executed* when its probe fired and *covered* when a passing
//! assertion referenced it. Line coverage percentages count covered lines.

mod block;
mod data;
pub mod formatters;
mod store;

pub use block::{BlockId, FileId, FunctionId};
pub use data::{
    overall_percent, percent, BlockCoverage, CoverageData, CoverageSummary, FileCoverage,
    FunctionCoverage, LineCoverage, OriginalFile,
};
pub use formatters::{
    CoberturaFormatter, JsonFormatter, LcovFormatter, ReportFormat, SummaryFormatter,
};
pub use store::CoverageStore;
