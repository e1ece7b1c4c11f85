//! Lunacov CLI library
//!
//! Argument parsing, status output and the handlers behind the `lunacov`
//! binary.
//!
//! ## Usage
//!
//! ```bash
//! lunacov run test/*_test.lua              # run, write coverage/ reports
//! lunacov run t.lua -f lcov -f cobertura   # pick formats
//! lunacov validate coverage/coverage.json  # re-check a report
//! lunacov instrument lib/calc.lua --map    # show the rewritten source
//! ```

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod config;
mod error;
pub mod handlers;
pub mod logging;
mod output;

pub use commands::{Cli, ColorArg, Commands, FormatArg, InstrumentArgs, RunArgs, ValidateArgs};
pub use config::{CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use output::Reporter;
