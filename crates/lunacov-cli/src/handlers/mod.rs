//! Command handlers
//!
//! One module per subcommand. Handlers take the parsed arguments, print
//! progress through [`crate::Reporter`] and return a [`crate::CliResult`]
//! whose error decides the exit code.

pub mod instrument;
pub mod run;
pub mod validate;

pub use instrument::{execute_instrument, format_source_map};
pub use run::{execute_run, resolve_settings, write_reports};
pub use validate::{check_report, execute_validate};
