//! Lunacov CLI: coverage for Lua
//!
//! ## Usage
//!
//! ```bash
//! lunacov run test/calc_test.lua
//! lunacov validate coverage/coverage.json --strict
//! lunacov instrument lib/calc.lua --map
//! ```

use clap::Parser;
use lunacov_cli::{handlers, logging, Cli, CliConfig, CliResult, ColorChoice, Commands, Verbosity};
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let config = build_config(&cli);
    logging::init(config.verbosity);

    match cli.command {
        Commands::Run(args) => handlers::execute_run(&config, &args),
        Commands::Validate(args) => handlers::execute_validate(&config, &args),
        Commands::Instrument(args) => handlers::execute_instrument(&config, &args),
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let color: ColorChoice = cli.color.into();
    console::set_colors_enabled(color.should_color());
    console::set_colors_enabled_stderr(color.should_color());
    CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.quiet, cli.verbose))
        .with_color(color)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_build_config() {
        let cli = Cli::parse_from(["lunacov", "-q", "--color", "never", "instrument", "m.lua"]);
        let config = build_config(&cli);
        assert_eq!(config.verbosity, Verbosity::Quiet);
        assert_eq!(config.color, ColorChoice::Never);

        let cli = Cli::parse_from(["lunacov", "-v", "validate", "c.json"]);
        assert_eq!(build_config(&cli).verbosity, Verbosity::Verbose);
    }
}
