//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use lunacov::ReportFormat;
use std::path::PathBuf;

/// Lunacov: instrumentation-based coverage for Lua
#[derive(Parser, Debug)]
#[command(name = "lunacov")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run Lua scripts with instrumented `require` and write reports
    Run(RunArgs),

    /// Validate a coverage.json file
    Validate(ValidateArgs),

    /// Print the instrumented form of a Lua file
    Instrument(InstrumentArgs),
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Scripts to run, in order, in one interpreter
    #[arg(required = true)]
    pub scripts: Vec<PathBuf>,

    /// Configuration file (missing file means defaults)
    #[arg(short, long, default_value = "lunacov.yml")]
    pub config: PathBuf,

    /// Directory module names are resolved against
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Report formats to write (repeatable); overrides the config file
    #[arg(short, long = "format", value_enum)]
    pub formats: Vec<FormatArg>,

    /// Directory reports are written to
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Load modules without instrumentation
    #[arg(long)]
    pub no_instrument: bool,

    /// Fail on validation warnings too
    #[arg(long)]
    pub strict: bool,
}

/// Arguments for the validate command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// coverage.json to check
    pub input: PathBuf,

    /// Allowed percentage difference, in points
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Write the report here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Fail on validation warnings too
    #[arg(long)]
    pub strict: bool,
}

/// Arguments for the instrument command
#[derive(Parser, Debug)]
pub struct InstrumentArgs {
    /// Lua file to instrument
    pub file: PathBuf,

    /// Also print the line mapping back to the original
    #[arg(long)]
    pub map: bool,
}

/// Report format argument
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatArg {
    /// coverage.json
    Json,
    /// lcov.info
    Lcov,
    /// cobertura.xml
    Cobertura,
    /// Plain-text table
    Summary,
}

impl From<FormatArg> for ReportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Json => Self::Json,
            FormatArg::Lcov => Self::Lcov,
            FormatArg::Cobertura => Self::Cobertura,
            FormatArg::Summary => Self::Summary,
        }
    }
}

/// Color argument
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_defaults() {
        let cli = Cli::parse_from(["lunacov", "run", "test/calc_test.lua"]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.scripts, vec![PathBuf::from("test/calc_test.lua")]);
        assert_eq!(args.config, PathBuf::from("lunacov.yml"));
        assert!(args.formats.is_empty());
        assert!(args.root.is_none());
        assert!(!args.no_instrument);
        assert!(!args.strict);
    }

    #[test]
    fn test_parse_run_options() {
        let cli = Cli::parse_from([
            "lunacov", "run", "a.lua", "b.lua", "--format", "lcov", "-f", "cobertura", "--root",
            "src", "-o", "out", "--no-instrument", "--strict",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.scripts.len(), 2);
        assert_eq!(args.formats, vec![FormatArg::Lcov, FormatArg::Cobertura]);
        assert_eq!(args.root, Some(PathBuf::from("src")));
        assert_eq!(args.output_dir, Some(PathBuf::from("out")));
        assert!(args.no_instrument);
        assert!(args.strict);
    }

    #[test]
    fn test_run_requires_a_script() {
        assert!(Cli::try_parse_from(["lunacov", "run"]).is_err());
    }

    #[test]
    fn test_parse_validate_and_instrument() {
        let cli = Cli::parse_from(["lunacov", "-vv", "validate", "c.json", "--threshold", "1.5"]);
        assert_eq!(cli.verbose, 2);
        let Commands::Validate(args) = cli.command else {
            panic!("expected validate");
        };
        assert_eq!(args.threshold, Some(1.5));

        let cli = Cli::parse_from(["lunacov", "instrument", "m.lua", "--map", "--color", "never"]);
        assert_eq!(cli.color, ColorArg::Never);
        assert!(matches!(cli.command, Commands::Instrument(InstrumentArgs { map: true, .. })));
    }

    #[test]
    fn test_format_conversion() {
        assert_eq!(ReportFormat::from(FormatArg::Json), ReportFormat::Json);
        assert_eq!(ReportFormat::from(FormatArg::Summary), ReportFormat::Summary);
    }
}
