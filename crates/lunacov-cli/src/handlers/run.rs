//! Run command handler

use std::path::{Path, PathBuf};
use std::time::Instant;

use lunacov::{Config, CoverageData, CoverageRuntime, ReportFormat, ValidationReport};

use super::validate::check_report;
use crate::commands::RunArgs;
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::Reporter;

/// File the validation report is written to, next to the coverage reports
pub const VALIDATION_REPORT: &str = "validation.json";

/// Execute the run command
///
/// Every script runs in the same interpreter, so modules loaded by one
/// script stay loaded for the next. Reports are written even when a script
/// fails.
pub fn execute_run(config: &CliConfig, args: &RunArgs) -> CliResult<()> {
    let reporter = Reporter::new(config.color.should_color(), config.verbosity.is_quiet());
    let settings = resolve_settings(args)?;
    let root = settings
        .coverage
        .root
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));

    let runtime = CoverageRuntime::new(root)?;
    if runtime.install(&settings.coverage) {
        reporter.info(&format!(
            "Instrumenting modules under {}",
            runtime.root().display()
        ));
    } else {
        reporter.warning("Coverage disabled; modules load without instrumentation");
    }

    let start = Instant::now();
    let mut failed = 0;
    for script in &args.scripts {
        match runtime.run_script(script) {
            Ok(()) => reporter.success(&script.display().to_string()),
            Err(e) => {
                failed += 1;
                reporter.failure(&format!("{}: {e}", script.display()));
            }
        }
    }
    reporter.summary(args.scripts.len() - failed, failed, start.elapsed());

    let data = runtime.get_data();
    let output_dir = &settings.reporting.output_dir;
    let written = write_reports(&data, &settings.reporting.formats, output_dir)?;
    for path in &written {
        reporter.info(&format!("Wrote {}", path.display()));
    }
    if settings.reporting.formats.contains(&ReportFormat::Summary) && !config.verbosity.is_quiet() {
        print!("{}", ReportFormat::Summary.render(&data)?);
    }

    let report = ValidationReport::build(&data, &settings.validation);
    let report_path = output_dir.join(VALIDATION_REPORT);
    report.save(&report_path)?;
    reporter.info(&format!("Wrote {}", report_path.display()));

    if failed > 0 {
        return Err(CliError::script_execution(format!(
            "{failed} of {} scripts failed",
            args.scripts.len()
        )));
    }
    check_report(&report, settings.reporting.strict_validation, &reporter)
}

/// Configuration file merged with command-line overrides
pub fn resolve_settings(args: &RunArgs) -> CliResult<Config> {
    let mut settings = Config::load(&args.config)?;
    if let Some(root) = &args.root {
        settings.coverage.root = Some(root.clone());
    }
    if !args.formats.is_empty() {
        settings.reporting.formats = args.formats.iter().map(|&f| f.into()).collect();
    }
    if let Some(dir) = &args.output_dir {
        settings.reporting.output_dir.clone_from(dir);
    }
    if args.no_instrument {
        settings.coverage.use_instrumentation = false;
    }
    if args.strict {
        settings.reporting.strict_validation = true;
    }
    Ok(settings)
}

/// Render every format into `dir`, creating it if needed
///
/// Returns the paths written, in format order.
pub fn write_reports(data: &CoverageData, formats: &[ReportFormat], dir: &Path) -> CliResult<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(formats.len());
    for &format in formats {
        let path = dir.join(format.file_name());
        std::fs::write(&path, format.render(data)?)?;
        tracing::debug!(path = %path.display(), ?format, "report written");
        written.push(path);
    }
    Ok(written)
}
