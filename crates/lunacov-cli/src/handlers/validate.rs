//! Validate command handler

use lunacov::validation::Severity;
use lunacov::{CoverageData, ValidationConfig, ValidationReport};

use crate::commands::ValidateArgs;
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::Reporter;

/// Execute the validate command
///
/// The report goes to `--output` or stdout; the exit code follows
/// [`check_report`].
pub fn execute_validate(config: &CliConfig, args: &ValidateArgs) -> CliResult<()> {
    let reporter = Reporter::new(config.color.should_color(), config.verbosity.is_quiet());
    let mut settings = ValidationConfig::default();
    if let Some(threshold) = args.threshold {
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(CliError::config(format!(
                "threshold must be a non-negative number, got {threshold}"
            )));
        }
        settings.validation_threshold = threshold;
    }

    let data = CoverageData::load(&args.input)?;
    let report = ValidationReport::build(&data, &settings);
    match &args.output {
        Some(path) => {
            report.save(path)?;
            reporter.info(&format!("Wrote {}", path.display()));
        }
        None => println!("{}", report.to_json()?),
    }
    check_report(&report, args.strict, &reporter)
}

/// Print every issue and turn the report into a pass or fail
///
/// Errors always fail; warnings fail only when `strict`.
pub fn check_report(report: &ValidationReport, strict: bool, reporter: &Reporter) -> CliResult<()> {
    for issue in &report.validation.issues {
        let line = format!("[{}] {}", issue.category, issue.message);
        match issue.severity {
            Severity::Error => reporter.failure(&line),
            Severity::Warning => reporter.warning(&line),
        }
    }
    if !report.cross_check.discrepancies.is_empty() {
        reporter.warning(&format!(
            "Static analysis disagrees with coverage data in {} file(s)",
            report.cross_check.discrepancies.len()
        ));
    }

    if report.passes(strict) {
        reporter.success("Coverage data is consistent");
        Ok(())
    } else {
        Err(CliError::validation(format!(
            "{} error(s), {} warning(s)",
            report.error_count(),
            report.warning_count()
        )))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::{ColorChoice, Verbosity};
    use std::path::Path;

    fn quiet() -> CliConfig {
        CliConfig::new()
            .with_verbosity(Verbosity::Quiet)
            .with_color(ColorChoice::Never)
    }

    fn args(input: &Path, output: &Path) -> ValidateArgs {
        ValidateArgs {
            input: input.to_path_buf(),
            threshold: None,
            output: Some(output.to_path_buf()),
            strict: false,
        }
    }

    #[test]
    fn test_empty_object_fails() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("coverage.json");
        std::fs::write(&input, "{}").unwrap();
        let out = dir.path().join("report.json");
        let err = execute_validate(&quiet(), &args(&input, &out)).unwrap_err();
        assert!(matches!(err, CliError::Validation { .. }));

        let report: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out).unwrap()).unwrap();
        assert_eq!(report["validation"]["is_valid"], false);
        assert_eq!(report["validation"]["issues"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_consistent_data_passes() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("coverage.json");
        let data = CoverageData::from_files(Default::default(), None);
        std::fs::write(&input, data.to_json().unwrap()).unwrap();
        execute_validate(&quiet(), &args(&input, &dir.path().join("r.json"))).unwrap();
    }

    #[test]
    fn test_warnings_fail_only_when_strict() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("coverage.json");
        let mut data = CoverageData::from_files(Default::default(), None);
        data.summary.as_mut().unwrap().total_lines = 7;
        std::fs::write(&input, data.to_json().unwrap()).unwrap();

        let mut a = args(&input, &dir.path().join("r.json"));
        execute_validate(&quiet(), &a).unwrap();
        a.strict = true;
        assert!(execute_validate(&quiet(), &a).is_err());
    }

    #[test]
    fn test_rejects_negative_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = args(&dir.path().join("missing.json"), &dir.path().join("r.json"));
        a.threshold = Some(-1.0);
        assert!(matches!(
            execute_validate(&quiet(), &a).unwrap_err(),
            CliError::Config { .. }
        ));
    }

    #[test]
    fn test_missing_input_is_library_error() {
        let dir = tempfile::tempdir().unwrap();
        let a = args(&dir.path().join("missing.json"), &dir.path().join("r.json"));
        assert!(matches!(
            execute_validate(&quiet(), &a).unwrap_err(),
            CliError::Lunacov(_)
        ));
    }
}
