//! Smoke tests for the lunacov CLI
//!
//! Each test drives the real binary against a throwaway project.

#![allow(deprecated)] // Allow deprecated Command::cargo_bin until assert_cmd is updated
#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Get a command for the lunacov binary
fn lunacov() -> Command {
    Command::cargo_bin("lunacov").expect("lunacov binary should exist")
}

const CALC: &str = "\
local M = {}

function M.add(a, b)
  return a + b
end

function M.sub(a, b)
  return a - b
end

return M
";

const CALC_TEST: &str = "\
local calc = require('lib.calc')
assert(calc.add(2, 3) == 5)
";

/// A project with `lib/calc.lua` and `test/calc_test.lua`
fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("lib")).unwrap();
    fs::create_dir_all(dir.path().join("test")).unwrap();
    fs::write(dir.path().join("lib/calc.lua"), CALC).unwrap();
    fs::write(dir.path().join("test/calc_test.lua"), CALC_TEST).unwrap();
    dir
}

// ============================================================================
// Basic CLI Tests
// ============================================================================

#[test]
fn test_version_flag() {
    lunacov()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.4.0"));
}

#[test]
fn test_help_flag() {
    lunacov()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Lua"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("instrument"));
}

#[test]
fn test_no_args_fails() {
    lunacov().assert().failure();
}

#[test]
fn test_run_subcommand_help() {
    lunacov()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--no-instrument"))
        .stdout(predicate::str::contains("--format"));
}

// ============================================================================
// Run
// ============================================================================

#[test]
fn test_run_writes_reports() {
    let dir = project();
    lunacov()
        .current_dir(dir.path())
        .args(["--color", "never", "run", "test/calc_test.lua", "-f", "json", "-f", "lcov", "-f", "summary"])
        .assert()
        .success()
        .stdout(predicate::str::contains("lib/calc.lua"))
        .stdout(predicate::str::contains("Overall:"))
        .stderr(predicate::str::contains("PASS"));

    let out = dir.path().join("coverage");
    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join("coverage.json")).unwrap()).unwrap();
    let calc = &json["files"]["lib/calc.lua"];
    // the assertion sits in the test script, so module lines run but stay unvalidated
    assert_eq!(calc["lines"]["4"]["executed"], true);
    assert_eq!(calc["lines"]["4"]["covered"], false);
    assert_eq!(calc["lines"]["8"]["executed"], false);
    assert_eq!(calc["functions"]["M.add:3"]["calls"], 1);
    assert_eq!(calc["functions"]["M.sub:7"]["calls"], 0);

    let lcov = fs::read_to_string(out.join("lcov.info")).unwrap();
    assert!(lcov.contains("SF:lib/calc.lua"));
    assert!(lcov.contains("end_of_record"));

    let validation: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join("validation.json")).unwrap()).unwrap();
    assert_eq!(validation["validation"]["is_valid"], true);
}

#[test]
fn test_run_reads_config_file() {
    let dir = project();
    fs::write(
        dir.path().join("lunacov.yml"),
        "reporting:\n  formats: [cobertura]\n  output_dir: reports\n",
    )
    .unwrap();
    lunacov()
        .current_dir(dir.path())
        .args(["-q", "run", "test/calc_test.lua"])
        .assert()
        .success();
    assert!(dir.path().join("reports/cobertura.xml").is_file());
    assert!(!dir.path().join("coverage").exists());
}

#[test]
fn test_run_without_instrumentation() {
    let dir = project();
    lunacov()
        .current_dir(dir.path())
        .args(["run", "test/calc_test.lua", "--no-instrument", "-f", "json"])
        .assert()
        .success();
    let json: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(dir.path().join("coverage/coverage.json")).unwrap(),
    )
    .unwrap();
    assert!(json["files"].as_object().unwrap().is_empty());
}

#[test]
fn test_run_failing_script() {
    let dir = project();
    fs::write(
        dir.path().join("test/broken_test.lua"),
        "local calc = require('lib.calc')\nassert(calc.add(1, 1) == 3, 'bad sum')\n",
    )
    .unwrap();
    lunacov()
        .current_dir(dir.path())
        .args(["--color", "never", "run", "test/broken_test.lua", "-f", "json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("FAIL"))
        .stderr(predicate::str::contains("bad sum"));
    assert!(dir.path().join("coverage/coverage.json").is_file());
}

#[test]
fn test_run_missing_module() {
    let dir = project();
    fs::write(dir.path().join("test/missing_test.lua"), "require('nope')\n").unwrap();
    lunacov()
        .current_dir(dir.path())
        .args(["run", "test/missing_test.lua"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope"));
}

#[test]
fn test_run_invalid_config() {
    let dir = project();
    fs::write(dir.path().join("lunacov.yml"), "coverage:\n  include: ['a/[']\n").unwrap();
    lunacov()
        .current_dir(dir.path())
        .args(["run", "test/calc_test.lua"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration error"));
}

// ============================================================================
// Validate
// ============================================================================

#[test]
fn test_validate_generated_report() {
    let dir = project();
    lunacov()
        .current_dir(dir.path())
        .args(["-q", "run", "test/calc_test.lua", "-f", "json"])
        .assert()
        .success();
    lunacov()
        .current_dir(dir.path())
        .args(["validate", "coverage/coverage.json", "--strict"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"is_valid\": true"))
        .stdout(predicate::str::contains("\"analysis_success\": true"));
}

#[test]
fn test_validate_incomplete_data() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("coverage.json"), "{}").unwrap();
    lunacov()
        .current_dir(dir.path())
        .args(["validate", "coverage.json"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("missing_summary"))
        .stderr(predicate::str::contains("Validation failed"));
}

#[test]
fn test_validate_malformed_json() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("coverage.json"), "not json").unwrap();
    lunacov()
        .current_dir(dir.path())
        .args(["validate", "coverage.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("JSON"));
}

// ============================================================================
// Instrument
// ============================================================================

#[test]
fn test_instrument_prints_source() {
    let dir = project();
    lunacov()
        .current_dir(dir.path())
        .args(["instrument", "lib/calc.lua"])
        .assert()
        .success()
        .stdout(predicate::str::contains("__lunacov.bind(\"lib/calc.lua\")"))
        .stdout(predicate::str::contains("return a + b"))
        .stdout(predicate::str::contains("source map").not());
}

#[test]
fn test_instrument_with_map() {
    let dir = project();
    lunacov()
        .current_dir(dir.path())
        .args(["instrument", "lib/calc.lua", "--map"])
        .assert()
        .success()
        .stdout(predicate::str::contains("-- source map for lib/calc.lua"))
        .stdout(predicate::str::contains("-> 4"));
}

#[test]
fn test_instrument_parse_error() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("bad.lua"), "local = 1\n").unwrap();
    lunacov()
        .current_dir(dir.path())
        .args(["instrument", "bad.lua"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("parse error in bad.lua:1"));
}
