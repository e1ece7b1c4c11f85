//! Instrument command handler

use std::fmt::Write as _;

use lunacov::loader::path_key;
use lunacov::{instrument_source, CoverageError, SourceMap};

use crate::commands::InstrumentArgs;
use crate::config::CliConfig;
use crate::error::CliResult;

/// Execute the instrument command: print the rewritten source to stdout
pub fn execute_instrument(_config: &CliConfig, args: &InstrumentArgs) -> CliResult<()> {
    let source = std::fs::read_to_string(&args.file).map_err(|source| CoverageError::Read {
        path: args.file.clone(),
        source,
    })?;
    let instrumented = instrument_source(&path_key(&args.file), &source)?;
    print!("{}", instrumented.source);
    if !instrumented.source.ends_with('\n') {
        println!();
    }
    if args.map {
        print!("{}", format_source_map(&instrumented.source_map));
    }
    Ok(())
}

/// Source map as a Lua comment block, one `instrumented -> original` pair
/// per line; `-` marks inserted scaffolding
#[must_use]
pub fn format_source_map(map: &SourceMap) -> String {
    let mut out = format!("-- source map for {} ({} lines)\n", map.path(), map.len());
    for (instrumented, original) in map.mappings() {
        let original = original.map_or_else(|| "-".to_string(), |l| l.to_string());
        let _ = writeln!(out, "-- {instrumented:>5} -> {original}");
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_format_source_map() {
        let inst = instrument_source("m.lua", "local x = 1\nprint(x)\n").unwrap();
        let text = format_source_map(&inst.source_map);
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("-- source map for m.lua"));
        let body: Vec<&str> = lines.collect();
        assert_eq!(body.len(), inst.source_map.len());
        assert!(body.iter().any(|l| l.ends_with("-> 1")));
        assert!(body.iter().any(|l| l.ends_with("-> 2")));
        assert!(body.iter().all(|l| l.starts_with("-- ")));
    }

    #[test]
    fn test_missing_file() {
        let args = InstrumentArgs {
            file: "does/not/exist.lua".into(),
            map: false,
        };
        let err = execute_instrument(&CliConfig::new(), &args).unwrap_err();
        assert!(err.to_string().contains("does/not/exist.lua"));
    }
}
