//! Source-to-source instrumentation
//!
//! [`instrument_source`] runs the whole build step for one file:
//! parse, insert probes, generate Lua text and build the source map.
//! The generated chunk expects a global `__lunacov` table whose `bind`
//! function returns the three probe callbacks for the file.

pub mod cache;
pub mod generator;
pub mod sourcemap;
pub mod transformer;

pub use cache::{CacheEntry, CacheKey, CacheStats, InstrumentCache, ModificationSignature};
pub use generator::{generate, Generated};
pub use sourcemap::SourceMap;
pub use transformer::{transform, BlockInfo, BlockKind, FunctionInfo, InstrumentationLayout, Transformed};

use std::fmt::Write as _;

use crate::lua;
use crate::result::CoverageResult;

/// Global table the instrumented code binds its probes from
pub const RUNTIME_GLOBAL: &str = "__lunacov";
/// Local holding the line probe
pub const LINE_PROBE: &str = "__lunacov_l";
/// Local holding the function probe
pub const FUNCTION_PROBE: &str = "__lunacov_f";
/// Local holding the block probe
pub const BLOCK_PROBE: &str = "__lunacov_b";
/// Locals declared by the binding header
pub const HEADER_LOCALS: usize = 3;

/// A fully instrumented source file
#[derive(Debug, Clone)]
pub struct Instrumented {
    /// Path as given to the loader
    pub path: String,
    /// Unmodified source text
    pub original_source: String,
    /// Instrumented source text
    pub source: String,
    /// Instrumented-line to original-line map
    pub source_map: SourceMap,
    /// Executable lines, functions and blocks
    pub layout: InstrumentationLayout,
}

/// Instrument one file
///
/// # Errors
///
/// Returns [`crate::CoverageError::Parse`] or
/// [`crate::CoverageError::Transform`]; the caller must not fall back to
/// running the file uninstrumented.
pub fn instrument_source(path: &str, source: &str) -> CoverageResult<Instrumented> {
    let chunk = lua::parse(source, path)?;
    let Transformed { chunk, layout } = transform(&chunk, path, HEADER_LOCALS)?;
    let generated = generate(&chunk, path);
    let source_map = SourceMap::create(path, source, &generated)?;
    tracing::debug!(
        path,
        executable_lines = layout.executable_lines.len(),
        functions = layout.functions.len(),
        blocks = layout.blocks.len(),
        "instrumented"
    );
    Ok(Instrumented {
        path: path.to_string(),
        original_source: source.to_string(),
        source: generated.source,
        source_map,
        layout,
    })
}

/// Quote a string as a Lua short string literal
#[must_use]
pub fn lua_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let mut buf = [0u8; 4];
                for byte in c.encode_utf8(&mut buf).bytes() {
                    let _ = write!(out, "\\{byte:03}");
                }
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
