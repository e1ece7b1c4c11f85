//! Instrumented-line to original-line mapping

use regex::{Captures, Regex};

use super::generator::Generated;
use crate::lua::count_lines;
use crate::result::{CoverageError, CoverageResult};

/// Maps lines of instrumented source back to the original file
///
/// Lookup goes one way only. Scaffolding lines (the binding header and the
/// probe calls) have no original line.
#[derive(Debug, Clone)]
pub struct SourceMap {
    path: String,
    origins: Vec<Option<u32>>,
    original_lines: u32,
    location: Regex,
}

impl SourceMap {
    /// Build the map for `path` from generator output
    ///
    /// # Errors
    ///
    /// Returns [`CoverageError::Transform`] if a generated line points
    /// outside the original source.
    pub fn create(path: &str, original_source: &str, generated: &Generated) -> CoverageResult<Self> {
        let original_lines = count_lines(original_source).max(1);
        if let Some((line, origin)) = generated
            .line_origins
            .iter()
            .enumerate()
            .find_map(|(i, o)| o.filter(|&n| n == 0 || n > original_lines).map(|n| (i + 1, n)))
        {
            return Err(CoverageError::Transform {
                path: path.to_string(),
                message: format!(
                    "instrumented line {line} maps to line {origin}, but the file has {original_lines} lines"
                ),
            });
        }

        let location = Regex::new(r#"([^\s:"']+):(\d+):"#).map_err(|e| CoverageError::Transform {
            path: path.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            path: path.to_string(),
            origins: generated.line_origins.clone(),
            original_lines,
            location,
        })
    }

    /// File this map belongs to
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Number of instrumented lines
    #[must_use]
    pub fn len(&self) -> usize {
        self.origins.len()
    }

    /// Whether the instrumented source is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    /// Number of lines in the original source
    #[must_use]
    pub const fn original_lines(&self) -> u32 {
        self.original_lines
    }

    /// Original line for an instrumented line, `None` for scaffolding or
    /// out-of-range lines
    #[must_use]
    pub fn original_line(&self, instrumented: u32) -> Option<u32> {
        let index = usize::try_from(instrumented).ok()?.checked_sub(1)?;
        self.origins.get(index).copied().flatten()
    }

    /// `(instrumented, original)` pairs in instrumented order
    pub fn mappings(&self) -> impl Iterator<Item = (u32, Option<u32>)> + '_ {
        self.origins
            .iter()
            .enumerate()
            .map(|(i, origin)| (i as u32 + 1, *origin))
    }

    fn names_this_file(&self, name: &str) -> bool {
        name == self.path
            || name
                .strip_prefix("...")
                .is_some_and(|tail| !tail.is_empty() && self.path.ends_with(tail))
    }

    /// Rewrite `path:N:` locations of this file in an error message to
    /// original line numbers
    ///
    /// Lua shortens long chunk names to `...tail`; those are matched too.
    /// Locations of other files and scaffolding lines are left alone.
    #[must_use]
    pub fn remap_message(&self, message: &str) -> String {
        self.location
            .replace_all(message, |caps: &Captures<'_>| {
                let name = &caps[1];
                let original = caps[2]
                    .parse::<u32>()
                    .ok()
                    .filter(|_| self.names_this_file(name))
                    .and_then(|line| self.original_line(line));
                match original {
                    Some(line) => format!("{name}:{line}:"),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}
