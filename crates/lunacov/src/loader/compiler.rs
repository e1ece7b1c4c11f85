//! Turning source text into a callable chunk

use std::fmt;

use mlua::{Function, Lua};

use crate::result::{CoverageError, CoverageResult};

/// Compiles Lua source into an executable chunk
pub trait ChunkCompiler: fmt::Debug {
    /// Compile `source` for the file `path`
    ///
    /// # Errors
    ///
    /// Returns [`CoverageError::Compile`] if the source does not compile.
    fn compile(&self, lua: &Lua, source: &str, path: &str) -> CoverageResult<Function>;
}

/// Compiles with the embedded interpreter under the chunk name `@path`
#[derive(Debug, Clone, Copy, Default)]
pub struct MluaCompiler;

/// Chunk name for a file, as shown in Lua error messages
#[must_use]
pub fn chunk_name(path: &str) -> String {
    format!("@{path}")
}

impl ChunkCompiler for MluaCompiler {
    fn compile(&self, lua: &Lua, source: &str, path: &str) -> CoverageResult<Function> {
        lua.load(source)
            .set_name(chunk_name(path))
            .into_function()
            .map_err(|e| CoverageError::Compile {
                path: path.to_string(),
                message: e.to_string(),
            })
    }
}
