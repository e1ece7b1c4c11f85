//! Module resolvers and path resolution

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;

use mlua::{Function, Lua};

use super::compiler::ChunkCompiler;
use crate::instrument::Instrumented;
use crate::result::{CoverageError, CoverageResult};

/// A module a resolver accepted
#[derive(Debug, Clone)]
pub struct ResolvedModule {
    /// File the module was loaded from, as used in chunk names and reports
    pub path: String,
    /// Compiled chunk; calling it runs the module body
    pub chunk: Function,
    /// Present when the chunk was instrumented
    pub instrumented: Option<Rc<Instrumented>>,
}

/// One link in the loader's resolver chain
///
/// `Ok(None)` declines the module so the next resolver can try it. `Err`
/// ends the `require` call; the chain is not consulted further.
pub trait ModuleResolver: fmt::Debug {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Resolve and compile a dotted module name
    ///
    /// # Errors
    ///
    /// Returns read, parse, transform or compile errors for a file the
    /// resolver decided to load.
    fn resolve(&mut self, lua: &Lua, module: &str) -> CoverageResult<Option<ResolvedModule>>;

    /// Whether this resolver instruments what it loads
    fn instruments(&self) -> bool {
        false
    }

    /// Drop any cached build results
    fn clear_cache(&mut self) -> bool {
        true
    }
}

/// Candidate file names for a dotted module name, in search order
///
/// `a.b` gives `./a/b.lua`, `a/b.lua` and `a/b/init.lua`.
#[must_use]
pub fn candidate_paths(module: &str) -> Vec<String> {
    let rel = module.replace('.', "/");
    vec![
        format!("./{rel}.lua"),
        format!("{rel}.lua"),
        format!("{rel}/init.lua"),
    ]
}

/// Join and drop `.` components
fn normalize(root: &Path, candidate: &str) -> PathBuf {
    root.join(candidate)
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// First existing candidate file for `module` under `root`
#[must_use]
pub fn find_module(root: &Path, module: &str) -> Option<PathBuf> {
    candidate_paths(module)
        .iter()
        .map(|c| normalize(root, c))
        .find(|p| p.is_file())
}

/// Path key of a file: its display form with `./` prefixes removed
#[must_use]
pub fn path_key(path: &Path) -> String {
    let cleaned: PathBuf = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    cleaned.display().to_string()
}

pub(crate) fn read_source(path: &Path) -> CoverageResult<String> {
    std::fs::read_to_string(path).map_err(|source| CoverageError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads modules from disk without instrumentation
///
/// Last of the resolvers that search under the project root.
#[derive(Debug)]
pub struct FileResolver {
    root: PathBuf,
    compiler: Rc<dyn ChunkCompiler>,
}

impl FileResolver {
    /// Resolve modules under `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, compiler: Rc<dyn ChunkCompiler>) -> Self {
        Self {
            root: root.into(),
            compiler,
        }
    }
}

impl ModuleResolver for FileResolver {
    fn name(&self) -> &'static str {
        "file"
    }

    fn resolve(&mut self, lua: &Lua, module: &str) -> CoverageResult<Option<ResolvedModule>> {
        let Some(file) = find_module(&self.root, module) else {
            return Ok(None);
        };
        let path = path_key(&file);
        let source = read_source(&file)?;
        let chunk = self.compiler.compile(lua, &source, &path)?;
        tracing::debug!(module, path, "loaded without instrumentation");
        Ok(Some(ResolvedModule {
            path,
            chunk,
            instrumented: None,
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::loader::compiler::MluaCompiler;
    use std::fs;

    #[test]
    fn test_candidate_order() {
        assert_eq!(
            candidate_paths("lib.util"),
            vec!["./lib/util.lua", "lib/util.lua", "lib/util/init.lua"]
        );
    }

    #[test]
    fn test_find_module_prefers_file_over_init() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("pkg/sub")).unwrap();
        fs::write(dir.path().join("pkg/sub/init.lua"), "return 1").unwrap();
        assert_eq!(
            find_module(dir.path(), "pkg.sub").unwrap(),
            dir.path().join("pkg/sub/init.lua")
        );
        fs::write(dir.path().join("pkg/sub.lua"), "return 2").unwrap();
        assert_eq!(
            find_module(dir.path(), "pkg.sub").unwrap(),
            dir.path().join("pkg/sub.lua")
        );
        assert!(find_module(dir.path(), "nope").is_none());
    }

    #[test]
    fn test_path_key_strips_current_dir() {
        assert_eq!(path_key(Path::new("./lib/m.lua")), "lib/m.lua");
    }

    #[test]
    fn test_file_resolver_declines_missing_module() {
        let dir = tempfile::tempdir().unwrap();
        let lua = Lua::new();
        let mut resolver = FileResolver::new(dir.path(), Rc::new(MluaCompiler));
        assert!(resolver.resolve(&lua, "missing").unwrap().is_none());
        assert!(!resolver.instruments());
    }

    #[test]
    fn test_file_resolver_compiles() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("m.lua"), "return 7").unwrap();
        let lua = Lua::new();
        let mut resolver = FileResolver::new(dir.path(), Rc::new(MluaCompiler));
        let resolved = resolver.resolve(&lua, "m").unwrap().unwrap();
        assert!(resolved.instrumented.is_none());
        assert_eq!(resolved.chunk.call::<i64>(()).unwrap(), 7);
    }
}
