//! Resolver that instruments modules as they load

use std::path::{Path, PathBuf};
use std::rc::Rc;

use mlua::{Function, Lua};

use super::compiler::ChunkCompiler;
use super::resolver::{find_module, path_key, read_source, ModuleResolver, ResolvedModule};
use crate::coverage::CoverageStore;
use crate::instrument::{instrument_source, CacheEntry, CacheKey, InstrumentCache, Instrumented};
use crate::result::CoverageResult;

/// Include/exclude glob filter over root-relative paths
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    include: Vec<glob::Pattern>,
    exclude: Vec<glob::Pattern>,
}

fn compile_patterns(patterns: &[String]) -> Vec<glob::Pattern> {
    patterns
        .iter()
        .filter_map(|p| match glob::Pattern::new(p) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                tracing::warn!(pattern = %p, error = %e, "ignoring invalid pattern");
                None
            }
        })
        .collect()
}

impl PathFilter {
    /// Build a filter; invalid patterns are skipped with a warning
    #[must_use]
    pub fn new(include: &[String], exclude: &[String]) -> Self {
        Self {
            include: compile_patterns(include),
            exclude: compile_patterns(exclude),
        }
    }

    /// Whether a root-relative path should be instrumented
    #[must_use]
    pub fn allows(&self, relative: &str) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|p| p.matches(relative));
        included && !self.exclude.iter().any(|p| p.matches(relative))
    }
}

/// Instruments, compiles and caches modules, registering them with the store
///
/// Declines modules that do not exist or that the filter rejects. Every
/// failure on a file it accepted is returned as an error; it never hands
/// back uninstrumented code.
#[derive(Debug)]
pub struct InstrumentingResolver {
    root: PathBuf,
    store: CoverageStore,
    compiler: Rc<dyn ChunkCompiler>,
    filter: PathFilter,
    cache: InstrumentCache,
}

impl InstrumentingResolver {
    /// Create a resolver for modules under `root`
    #[must_use]
    pub fn new(
        root: impl Into<PathBuf>,
        store: CoverageStore,
        compiler: Rc<dyn ChunkCompiler>,
        filter: PathFilter,
    ) -> Self {
        Self {
            root: root.into(),
            store,
            compiler,
            filter,
            cache: InstrumentCache::new(),
        }
    }

    /// The instrumented-module cache
    #[must_use]
    pub const fn cache(&self) -> &InstrumentCache {
        &self.cache
    }

    fn relative<'a>(&self, file: &'a Path) -> &'a Path {
        file.strip_prefix(&self.root).unwrap_or(file)
    }

    fn build(&self, lua: &Lua, file: &Path, path: &str) -> CoverageResult<(Rc<Instrumented>, Function)> {
        let source = read_source(file)?;
        let instrumented = instrument_source(path, &source)?;
        let chunk = self.compiler.compile(lua, &instrumented.source, path)?;
        Ok((Rc::new(instrumented), chunk))
    }
}

impl ModuleResolver for InstrumentingResolver {
    fn name(&self) -> &'static str {
        "instrumenting"
    }

    fn resolve(&mut self, lua: &Lua, module: &str) -> CoverageResult<Option<ResolvedModule>> {
        let Some(file) = find_module(&self.root, module) else {
            return Ok(None);
        };
        let relative = path_key(self.relative(&file));
        if !self.filter.allows(&relative) {
            tracing::debug!(module, path = %relative, "excluded from instrumentation");
            return Ok(None);
        }
        let path = path_key(&file);

        let key = CacheKey::for_path(&file);
        let cached = key.as_ref().and_then(|k| self.cache.lookup(k));
        let (instrumented, chunk) = match cached {
            Some(entry) => (entry.instrumented, entry.chunk),
            None => {
                let (instrumented, chunk) = self.build(lua, &file, &path)?;
                if let Some(key) = key {
                    let entry = CacheEntry {
                        key,
                        instrumented: Rc::clone(&instrumented),
                        chunk: chunk.clone(),
                    };
                    if !self.cache.set(&file, entry) {
                        tracing::debug!(module, path, "build result not cached");
                    }
                }
                (instrumented, chunk)
            }
        };

        let _ = self
            .store
            .register_file(&path, &instrumented.layout, &instrumented.original_source);
        tracing::debug!(module, path, "loaded instrumented");
        Ok(Some(ResolvedModule {
            path,
            chunk,
            instrumented: Some(instrumented),
        }))
    }

    fn instruments(&self) -> bool {
        true
    }

    fn clear_cache(&mut self) -> bool {
        self.cache.clear()
    }
}
