//! Module loader with an explicit resolver chain
//!
//! The [`Loader`] owns an ordered chain of [`ModuleResolver`]s and the
//! per-module load state used to detect circular `require`s:
//!
//! ```text
//! (none) ──begin──► Loading ──finish(ok)──► Loaded
//!                      │
//!                      └──finish(err)──► Failed   (may be retried)
//! ```
//!
//! `begin` on a module that is already `Loading` fails immediately with
//! [`CoverageError::CircularDependency`].

mod compiler;
mod instrumenting;
mod resolver;
mod searchers;

pub use compiler::{chunk_name, ChunkCompiler, MluaCompiler};
pub use instrumenting::{InstrumentingResolver, PathFilter};
pub use resolver::{
    candidate_paths, find_module, path_key, FileResolver, ModuleResolver, ResolvedModule,
};
pub use searchers::SearcherResolver;
pub(crate) use resolver::read_source;

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::rc::Rc;

use mlua::Lua;

use crate::config::CoverageConfig;
use crate::coverage::CoverageStore;
use crate::instrument::Instrumented;
use crate::result::{CoverageError, CoverageResult};

/// Load state of one module name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Being resolved or executed
    Loading,
    /// Loaded successfully
    Loaded,
    /// Last attempt failed
    Failed,
}

/// Resolver chain plus load bookkeeping for one interpreter
#[derive(Debug)]
pub struct Loader {
    root: PathBuf,
    store: CoverageStore,
    compiler: Rc<dyn ChunkCompiler>,
    resolvers: Vec<Box<dyn ModuleResolver>>,
    states: HashMap<String, LoadState>,
    stack: Vec<String>,
    instrumented_modules: BTreeSet<String>,
    instrumented_files: HashMap<String, Rc<Instrumented>>,
}

impl Loader {
    /// Loader resolving modules under `root` with only plain file loading,
    /// then through `package.searchers`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, store: CoverageStore) -> Self {
        Self::with_compiler(root, store, Rc::new(MluaCompiler))
    }

    /// Loader using a custom compiler
    #[must_use]
    pub fn with_compiler(
        root: impl Into<PathBuf>,
        store: CoverageStore,
        compiler: Rc<dyn ChunkCompiler>,
    ) -> Self {
        let root = root.into();
        let file = FileResolver::new(root.clone(), Rc::clone(&compiler));
        Self {
            root,
            store,
            compiler,
            resolvers: vec![Box::new(file), Box::new(SearcherResolver)],
            states: HashMap::new(),
            stack: Vec::new(),
            instrumented_modules: BTreeSet::new(),
            instrumented_files: HashMap::new(),
        }
    }

    /// Insert a resolver at the front of the chain
    pub fn push_front(&mut self, resolver: Box<dyn ModuleResolver>) {
        self.resolvers.insert(0, resolver);
    }

    /// Names of the resolvers, first consulted first
    #[must_use]
    pub fn resolver_names(&self) -> Vec<&'static str> {
        self.resolvers.iter().map(|r| r.name()).collect()
    }

    /// Whether an instrumenting resolver is in the chain
    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.resolvers.iter().any(|r| r.instruments())
    }

    /// Put the instrumenting resolver in front of the chain
    ///
    /// Returns false, changing nothing, when coverage or instrumentation is
    /// disabled. Installing twice is a no-op that returns true.
    pub fn install(&mut self, config: &CoverageConfig) -> bool {
        if !config.is_active() {
            tracing::info!(
                enabled = config.enabled,
                use_instrumentation = config.use_instrumentation,
                "coverage instrumentation disabled, loader not installed"
            );
            return false;
        }
        if self.is_installed() {
            return true;
        }
        let filter = PathFilter::new(&config.include, &config.exclude);
        self.push_front(Box::new(InstrumentingResolver::new(
            self.root.clone(),
            self.store.clone(),
            Rc::clone(&self.compiler),
            filter,
        )));
        tracing::info!(root = %self.root.display(), "instrumenting loader installed");
        true
    }

    /// Remove instrumenting resolvers and clear their caches
    ///
    /// Returns false if nothing was installed. Modules loaded through
    /// instrumentation are forgotten so they load plain next time; see
    /// [`Loader::take_instrumented_modules`].
    pub fn uninstall(&mut self) -> bool {
        let before = self.resolvers.len();
        let mut kept = Vec::with_capacity(before);
        for mut resolver in self.resolvers.drain(..) {
            if resolver.instruments() {
                if !resolver.clear_cache() {
                    tracing::warn!(resolver = resolver.name(), "cache not cleared on uninstall");
                }
            } else {
                kept.push(resolver);
            }
        }
        self.resolvers = kept;
        if self.resolvers.len() == before {
            return false;
        }
        for module in &self.instrumented_modules {
            let _ = self.states.remove(module);
        }
        self.instrumented_files.clear();
        tracing::info!("instrumenting loader uninstalled");
        true
    }

    /// Drain the names of modules that were loaded instrumented
    pub fn take_instrumented_modules(&mut self) -> BTreeSet<String> {
        std::mem::take(&mut self.instrumented_modules)
    }

    /// Instrumentation record of a loaded file, by path key
    #[must_use]
    pub fn instrumented_file(&self, path: &str) -> Option<Rc<Instrumented>> {
        self.instrumented_files.get(path).cloned()
    }

    /// Every instrumented file loaded so far
    pub fn instrumented_files(&self) -> impl Iterator<Item = &Rc<Instrumented>> {
        self.instrumented_files.values()
    }

    /// Current state of a module
    #[must_use]
    pub fn state(&self, module: &str) -> Option<LoadState> {
        self.states.get(module).copied()
    }

    /// Modules currently loading, outermost first
    #[must_use]
    pub fn loading_stack(&self) -> &[String] {
        &self.stack
    }

    /// Mark a module as loading
    ///
    /// # Errors
    ///
    /// Returns [`CoverageError::CircularDependency`] if it is already
    /// loading.
    pub fn begin(&mut self, module: &str) -> CoverageResult<()> {
        if self.state(module) == Some(LoadState::Loading) {
            let mut chain = self.stack.clone();
            chain.push(module.to_string());
            tracing::debug!(module, chain = %chain.join(" -> "), "circular require");
            return Err(CoverageError::CircularDependency {
                module: module.to_string(),
                chain,
            });
        }
        let _ = self.states.insert(module.to_string(), LoadState::Loading);
        self.stack.push(module.to_string());
        Ok(())
    }

    /// Leave the loading state
    pub fn finish(&mut self, module: &str, ok: bool) {
        if let Some(pos) = self.stack.iter().rposition(|m| m == module) {
            let _ = self.stack.remove(pos);
        }
        let state = if ok { LoadState::Loaded } else { LoadState::Failed };
        let _ = self.states.insert(module.to_string(), state);
    }

    /// Ask each resolver in turn for `module`
    ///
    /// # Errors
    ///
    /// Propagates the first resolver error, or returns
    /// [`CoverageError::ModuleNotFound`] when every resolver declines.
    pub fn resolve(&mut self, lua: &Lua, module: &str) -> CoverageResult<ResolvedModule> {
        for resolver in &mut self.resolvers {
            if let Some(resolved) = resolver.resolve(lua, module)? {
                if let Some(instrumented) = &resolved.instrumented {
                    let _ = self.instrumented_modules.insert(module.to_string());
                    let _ = self
                        .instrumented_files
                        .insert(resolved.path.clone(), Rc::clone(instrumented));
                }
                return Ok(resolved);
            }
        }
        Err(CoverageError::ModuleNotFound {
            module: module.to_string(),
            searched: candidate_paths(module)
                .iter()
                .map(|c| self.root.join(c).display().to_string())
                .collect(),
        })
    }
}
