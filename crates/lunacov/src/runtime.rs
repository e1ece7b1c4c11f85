//! Lua runtime wired for coverage
//!
//! [`CoverageRuntime`] owns an interpreter, the [`Loader`] and the
//! [`CoverageStore`]. It replaces three globals:
//!
//! - `require` drives the loader's resolver chain and state machine
//! - `assert` keeps its usual behavior and, when it passes, marks the
//!   calling line covered
//! - `__lunacov` carries `bind(path)` for instrumented chunks and
//!   `mark_line_covered(path, line)` for assertion libraries
//!
//! # Example
//!
//! ```no_run
//! use lunacov::{config::CoverageConfig, CoverageRuntime};
//!
//! let runtime = CoverageRuntime::new(".")?;
//! runtime.install(&CoverageConfig::default());
//! runtime.run_script(std::path::Path::new("test/calc_test.lua"))?;
//! let data = runtime.get_data();
//! # Ok::<(), lunacov::CoverageError>(())
//! ```

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use mlua::{Function, Lua, MultiValue, Table, Value};

use crate::config::CoverageConfig;
use crate::coverage::{BlockId, CoverageData, CoverageStore, FunctionId};
use crate::instrument::RUNTIME_GLOBAL;
use crate::loader::{chunk_name, path_key, read_source, Loader};
use crate::result::{find_cause, CoverageError, CoverageResult};

/// Frames searched for an instrumented caller when an assertion passes
const MAX_STACK_SCAN: usize = 32;

/// An interpreter whose `require` goes through the coverage loader
#[derive(Debug)]
pub struct CoverageRuntime {
    lua: Lua,
    loader: Rc<RefCell<Loader>>,
    store: CoverageStore,
    root: PathBuf,
}

impl CoverageRuntime {
    /// Runtime resolving modules under `root` with a fresh store
    ///
    /// # Errors
    ///
    /// Returns [`CoverageError::Lua`] if the globals cannot be set up.
    pub fn new(root: impl Into<PathBuf>) -> CoverageResult<Self> {
        Self::with_store(root, CoverageStore::new())
    }

    /// Runtime writing into an existing store
    ///
    /// # Errors
    ///
    /// Returns [`CoverageError::Lua`] if the globals cannot be set up.
    pub fn with_store(root: impl Into<PathBuf>, store: CoverageStore) -> CoverageResult<Self> {
        let root = root.into();
        let loader = Rc::new(RefCell::new(Loader::new(root.clone(), store.clone())));
        let runtime = Self {
            lua: Lua::new(),
            loader,
            store,
            root,
        };
        runtime.register_probes()?;
        runtime.register_require()?;
        runtime.register_assert()?;
        Ok(runtime)
    }

    /// The interpreter
    #[must_use]
    pub const fn lua(&self) -> &Lua {
        &self.lua
    }

    /// The store probes write into
    #[must_use]
    pub const fn store(&self) -> &CoverageStore {
        &self.store
    }

    /// Directory modules are resolved against
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Snapshot of the coverage recorded so far
    #[must_use]
    pub fn get_data(&self) -> CoverageData {
        self.store.get_data()
    }

    /// Names of the loader's resolvers, first consulted first
    #[must_use]
    pub fn resolver_names(&self) -> Vec<&'static str> {
        self.loader.borrow().resolver_names()
    }

    /// Start instrumenting modules loaded from now on
    ///
    /// Returns false when the configuration disables coverage or
    /// instrumentation; nothing is installed then.
    pub fn install(&self, config: &CoverageConfig) -> bool {
        self.loader.borrow_mut().install(config)
    }

    /// Stop instrumenting and forget instrumented modules
    ///
    /// Modules that were loaded instrumented are removed from
    /// `package.loaded`, so requiring them again loads plain code.
    pub fn uninstall(&self) -> bool {
        let (removed, modules) = {
            let mut loader = self.loader.borrow_mut();
            let removed = loader.uninstall();
            (removed, loader.take_instrumented_modules())
        };
        if !removed {
            return false;
        }
        match self.package_loaded() {
            Ok(loaded) => {
                for module in &modules {
                    if let Err(e) = loaded.set(module.as_str(), Value::Nil) {
                        tracing::warn!(module, error = %e, "could not evict instrumented module");
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "package.loaded unavailable"),
        }
        true
    }

    /// `require` a module from Rust
    ///
    /// # Errors
    ///
    /// Returns the loader error (circular dependency, missing module,
    /// instrumentation failure) or [`CoverageError::Runtime`] if the
    /// module raised an error.
    pub fn require(&self, module: &str) -> CoverageResult<Value> {
        let require: Function = self.lua.globals().get("require")?;
        require
            .call::<Value>(module)
            .map_err(|e| CoverageError::from_lua(&e))
    }

    /// Run a test script without instrumenting it
    ///
    /// # Errors
    ///
    /// Returns [`CoverageError::Read`] if the script cannot be read, the
    /// loader error if one of its `require`s failed, or
    /// [`CoverageError::Runtime`] for any other error it raised.
    pub fn run_script(&self, path: &Path) -> CoverageResult<()> {
        let source = read_source(path)?;
        let name = path_key(path);
        tracing::debug!(script = %name, "running script");
        self.lua
            .load(source.as_str())
            .set_name(chunk_name(&name))
            .exec()
            .map_err(|e| match find_cause(&e) {
                Some(cause) if !matches!(cause, CoverageError::Lua(_)) => CoverageError::from_lua(&e),
                _ => CoverageError::Runtime {
                    message: remap(&self.loader, &e.to_string()),
                    module: name,
                },
            })
    }

    fn package_loaded(&self) -> mlua::Result<Table> {
        let package: Table = self.lua.globals().get("package")?;
        package.get("loaded")
    }

    fn register_probes(&self) -> mlua::Result<()> {
        let table = self.lua.create_table()?;

        let store = self.store.clone();
        let bind = self.lua.create_function(move |lua, path: String| {
            let Some(file) = store.file_id(&path) else {
                return Err(mlua::Error::RuntimeError(format!(
                    "{path} is not registered for coverage"
                )));
            };
            let s = store.clone();
            let line = lua.create_function(move |_, line: u32| {
                s.mark_executed(file, line);
                Ok(())
            })?;
            let s = store.clone();
            let function = lua.create_function(move |_, index: u32| {
                s.mark_function(file, FunctionId::new(index));
                Ok(())
            })?;
            let s = store.clone();
            let block = lua.create_function(move |_, index: u32| {
                s.mark_block(file, BlockId::new(index));
                Ok(())
            })?;
            Ok((line, function, block))
        })?;
        table.set("bind", bind)?;

        let store = self.store.clone();
        let mark = self
            .lua
            .create_function(move |_, (path, line): (String, u32)| {
                Ok(store.mark_line_covered(&path, line))
            })?;
        table.set("mark_line_covered", mark)?;

        self.lua.globals().set(RUNTIME_GLOBAL, table)
    }

    fn register_require(&self) -> mlua::Result<()> {
        let loader = Rc::clone(&self.loader);
        let require = self
            .lua
            .create_function(move |lua, name: String| require_module(lua, &loader, &name))?;
        self.lua.globals().set("require", require)
    }

    fn register_assert(&self) -> mlua::Result<()> {
        let loader = Rc::clone(&self.loader);
        let store = self.store.clone();
        let assert = self.lua.create_function(move |lua, args: MultiValue| {
            let mut values = args.iter();
            let passed = values
                .next()
                .is_some_and(|v| !matches!(v, Value::Nil | Value::Boolean(false)));
            if !passed {
                let message = match values.next() {
                    Some(Value::String(s)) => s.to_str()?.to_string(),
                    Some(Value::Integer(n)) => n.to_string(),
                    Some(Value::Number(n)) => n.to_string(),
                    _ => "assertion failed!".to_string(),
                };
                return Err(mlua::Error::RuntimeError(message));
            }
            mark_assertion_site(lua, &loader, &store);
            Ok(args)
        })?;
        self.lua.globals().set("assert", assert)
    }
}

/// Rewrite instrumented line numbers in a message for every loaded file
fn remap(loader: &RefCell<Loader>, message: &str) -> String {
    loader
        .borrow()
        .instrumented_files()
        .fold(message.to_string(), |msg, inst| inst.source_map.remap_message(&msg))
}

fn require_module(lua: &Lua, loader: &RefCell<Loader>, name: &str) -> mlua::Result<Value> {
    let package: Table = lua.globals().get("package")?;
    let loaded: Table = package.get("loaded")?;
    let cached: Value = loaded.get(name)?;
    if !cached.is_nil() {
        return Ok(cached);
    }
    if let Some(preload) = package.get::<Option<Table>>("preload")? {
        if let Some(open) = preload.get::<Option<Function>>(name)? {
            let value: Value = open.call((name, ":preload:"))?;
            return store_loaded(&loaded, name, value);
        }
    }

    loader.borrow_mut().begin(name)?;
    let resolved = loader.borrow_mut().resolve(lua, name);
    let resolved = match resolved {
        Ok(resolved) => resolved,
        Err(e) => {
            loader.borrow_mut().finish(name, false);
            return Err(e.into());
        }
    };

    match resolved.chunk.call::<Value>((name, resolved.path.as_str())) {
        Ok(value) => {
            loader.borrow_mut().finish(name, true);
            store_loaded(&loaded, name, value)
        }
        Err(e) => {
            loader.borrow_mut().finish(name, false);
            if find_cause(&e).is_some() {
                return Err(e);
            }
            Err(CoverageError::Runtime {
                module: name.to_string(),
                message: remap(loader, &e.to_string()),
            }
            .into())
        }
    }
}

/// `package.loaded` update with standard `require` semantics
fn store_loaded(loaded: &Table, name: &str, value: Value) -> mlua::Result<Value> {
    if !value.is_nil() {
        loaded.set(name, value)?;
    } else if loaded.get::<Value>(name)?.is_nil() {
        loaded.set(name, true)?;
    }
    loaded.get(name)
}

/// Mark the line of the nearest instrumented caller covered
///
/// Frames without a file chunk name, untracked files and scaffolding lines
/// are skipped; if nothing matches, nothing is marked.
fn mark_assertion_site(lua: &Lua, loader: &RefCell<Loader>, store: &CoverageStore) {
    for level in 1..=MAX_STACK_SCAN {
        let Some(frame) = lua.inspect_stack(level) else {
            return;
        };
        let line = frame.curr_line();
        let source = frame.source();
        let Some(path) = source.source.as_deref().and_then(|s| s.strip_prefix('@')) else {
            continue;
        };
        if line <= 0 {
            continue;
        }
        let Some(instrumented) = loader.borrow().instrumented_file(path) else {
            continue;
        };
        if let Some(original) = instrumented.source_map.original_line(line as u32) {
            if !store.mark_line_covered(path, original) {
                tracing::debug!(path, line = original, "assertion line not marked");
            }
            return;
        }
    }
}
