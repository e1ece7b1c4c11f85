//! Fallback to the interpreter's own `package.searchers`

use mlua::{Lua, MultiValue, Table, Value};

use super::resolver::{ModuleResolver, ResolvedModule};
use crate::result::{CoverageError, CoverageResult};

/// Hands modules the root-based resolvers declined to `package.searchers`
///
/// This keeps `package.path`, `package.cpath` and searchers added by
/// scripts working. The table is read on every call, as `require` does.
/// Modules found here are never instrumented.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearcherResolver;

fn package_searchers(lua: &Lua) -> mlua::Result<Option<Table>> {
    match lua.globals().get::<Option<Table>>("package")? {
        Some(package) => package.get("searchers"),
        None => Ok(None),
    }
}

impl ModuleResolver for SearcherResolver {
    fn name(&self) -> &'static str {
        "searchers"
    }

    fn resolve(&mut self, lua: &Lua, module: &str) -> CoverageResult<Option<ResolvedModule>> {
        let Some(searchers) = package_searchers(lua)? else {
            return Ok(None);
        };
        for searcher in searchers.sequence_values::<Value>() {
            let Value::Function(searcher) = searcher? else {
                continue;
            };
            let found: MultiValue = searcher
                .call(module)
                .map_err(|e| CoverageError::from_lua(&e))?;
            let mut found = found.into_iter();
            let Some(Value::Function(chunk)) = found.next() else {
                continue;
            };
            let path = match found.next() {
                Some(Value::String(s)) => s.to_string_lossy(),
                _ => format!(":{module}:"),
            };
            tracing::debug!(module, path, "loaded through package.searchers");
            return Ok(Some(ResolvedModule {
                path,
                chunk,
                instrumented: None,
            }));
        }
        Ok(None)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::fs;

    fn lua_with_path(dir: &std::path::Path) -> Lua {
        let lua = Lua::new();
        let package: Table = lua.globals().get("package").unwrap();
        package
            .set("path", format!("{}/?.lua", dir.display()))
            .unwrap();
        lua
    }

    #[test]
    fn test_finds_module_on_package_path() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ext.lua"), "local name = ...\nreturn name .. '!'").unwrap();
        let lua = lua_with_path(dir.path());

        let resolved = SearcherResolver.resolve(&lua, "ext").unwrap().unwrap();
        assert!(resolved.path.ends_with("ext.lua"), "{}", resolved.path);
        assert!(resolved.instrumented.is_none());
        let value: String = resolved.chunk.call(("ext", resolved.path.as_str())).unwrap();
        assert_eq!(value, "ext!");
    }

    #[test]
    fn test_declines_unknown_module() {
        let dir = tempfile::tempdir().unwrap();
        let lua = lua_with_path(dir.path());
        assert!(SearcherResolver.resolve(&lua, "nowhere_at_all").unwrap().is_none());
    }

    #[test]
    fn test_custom_searcher_is_consulted() {
        let lua = Lua::new();
        lua.load(
            "table.insert(package.searchers, function(name)
               if name == 'virtual' then
                 return function() return 7 end, 'virtual-src'
               end
               return 'no virtual ' .. name
             end)",
        )
        .exec()
        .unwrap();

        let resolved = SearcherResolver.resolve(&lua, "virtual").unwrap().unwrap();
        assert_eq!(resolved.path, "virtual-src");
        assert_eq!(resolved.chunk.call::<i64>(()).unwrap(), 7);
    }

    #[test]
    fn test_syntax_error_on_package_path_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.lua"), "return +").unwrap();
        let lua = lua_with_path(dir.path());
        let err = SearcherResolver.resolve(&lua, "broken").unwrap_err();
        assert!(err.to_string().contains("broken"), "{err}");
    }
}
