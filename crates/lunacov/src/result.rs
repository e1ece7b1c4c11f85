//! Result and error types for Lunacov.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for Lunacov operations
pub type CoverageResult<T> = Result<T, CoverageError>;

/// Errors that can occur while instrumenting, loading or reporting
///
/// Validation findings are never errors; they are returned as
/// [`crate::validation::ValidationIssue`] data.
#[derive(Debug, Error)]
pub enum CoverageError {
    /// Source could not be parsed into an AST
    #[error("parse error in {path}:{line}: {message}")]
    Parse {
        /// File being parsed
        path: String,
        /// Line where parsing stopped
        line: u32,
        /// Error message
        message: String,
    },

    /// AST could not be instrumented
    #[error("transform failed for {path}: {message}")]
    Transform {
        /// File being instrumented
        path: String,
        /// Error message
        message: String,
    },

    /// Instrumented source failed to compile
    #[error("compile failed for {path}: {message}")]
    Compile {
        /// File being compiled
        path: String,
        /// Error message
        message: String,
    },

    /// A module was required again while it was still loading
    #[error("circular dependency detected while loading '{module}' (chain: {})", chain.join(" -> "))]
    CircularDependency {
        /// Module that was re-entered
        module: String,
        /// Modules currently loading, outermost first, ending with `module`
        chain: Vec<String>,
    },

    /// No resolver in the chain accepted the module name
    #[error("module '{module}' not found (searched: {})", searched.join(", "))]
    ModuleNotFound {
        /// Requested module name
        module: String,
        /// Candidate paths that were tried
        searched: Vec<String>,
    },

    /// Source file exists but could not be read
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// File that could not be read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Module raised an error while executing
    #[error("error running module '{module}': {message}")]
    Runtime {
        /// Module name
        module: String,
        /// Error message, with line numbers mapped to the original source
        message: String,
    },

    /// Configuration could not be loaded
    #[error("configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Lua interpreter error outside a module load
    #[error("lua error: {0}")]
    Lua(#[from] mlua::Error),
}

impl CoverageError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether this error came from building instrumented code
    #[must_use]
    pub const fn is_instrumentation_failure(&self) -> bool {
        matches!(
            self,
            Self::Parse { .. } | Self::Transform { .. } | Self::Compile { .. }
        )
    }
}

impl CoverageError {
    /// Recover the error that crossed the Lua boundary
    ///
    /// Errors raised from Rust callbacks travel through Lua frames wrapped
    /// in callback errors; the innermost [`CoverageError`] is rebuilt.
    /// Anything else becomes [`CoverageError::Lua`].
    #[must_use]
    pub fn from_lua(err: &mlua::Error) -> Self {
        find_cause(err).map_or_else(|| Self::Lua(err.clone()), Self::duplicate)
    }

    fn duplicate(&self) -> Self {
        match self {
            Self::Parse {
                path,
                line,
                message,
            } => Self::Parse {
                path: path.clone(),
                line: *line,
                message: message.clone(),
            },
            Self::Transform { path, message } => Self::Transform {
                path: path.clone(),
                message: message.clone(),
            },
            Self::Compile { path, message } => Self::Compile {
                path: path.clone(),
                message: message.clone(),
            },
            Self::CircularDependency { module, chain } => Self::CircularDependency {
                module: module.clone(),
                chain: chain.clone(),
            },
            Self::ModuleNotFound { module, searched } => Self::ModuleNotFound {
                module: module.clone(),
                searched: searched.clone(),
            },
            Self::Read { path, source } => Self::Read {
                path: path.clone(),
                source: std::io::Error::new(source.kind(), source.to_string()),
            },
            Self::Runtime { module, message } => Self::Runtime {
                module: module.clone(),
                message: message.clone(),
            },
            Self::Config { message } => Self::config(message.clone()),
            Self::Io(e) => Self::Io(std::io::Error::new(e.kind(), e.to_string())),
            Self::Json(e) => Self::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                e.to_string(),
            )),
            Self::Lua(e) => Self::Lua(e.clone()),
        }
    }
}

/// Innermost [`CoverageError`] carried by a Lua error, if any
#[must_use]
pub fn find_cause(err: &mlua::Error) -> Option<&CoverageError> {
    match err {
        mlua::Error::ExternalError(inner) => inner.downcast_ref::<CoverageError>(),
        mlua::Error::CallbackError { cause, .. } | mlua::Error::WithContext { cause, .. } => {
            find_cause(cause)
        }
        _ => None,
    }
}

impl From<CoverageError> for mlua::Error {
    fn from(err: CoverageError) -> Self {
        match err {
            CoverageError::Lua(inner) => inner,
            other => Self::external(other),
        }
    }
}
