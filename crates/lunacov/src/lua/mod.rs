//! Lua front end: tokenizer, syntax tree and parser
//!
//! The instrumenter and the static cross-check both start from
//! [`parse`], which turns source text into a [`Chunk`] whose statements
//! carry their original line numbers.

pub mod ast;
mod lexer;
mod parser;

pub use ast::{Block, Chunk, ElseClause, Expr, FuncBody, IfClause, Probe, Stat, StatKind};
pub use lexer::{count_lines, split_lines, tokenize, Token, TokenKind};

use crate::result::{CoverageError, CoverageResult};

/// Syntax error with the line it occurred on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// 1-based line
    pub line: u32,
    /// Error message
    pub message: String,
}

impl ParseError {
    /// Create a parse error
    #[must_use]
    pub fn new(line: u32, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// Parse Lua source into a syntax tree
///
/// # Errors
///
/// Returns [`CoverageError::Parse`] naming `path` and the failing line.
pub fn parse(source: &str, path: &str) -> CoverageResult<Chunk> {
    parser::parse_chunk(source).map_err(|e| CoverageError::Parse {
        path: path.to_string(),
        line: e.line,
        message: e.message,
    })
}
