//! Lua syntax tree
//!
//! Literals hold their raw source text. Every statement and function body
//! records the line it starts on in the original file; the instrumenter
//! relies on those positions, never on positions in generated text.

use std::collections::HashMap;

/// A parsed source file
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Top-level block
    pub block: Block,
    /// Number of lines in the source text
    pub line_count: u32,
}

/// A sequence of statements with an optional trailing `return`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    /// Statements in order
    pub stats: Vec<Stat>,
    /// Trailing return statement
    pub ret: Option<Return>,
}

/// `return explist`
#[derive(Debug, Clone, PartialEq)]
pub struct Return {
    /// Returned expressions
    pub exprs: Vec<Expr>,
    /// Line of the `return` keyword
    pub line: u32,
}

/// A statement and the line it starts on
#[derive(Debug, Clone, PartialEq)]
pub struct Stat {
    /// Statement form
    pub kind: StatKind,
    /// 1-based original line
    pub line: u32,
}

/// Statement forms
#[derive(Debug, Clone, PartialEq)]
pub enum StatKind {
    /// `;`
    Empty,
    /// `local a <const>, b = ...`
    Local {
        /// Names with optional attribute
        names: Vec<(String, Option<String>)>,
        /// Initializers
        exprs: Vec<Expr>,
    },
    /// `a, b.c = ...`
    Assign {
        /// Assignment targets
        targets: Vec<Expr>,
        /// Values
        exprs: Vec<Expr>,
    },
    /// Function or method call used as a statement
    Call(Expr),
    /// `do ... end`
    Do(Block),
    /// `while cond do ... end`
    While {
        /// Loop condition
        cond: Expr,
        /// Loop body
        body: Block,
    },
    /// `repeat ... until cond`
    Repeat {
        /// Loop body
        body: Block,
        /// Exit condition
        cond: Expr,
    },
    /// `if ... elseif ... else ... end`
    If {
        /// Conditional branches, first is the `if` clause
        clauses: Vec<IfClause>,
        /// `else` branch
        else_clause: Option<ElseClause>,
        /// Line of the closing `end`
        end_line: u32,
    },
    /// `for v = start, limit, step do ... end`
    NumericFor {
        /// Control variable
        var: String,
        /// Initial value
        start: Expr,
        /// Limit
        limit: Expr,
        /// Optional step
        step: Option<Expr>,
        /// Loop body
        body: Block,
    },
    /// `for k, v in explist do ... end`
    GenericFor {
        /// Loop variables
        names: Vec<String>,
        /// Iterator expressions
        exprs: Vec<Expr>,
        /// Loop body
        body: Block,
    },
    /// `function a.b:c() ... end`
    Function {
        /// Dotted path, first element is the base name
        path: Vec<String>,
        /// Method name after `:`
        method: Option<String>,
        /// Body
        body: FuncBody,
    },
    /// `local function f() ... end`
    LocalFunction {
        /// Function name
        name: String,
        /// Body
        body: FuncBody,
    },
    /// `::name::`
    Label(String),
    /// `goto name`
    Goto(String),
    /// `break`
    Break,
    /// Coverage probe inserted by the instrumenter
    Track(Probe),
}

/// One `if`/`elseif` branch
#[derive(Debug, Clone, PartialEq)]
pub struct IfClause {
    /// Branch condition
    pub cond: Expr,
    /// Branch body
    pub block: Block,
    /// Line of the `if`/`elseif` keyword
    pub line: u32,
}

/// Trailing `else` branch
#[derive(Debug, Clone, PartialEq)]
pub struct ElseClause {
    /// Branch body
    pub block: Block,
    /// Line of the `else` keyword
    pub line: u32,
}

/// Coverage probes injected into instrumented code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// Original line about to execute
    Line(u32),
    /// Function entered, by index in the file's function table
    Function(u32),
    /// Block entered, by index in the file's block table
    Block(u32),
}

/// Parameters and body of a function
#[derive(Debug, Clone, PartialEq)]
pub struct FuncBody {
    /// Named parameters
    pub params: Vec<String>,
    /// Whether the parameter list ends in `...`
    pub is_vararg: bool,
    /// Body statements
    pub block: Block,
    /// Line of the `function` keyword
    pub line: u32,
    /// Line of the closing `end`
    pub end_line: u32,
}

/// Table constructor field
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// `expr`
    Positional(Expr),
    /// `name = expr`
    Named(String, Expr),
    /// `[key] = expr`
    Keyed(Expr, Expr),
}

/// Binary operators
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    Lt,
    Gt,
    Le,
    Ge,
    Ne,
    Eq,
    BOr,
    BXor,
    BAnd,
    Shl,
    Shr,
    Concat,
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
    Pow,
}

impl BinOp {
    /// Operator for a symbol or keyword token
    #[must_use]
    pub fn from_token(text: &str) -> Option<Self> {
        Some(match text {
            "or" => Self::Or,
            "and" => Self::And,
            "<" => Self::Lt,
            ">" => Self::Gt,
            "<=" => Self::Le,
            ">=" => Self::Ge,
            "~=" => Self::Ne,
            "==" => Self::Eq,
            "|" => Self::BOr,
            "~" => Self::BXor,
            "&" => Self::BAnd,
            "<<" => Self::Shl,
            ">>" => Self::Shr,
            ".." => Self::Concat,
            "+" => Self::Add,
            "-" => Self::Sub,
            "*" => Self::Mul,
            "/" => Self::Div,
            "//" => Self::IDiv,
            "%" => Self::Mod,
            "^" => Self::Pow,
            _ => return None,
        })
    }

    /// Source text of the operator
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Or => "or",
            Self::And => "and",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::Ne => "~=",
            Self::Eq => "==",
            Self::BOr => "|",
            Self::BXor => "~",
            Self::BAnd => "&",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::Concat => "..",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::IDiv => "//",
            Self::Mod => "%",
            Self::Pow => "^",
        }
    }

    /// Left and right binding power, as in the reference Lua parser
    #[must_use]
    pub const fn priority(self) -> (u8, u8) {
        match self {
            Self::Or => (1, 1),
            Self::And => (2, 2),
            Self::Lt | Self::Gt | Self::Le | Self::Ge | Self::Ne | Self::Eq => (3, 3),
            Self::BOr => (4, 4),
            Self::BXor => (5, 5),
            Self::BAnd => (6, 6),
            Self::Shl | Self::Shr => (7, 7),
            Self::Concat => (9, 8),
            Self::Add | Self::Sub => (10, 10),
            Self::Mul | Self::Div | Self::IDiv | Self::Mod => (11, 11),
            Self::Pow => (14, 13),
        }
    }
}

/// Priority of unary operators
pub const UNARY_PRIORITY: u8 = 12;

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    /// `not`
    Not,
    /// `-`
    Neg,
    /// `#`
    Len,
    /// `~`
    BNot,
}

impl UnOp {
    /// Source text of the operator
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Not => "not ",
            Self::Neg => "-",
            Self::Len => "#",
            Self::BNot => "~",
        }
    }
}

/// Expressions
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Nil,
    True,
    False,
    /// `...`
    Vararg,
    /// Numeric literal, raw text
    Number(String),
    /// String literal, raw text including quotes or brackets
    Str(String),
    /// Anonymous function
    Function(Box<FuncBody>),
    /// Table constructor
    Table(Vec<Field>),
    /// Binary operation
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// Unary operation
    Unary(UnOp, Box<Expr>),
    /// Parenthesized expression (truncates multiple results)
    Paren(Box<Expr>),
    /// Variable reference
    Name(String),
    /// `obj[key]`
    Index(Box<Expr>, Box<Expr>),
    /// `obj.name`
    Member(Box<Expr>, String),
    /// `f(args)`
    Call(Box<Expr>, Vec<Expr>),
    /// `obj:name(args)`
    Method(Box<Expr>, String, Vec<Expr>),
}

/// Dotted name for an assignment target, if it has one (`a`, `a.b.c`)
#[must_use]
pub fn target_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Name(name) => Some(name.clone()),
        Expr::Member(obj, field) => target_name(obj).map(|base| format!("{base}.{field}")),
        _ => None,
    }
}

/// Name shown for functions with no inferable name
pub const ANONYMOUS: &str = "<anonymous>";

/// Assigns stable, unique keys to functions of one file in source order
///
/// Keys have the form `name:line`; repeats get a `#n` suffix.
#[derive(Debug, Default)]
pub struct FunctionKeys {
    seen: HashMap<String, usize>,
}

impl FunctionKeys {
    /// Create an empty key allocator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Key for the next function named `name` defined at `line`
    pub fn next(&mut self, name: &str, line: u32) -> String {
        let base = format!("{name}:{line}");
        let count = self.seen.entry(base.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            base
        } else {
            format!("{base}#{count}")
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_target_name_for_member_chain() {
        let expr = Expr::Member(
            Box::new(Expr::Member(Box::new(Expr::Name("M".into())), "util".into())),
            "run".into(),
        );
        assert_eq!(target_name(&expr).as_deref(), Some("M.util.run"));
        let indexed = Expr::Index(Box::new(Expr::Name("t".into())), Box::new(Expr::Nil));
        assert_eq!(target_name(&indexed), None);
    }

    #[test]
    fn test_function_keys_deduplicate() {
        let mut keys = FunctionKeys::new();
        assert_eq!(keys.next(ANONYMOUS, 3), "<anonymous>:3");
        assert_eq!(keys.next(ANONYMOUS, 3), "<anonymous>:3#2");
        assert_eq!(keys.next("f", 3), "f:3");
    }

    #[test]
    fn test_operator_priorities_match_lua() {
        assert!(BinOp::Mul.priority().0 > BinOp::Add.priority().0);
        assert!(BinOp::Pow.priority().0 > UNARY_PRIORITY);
        let (l, r) = BinOp::Concat.priority();
        assert!(l > r, "concat is right associative");
    }
}
