//! Source generation for instrumented chunks
//!
//! Emits one statement per line and records, for every generated line, the
//! original line it came from. Probe lines and the binding header have no
//! origin.

use crate::lua::ast::{Block, Chunk, Expr, Field, FuncBody, Probe, Stat, StatKind};
use crate::lua::split_lines;

use super::{lua_quote, BLOCK_PROBE, FUNCTION_PROBE, LINE_PROBE, RUNTIME_GLOBAL};

const INDENT: &str = "  ";

/// Generated Lua source plus per-line origins
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    /// Instrumented source text
    pub source: String,
    /// `line_origins[i]` is the original line of generated line `i + 1`
    pub line_origins: Vec<Option<u32>>,
}

/// Render an instrumented chunk as Lua source
///
/// The first line binds the probe locals for `path`.
#[must_use]
pub fn generate(chunk: &Chunk, path: &str) -> Generated {
    let mut emitter = Emitter::default();
    emitter.begin(None);
    emitter.push(&format!(
        "local {LINE_PROBE}, {FUNCTION_PROBE}, {BLOCK_PROBE} = {RUNTIME_GLOBAL}.bind({})",
        lua_quote(path)
    ));
    emitter.finish();
    emitter.block(&chunk.block);

    let mut source = String::new();
    let mut line_origins = Vec::with_capacity(emitter.lines.len());
    for (text, origin) in emitter.lines {
        source.push_str(&text);
        source.push('\n');
        line_origins.push(origin);
    }
    Generated {
        source,
        line_origins,
    }
}

#[derive(Default)]
struct Emitter {
    lines: Vec<(String, Option<u32>)>,
    current: String,
    origin: Option<u32>,
    indent: usize,
}

/// Whether the leftmost token of a statement would be `(`
fn starts_with_paren(expr: &Expr) -> bool {
    match expr {
        Expr::Paren(_) => true,
        Expr::Call(obj, _) | Expr::Method(obj, _, _) | Expr::Index(obj, _) | Expr::Member(obj, _) => {
            starts_with_paren(obj)
        }
        _ => false,
    }
}

impl Emitter {
    fn begin(&mut self, origin: Option<u32>) {
        self.current = INDENT.repeat(self.indent);
        self.origin = origin;
    }

    fn push(&mut self, text: &str) {
        self.current.push_str(text);
    }

    /// Close the current line; line breaks embedded in string tokens keep
    /// the same origin
    fn finish(&mut self) {
        let text = std::mem::take(&mut self.current);
        for part in split_lines(&text) {
            self.lines.push((part.to_string(), self.origin));
        }
    }

    fn line(&mut self, text: &str, origin: Option<u32>) {
        self.begin(origin);
        self.push(text);
        self.finish();
    }

    fn nested(&mut self, block: &Block) {
        self.indent += 1;
        self.block(block);
        self.indent -= 1;
    }

    fn block(&mut self, block: &Block) {
        for stat in &block.stats {
            self.stat(stat);
        }
        if let Some(ret) = &block.ret {
            self.begin(Some(ret.line));
            self.push("return");
            if !ret.exprs.is_empty() {
                self.push(" ");
                self.expr_list(&ret.exprs);
            }
            self.finish();
        }
    }

    fn stat(&mut self, stat: &Stat) {
        let line = Some(stat.line);
        match &stat.kind {
            StatKind::Empty => {}
            StatKind::Track(probe) => {
                let text = match probe {
                    Probe::Line(n) => format!("{LINE_PROBE}({n})"),
                    Probe::Function(i) => format!("{FUNCTION_PROBE}({i})"),
                    Probe::Block(i) => format!("{BLOCK_PROBE}({i})"),
                };
                self.line(&text, None);
            }
            StatKind::Local { names, exprs } => {
                self.begin(line);
                self.push("local ");
                let names: Vec<String> = names
                    .iter()
                    .map(|(name, attrib)| match attrib {
                        Some(a) => format!("{name} <{a}>"),
                        None => name.clone(),
                    })
                    .collect();
                self.push(&names.join(", "));
                if !exprs.is_empty() {
                    self.push(" = ");
                    self.expr_list(exprs);
                }
                self.finish();
            }
            StatKind::Assign { targets, exprs } => {
                self.begin(line);
                if targets.first().is_some_and(starts_with_paren) {
                    self.push(";");
                }
                self.expr_list(targets);
                self.push(" = ");
                self.expr_list(exprs);
                self.finish();
            }
            StatKind::Call(expr) => {
                self.begin(line);
                if starts_with_paren(expr) {
                    self.push(";");
                }
                self.expr(expr);
                self.finish();
            }
            StatKind::Do(body) => {
                self.line("do", line);
                self.nested(body);
                self.line("end", line);
            }
            StatKind::While { cond, body } => {
                self.begin(line);
                self.push("while ");
                self.expr(cond);
                self.push(" do");
                self.finish();
                self.nested(body);
                self.line("end", line);
            }
            StatKind::Repeat { body, cond } => {
                self.line("repeat", line);
                self.nested(body);
                self.begin(line);
                self.push("until ");
                self.expr(cond);
                self.finish();
            }
            StatKind::If {
                clauses,
                else_clause,
                end_line,
            } => {
                for (i, clause) in clauses.iter().enumerate() {
                    self.begin(Some(clause.line));
                    self.push(if i == 0 { "if " } else { "elseif " });
                    self.expr(&clause.cond);
                    self.push(" then");
                    self.finish();
                    self.nested(&clause.block);
                }
                if let Some(e) = else_clause {
                    self.line("else", Some(e.line));
                    self.nested(&e.block);
                }
                self.line("end", Some(*end_line));
            }
            StatKind::NumericFor {
                var,
                start,
                limit,
                step,
                body,
            } => {
                self.begin(line);
                self.push(&format!("for {var} = "));
                self.expr(start);
                self.push(", ");
                self.expr(limit);
                if let Some(step) = step {
                    self.push(", ");
                    self.expr(step);
                }
                self.push(" do");
                self.finish();
                self.nested(body);
                self.line("end", line);
            }
            StatKind::GenericFor { names, exprs, body } => {
                self.begin(line);
                self.push(&format!("for {} in ", names.join(", ")));
                self.expr_list(exprs);
                self.push(" do");
                self.finish();
                self.nested(body);
                self.line("end", line);
            }
            StatKind::Function { path, method, body } => {
                self.begin(line);
                self.push("function ");
                self.push(&path.join("."));
                if let Some(m) = method {
                    self.push(":");
                    self.push(m);
                }
                self.func_body(body);
                self.finish();
            }
            StatKind::LocalFunction { name, body } => {
                self.begin(line);
                self.push("local function ");
                self.push(name);
                self.func_body(body);
                self.finish();
            }
            StatKind::Label(name) => self.line(&format!("::{name}::"), line),
            StatKind::Goto(name) => self.line(&format!("goto {name}"), line),
            StatKind::Break => self.line("break", line),
        }
    }

    /// Emit `(params)`, the body, and `end`; leaves the `end` line open
    fn func_body(&mut self, body: &FuncBody) {
        let mut params = body.params.clone();
        if body.is_vararg {
            params.push("...".to_string());
        }
        self.push(&format!("({})", params.join(", ")));
        self.finish();
        self.nested(&body.block);
        self.begin(Some(body.end_line));
        self.push("end");
    }

    fn expr_list(&mut self, exprs: &[Expr]) {
        for (i, e) in exprs.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.expr(e);
        }
    }

    fn operand(&mut self, expr: &Expr) {
        if matches!(expr, Expr::Binary(..) | Expr::Unary(..)) {
            self.push("(");
            self.expr(expr);
            self.push(")");
        } else {
            self.expr(expr);
        }
    }

    fn key(&mut self, key: &Expr) {
        if matches!(key, Expr::Str(s) if s.starts_with('[')) {
            self.push("[ ");
            self.expr(key);
            self.push(" ]");
        } else {
            self.push("[");
            self.expr(key);
            self.push("]");
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Nil => self.push("nil"),
            Expr::True => self.push("true"),
            Expr::False => self.push("false"),
            Expr::Vararg => self.push("..."),
            Expr::Number(raw) | Expr::Str(raw) | Expr::Name(raw) => self.push(raw),
            Expr::Function(body) => {
                self.push("function");
                self.func_body(body);
            }
            Expr::Table(fields) => {
                self.push("{");
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    match field {
                        Field::Positional(e) => self.expr(e),
                        Field::Named(name, e) => {
                            self.push(name);
                            self.push(" = ");
                            self.expr(e);
                        }
                        Field::Keyed(k, v) => {
                            self.key(k);
                            self.push(" = ");
                            self.expr(v);
                        }
                    }
                }
                self.push("}");
            }
            Expr::Binary(op, l, r) => {
                self.operand(l);
                self.push(" ");
                self.push(op.as_str());
                self.push(" ");
                self.operand(r);
            }
            Expr::Unary(op, e) => {
                self.push(op.as_str());
                self.operand(e);
            }
            Expr::Paren(e) => {
                self.push("(");
                self.expr(e);
                self.push(")");
            }
            Expr::Index(obj, key) => {
                self.expr(obj);
                self.key(key);
            }
            Expr::Member(obj, name) => {
                self.expr(obj);
                self.push(".");
                self.push(name);
            }
            Expr::Call(func, args) => {
                self.expr(func);
                self.push("(");
                self.expr_list(args);
                self.push(")");
            }
            Expr::Method(obj, name, args) => {
                self.expr(obj);
                self.push(":");
                self.push(name);
                self.push("(");
                self.expr_list(args);
                self.push(")");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::instrument::transformer::transform;
    use crate::instrument::HEADER_LOCALS;
    use crate::lua::parse;

    fn plain(src: &str) -> Generated {
        generate(&parse(src, "p.lua").unwrap(), "p.lua")
    }

    fn instrumented(src: &str) -> Generated {
        let chunk = parse(src, "p.lua").unwrap();
        let t = transform(&chunk, "p.lua", HEADER_LOCALS).unwrap();
        generate(&t.chunk, "p.lua")
    }

    #[test]
    fn test_header_binds_probes() {
        let g = plain("");
        assert_eq!(
            g.source,
            "local __lunacov_l, __lunacov_f, __lunacov_b = __lunacov.bind(\"p.lua\")\n"
        );
        assert_eq!(g.line_origins, vec![None]);
    }

    #[test]
    fn test_probe_lines_have_no_origin() {
        let g = instrumented("local x = 1\nreturn x");
        let lines: Vec<&str> = g.source.lines().collect();
        assert_eq!(lines[1], "__lunacov_l(1)");
        assert_eq!(lines[2], "local x = 1");
        assert_eq!(lines[3], "__lunacov_l(2)");
        assert_eq!(lines[4], "return x");
        assert_eq!(g.line_origins, vec![None, None, Some(1), None, Some(2)]);
    }

    #[test]
    fn test_function_end_maps_to_end_line() {
        let g = plain("local function f(a, ...)\n  return a\nend");
        let lines: Vec<&str> = g.source.lines().collect();
        assert_eq!(lines[1], "local function f(a, ...)");
        assert_eq!(lines[2], "  return a");
        assert_eq!(lines[3], "end");
        assert_eq!(g.line_origins[1..], [Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn test_nested_operators_are_parenthesized() {
        let g = plain("x = -a ^ 2 + b * c .. d");
        assert!(g.source.contains("x = ((-(a ^ 2)) + (b * c)) .. d"), "{}", g.source);
    }

    #[test]
    fn test_paren_statement_gets_separator() {
        let g = plain("local f = print;\n(f)('x')");
        assert!(g.source.contains(";(f)('x')"));
    }

    #[test]
    fn test_long_string_keeps_origin_for_every_line() {
        let g = plain("s = [[a\nb]]\nt = 1");
        assert_eq!(g.line_origins, vec![None, Some(1), Some(1), Some(3)]);
    }

    #[test]
    fn test_long_string_index_key_is_spaced() {
        let g = plain("t[ [[k]] ] = { [ [[j]] ] = 1 }");
        assert!(g.source.contains("t[ [[k]] ] = {[ [[j]] ] = 1}"), "{}", g.source);
    }

    #[test]
    fn test_control_flow_closing_lines() {
        let src = "if a then\n  x()\nelseif b then\n  y()\nelse\n  z()\nend";
        let g = plain(src);
        let lines: Vec<&str> = g.source.lines().collect();
        assert_eq!(lines[1..], ["if a then", "  x()", "elseif b then", "  y()", "else", "  z()", "end"]);
        assert_eq!(
            g.line_origins[1..],
            [Some(1), Some(2), Some(3), Some(4), Some(5), Some(6), Some(7)]
        );
    }
}
