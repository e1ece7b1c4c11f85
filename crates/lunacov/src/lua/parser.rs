//! Recursive-descent parser for Lua 5.4

use super::ast::{
    BinOp, Block, Chunk, ElseClause, Expr, Field, FuncBody, IfClause, Return, Stat, StatKind, UnOp,
    UNARY_PRIORITY,
};
use super::lexer::{count_lines, tokenize, Token, TokenKind};
use super::ParseError;

/// Deepest statement or expression nesting accepted, as in the reference
/// interpreter's `LUAI_MAXCCALLS`
const MAX_DEPTH: usize = 200;

/// Parse a chunk of Lua source
pub fn parse_chunk(source: &str) -> Result<Chunk, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let block = parser.block()?;
    let tok = parser.peek();
    if tok.kind != TokenKind::Eof {
        return Err(ParseError::new(
            tok.line,
            format!("'<eof>' expected near '{}'", tok.text),
        ));
    }
    let line_count = count_lines(source).max(1);
    Ok(Chunk { block, line_count })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if tok.kind != TokenKind::Eof {
            self.pos += 1;
        }
        tok
    }

    fn check_symbol(&self, sym: &str) -> bool {
        self.peek().is_symbol(sym)
    }

    fn check_keyword(&self, kw: &str) -> bool {
        self.peek().is_keyword(kw)
    }

    fn eat_symbol(&mut self, sym: &str) -> bool {
        if self.check_symbol(sym) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let tok = self.peek();
        let near = if tok.kind == TokenKind::Eof {
            "<eof>"
        } else {
            tok.text.as_str()
        };
        ParseError::new(tok.line, format!("{expected} expected near '{near}'"))
    }

    fn expect_symbol(&mut self, sym: &str) -> Result<(), ParseError> {
        if self.eat_symbol(sym) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{sym}'")))
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<u32, ParseError> {
        if self.check_keyword(kw) {
            Ok(self.advance().line)
        } else {
            Err(self.unexpected(&format!("'{kw}'")))
        }
    }

    fn expect_name(&mut self) -> Result<String, ParseError> {
        if self.peek().kind == TokenKind::Name {
            Ok(self.advance().text)
        } else {
            Err(self.unexpected("<name>"))
        }
    }

    fn block_follows(&self) -> bool {
        let tok = self.peek();
        tok.kind == TokenKind::Eof
            || ["end", "else", "elseif", "until"]
                .iter()
                .any(|kw| tok.is_keyword(kw))
    }

    /// Run `parse` one nesting level deeper
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T, ParseError>) -> Result<T, ParseError> {
        if self.depth >= MAX_DEPTH {
            return Err(ParseError::new(
                self.peek().line,
                format!("chunk has too many syntax levels (limit is {MAX_DEPTH})"),
            ));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn block(&mut self) -> Result<Block, ParseError> {
        let mut block = Block::default();
        loop {
            if self.block_follows() {
                return Ok(block);
            }
            if self.check_keyword("return") {
                let line = self.advance().line;
                let exprs = if self.block_follows() || self.check_symbol(";") {
                    Vec::new()
                } else {
                    self.expr_list()?
                };
                let _ = self.eat_symbol(";");
                block.ret = Some(Return { exprs, line });
                if !self.block_follows() {
                    return Err(self.unexpected("'end'"));
                }
                return Ok(block);
            }
            block.stats.push(self.statement()?);
        }
    }

    fn statement(&mut self) -> Result<Stat, ParseError> {
        self.nested(Self::statement_at_level)
    }

    fn statement_at_level(&mut self) -> Result<Stat, ParseError> {
        let line = self.peek().line;
        let tok = self.peek().clone();

        let kind = if tok.is_symbol(";") {
            self.pos += 1;
            StatKind::Empty
        } else if tok.is_symbol("::") {
            self.pos += 1;
            let name = self.expect_name()?;
            self.expect_symbol("::")?;
            StatKind::Label(name)
        } else if tok.kind == TokenKind::Keyword {
            match tok.text.as_str() {
                "break" => {
                    self.pos += 1;
                    StatKind::Break
                }
                "goto" => {
                    self.pos += 1;
                    StatKind::Goto(self.expect_name()?)
                }
                "do" => {
                    self.pos += 1;
                    let body = self.block()?;
                    let _ = self.expect_keyword("end")?;
                    StatKind::Do(body)
                }
                "while" => {
                    self.pos += 1;
                    let cond = self.expr()?;
                    let _ = self.expect_keyword("do")?;
                    let body = self.block()?;
                    let _ = self.expect_keyword("end")?;
                    StatKind::While { cond, body }
                }
                "repeat" => {
                    self.pos += 1;
                    let body = self.block()?;
                    let _ = self.expect_keyword("until")?;
                    let cond = self.expr()?;
                    StatKind::Repeat { body, cond }
                }
                "if" => self.if_statement()?,
                "for" => self.for_statement()?,
                "function" => {
                    self.pos += 1;
                    let mut path = vec![self.expect_name()?];
                    while self.eat_symbol(".") {
                        path.push(self.expect_name()?);
                    }
                    let method = if self.eat_symbol(":") {
                        Some(self.expect_name()?)
                    } else {
                        None
                    };
                    let body = self.func_body(line)?;
                    StatKind::Function { path, method, body }
                }
                "local" => {
                    self.pos += 1;
                    if self.check_keyword("function") {
                        let fn_line = self.advance().line;
                        let name = self.expect_name()?;
                        let body = self.func_body(fn_line)?;
                        StatKind::LocalFunction { name, body }
                    } else {
                        self.local_statement()?
                    }
                }
                _ => self.expr_statement()?,
            }
        } else {
            self.expr_statement()?
        };

        Ok(Stat { kind, line })
    }

    fn if_clause(&mut self, keyword: &str) -> Result<IfClause, ParseError> {
        let line = self.expect_keyword(keyword)?;
        let cond = self.expr()?;
        let _ = self.expect_keyword("then")?;
        let block = self.block()?;
        Ok(IfClause { cond, block, line })
    }

    fn if_statement(&mut self) -> Result<StatKind, ParseError> {
        let mut clauses = vec![self.if_clause("if")?];
        while self.check_keyword("elseif") {
            clauses.push(self.if_clause("elseif")?);
        }
        let else_clause = if self.check_keyword("else") {
            let line = self.advance().line;
            let block = self.block()?;
            Some(ElseClause { block, line })
        } else {
            None
        };
        let end_line = self.expect_keyword("end")?;
        Ok(StatKind::If {
            clauses,
            else_clause,
            end_line,
        })
    }

    fn for_statement(&mut self) -> Result<StatKind, ParseError> {
        let _ = self.expect_keyword("for")?;
        let first = self.expect_name()?;
        if self.eat_symbol("=") {
            let start = self.expr()?;
            self.expect_symbol(",")?;
            let limit = self.expr()?;
            let step = if self.eat_symbol(",") {
                Some(self.expr()?)
            } else {
                None
            };
            let _ = self.expect_keyword("do")?;
            let body = self.block()?;
            let _ = self.expect_keyword("end")?;
            return Ok(StatKind::NumericFor {
                var: first,
                start,
                limit,
                step,
                body,
            });
        }
        let mut names = vec![first];
        while self.eat_symbol(",") {
            names.push(self.expect_name()?);
        }
        let _ = self.expect_keyword("in")?;
        let exprs = self.expr_list()?;
        let _ = self.expect_keyword("do")?;
        let body = self.block()?;
        let _ = self.expect_keyword("end")?;
        Ok(StatKind::GenericFor { names, exprs, body })
    }

    fn local_statement(&mut self) -> Result<StatKind, ParseError> {
        let mut names = Vec::new();
        loop {
            let name = self.expect_name()?;
            let attrib = if self.eat_symbol("<") {
                let attr = self.expect_name()?;
                if attr != "const" && attr != "close" {
                    return Err(ParseError::new(
                        self.peek().line,
                        format!("unknown attribute '{attr}'"),
                    ));
                }
                self.expect_symbol(">")?;
                Some(attr)
            } else {
                None
            };
            names.push((name, attrib));
            if !self.eat_symbol(",") {
                break;
            }
        }
        let exprs = if self.eat_symbol("=") {
            self.expr_list()?
        } else {
            Vec::new()
        };
        Ok(StatKind::Local { names, exprs })
    }

    fn expr_statement(&mut self) -> Result<StatKind, ParseError> {
        let first = self.suffixed_expr()?;
        if self.check_symbol("=") || self.check_symbol(",") {
            let mut targets = vec![first];
            while self.eat_symbol(",") {
                targets.push(self.suffixed_expr()?);
            }
            for target in &targets {
                if !matches!(target, Expr::Name(_) | Expr::Index(..) | Expr::Member(..)) {
                    return Err(ParseError::new(
                        self.peek().line,
                        "syntax error: cannot assign to this expression",
                    ));
                }
            }
            self.expect_symbol("=")?;
            let exprs = self.expr_list()?;
            return Ok(StatKind::Assign { targets, exprs });
        }
        if matches!(first, Expr::Call(..) | Expr::Method(..)) {
            Ok(StatKind::Call(first))
        } else {
            Err(self.unexpected("'='"))
        }
    }

    fn func_body(&mut self, line: u32) -> Result<FuncBody, ParseError> {
        self.expect_symbol("(")?;
        let mut params = Vec::new();
        let mut is_vararg = false;
        if !self.check_symbol(")") {
            loop {
                if self.eat_symbol("...") {
                    is_vararg = true;
                    break;
                }
                params.push(self.expect_name()?);
                if !self.eat_symbol(",") {
                    break;
                }
            }
        }
        self.expect_symbol(")")?;
        let block = self.block()?;
        let end_line = self.expect_keyword("end")?;
        Ok(FuncBody {
            params,
            is_vararg,
            block,
            line,
            end_line,
        })
    }

    fn expr_list(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut exprs = vec![self.expr()?];
        while self.eat_symbol(",") {
            exprs.push(self.expr()?);
        }
        Ok(exprs)
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        self.sub_expr(0)
    }

    fn unary_op(&self) -> Option<UnOp> {
        let tok = self.peek();
        if tok.is_keyword("not") {
            Some(UnOp::Not)
        } else if tok.is_symbol("-") {
            Some(UnOp::Neg)
        } else if tok.is_symbol("#") {
            Some(UnOp::Len)
        } else if tok.is_symbol("~") {
            Some(UnOp::BNot)
        } else {
            None
        }
    }

    fn binary_op(&self) -> Option<BinOp> {
        let tok = self.peek();
        match tok.kind {
            TokenKind::Symbol | TokenKind::Keyword => BinOp::from_token(&tok.text),
            _ => None,
        }
    }

    fn sub_expr(&mut self, limit: u8) -> Result<Expr, ParseError> {
        self.nested(|p| p.sub_expr_at_level(limit))
    }

    fn sub_expr_at_level(&mut self, limit: u8) -> Result<Expr, ParseError> {
        let mut lhs = if let Some(op) = self.unary_op() {
            self.pos += 1;
            let operand = self.sub_expr(UNARY_PRIORITY)?;
            Expr::Unary(op, Box::new(operand))
        } else {
            self.simple_expr()?
        };
        while let Some(op) = self.binary_op() {
            let (left, right) = op.priority();
            if left <= limit {
                break;
            }
            self.pos += 1;
            let rhs = self.sub_expr(right)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn simple_expr(&mut self) -> Result<Expr, ParseError> {
        let tok = self.peek().clone();
        let expr = match tok.kind {
            TokenKind::Number => Expr::Number(tok.text),
            TokenKind::Str => Expr::Str(tok.text),
            TokenKind::Keyword => match tok.text.as_str() {
                "nil" => Expr::Nil,
                "true" => Expr::True,
                "false" => Expr::False,
                "function" => {
                    self.pos += 1;
                    return Ok(Expr::Function(Box::new(self.func_body(tok.line)?)));
                }
                _ => return Err(self.unexpected("expression")),
            },
            TokenKind::Symbol if tok.text == "..." => Expr::Vararg,
            TokenKind::Symbol if tok.text == "{" => return self.table(),
            _ => return self.suffixed_expr(),
        };
        self.pos += 1;
        Ok(expr)
    }

    fn primary_expr(&mut self) -> Result<Expr, ParseError> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Name => {
                self.pos += 1;
                Ok(Expr::Name(tok.text))
            }
            TokenKind::Symbol if tok.text == "(" => {
                self.pos += 1;
                let inner = self.expr()?;
                self.expect_symbol(")")?;
                Ok(Expr::Paren(Box::new(inner)))
            }
            _ => {
                let near = if tok.kind == TokenKind::Eof {
                    "<eof>".to_string()
                } else {
                    tok.text
                };
                Err(ParseError::new(
                    tok.line,
                    format!("unexpected symbol near '{near}'"),
                ))
            }
        }
    }

    fn suffixed_expr(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary_expr()?;
        loop {
            let tok = self.peek().clone();
            match tok.kind {
                TokenKind::Symbol => match tok.text.as_str() {
                    "." => {
                        self.pos += 1;
                        let name = self.expect_name()?;
                        expr = Expr::Member(Box::new(expr), name);
                    }
                    "[" => {
                        self.pos += 1;
                        let key = self.expr()?;
                        self.expect_symbol("]")?;
                        expr = Expr::Index(Box::new(expr), Box::new(key));
                    }
                    ":" => {
                        self.pos += 1;
                        let name = self.expect_name()?;
                        let args = self.call_args()?;
                        expr = Expr::Method(Box::new(expr), name, args);
                    }
                    "(" | "{" => {
                        let args = self.call_args()?;
                        expr = Expr::Call(Box::new(expr), args);
                    }
                    _ => return Ok(expr),
                },
                TokenKind::Str => {
                    let args = self.call_args()?;
                    expr = Expr::Call(Box::new(expr), args);
                }
                _ => return Ok(expr),
            }
        }
    }

    fn call_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        let tok = self.peek().clone();
        if tok.kind == TokenKind::Str {
            self.pos += 1;
            return Ok(vec![Expr::Str(tok.text)]);
        }
        if tok.is_symbol("{") {
            return Ok(vec![self.table()?]);
        }
        self.expect_symbol("(")?;
        if self.eat_symbol(")") {
            return Ok(Vec::new());
        }
        let args = self.expr_list()?;
        self.expect_symbol(")")?;
        Ok(args)
    }

    fn table(&mut self) -> Result<Expr, ParseError> {
        self.expect_symbol("{")?;
        let mut fields = Vec::new();
        while !self.check_symbol("}") {
            if self.eat_symbol("[") {
                let key = self.expr()?;
                self.expect_symbol("]")?;
                self.expect_symbol("=")?;
                fields.push(Field::Keyed(key, self.expr()?));
            } else if self.peek().kind == TokenKind::Name && self.peek_at(1).is_symbol("=") {
                let name = self.advance().text;
                self.pos += 1;
                fields.push(Field::Named(name, self.expr()?));
            } else {
                fields.push(Field::Positional(self.expr()?));
            }
            if !self.eat_symbol(",") && !self.eat_symbol(";") {
                break;
            }
        }
        self.expect_symbol("}")?;
        Ok(Expr::Table(fields))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn stats(src: &str) -> Vec<Stat> {
        parse_chunk(src).unwrap().block.stats
    }

    #[test]
    fn test_local_and_assignment() {
        let s = stats("local a, b <const> = 1, 2\nx.y, z[1] = a, b");
        assert_eq!(s.len(), 2);
        match &s[0].kind {
            StatKind::Local { names, exprs } => {
                assert_eq!(names[1], ("b".to_string(), Some("const".to_string())));
                assert_eq!(exprs.len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(s[1].line, 2);
        assert!(matches!(&s[1].kind, StatKind::Assign { targets, .. } if targets.len() == 2));
    }

    #[test]
    fn test_precedence() {
        let s = stats("x = 1 + 2 * 3 ^ -2 .. 'a' .. 'b'");
        let StatKind::Assign { exprs, .. } = &s[0].kind else {
            panic!("expected assignment");
        };
        // concat binds loosest and is right associative
        let Expr::Binary(BinOp::Concat, lhs, rhs) = &exprs[0] else {
            panic!("expected concat at the root");
        };
        assert!(matches!(**lhs, Expr::Binary(BinOp::Add, ..)));
        assert!(matches!(**rhs, Expr::Binary(BinOp::Concat, ..)));
    }

    #[test]
    fn test_unary_binds_looser_than_pow() {
        let s = stats("x = -a ^ 2");
        let StatKind::Assign { exprs, .. } = &s[0].kind else {
            panic!("expected assignment");
        };
        assert!(matches!(&exprs[0], Expr::Unary(UnOp::Neg, inner) if matches!(**inner, Expr::Binary(BinOp::Pow, ..))));
    }

    #[test]
    fn test_control_flow_statements() {
        let src = "if a then b() elseif c then d() else e() end\n\
                   while x do break end\n\
                   repeat local y = 1 until y\n\
                   for i = 1, 10, 2 do end\n\
                   for k, v in pairs(t) do goto done end\n\
                   ::done::\n\
                   do end";
        let s = stats(src);
        assert!(matches!(&s[0].kind, StatKind::If { clauses, else_clause: Some(e), end_line: 1 } if clauses.len() == 2 && e.line == 1));
        assert!(matches!(s[1].kind, StatKind::While { .. }));
        assert!(matches!(s[2].kind, StatKind::Repeat { .. }));
        assert!(matches!(s[3].kind, StatKind::NumericFor { step: Some(_), .. }));
        assert!(matches!(&s[4].kind, StatKind::GenericFor { names, .. } if names.len() == 2));
        assert_eq!(s[5].kind, StatKind::Label("done".to_string()));
        assert!(matches!(s[6].kind, StatKind::Do(_)));
    }

    #[test]
    fn test_functions_and_methods() {
        let src = "function M.util:run(a, ...)\n  return a\nend\nlocal function f() end\nobj:method 'x'\nf{1, 2; k = 3, [4] = 5}";
        let s = stats(src);
        match &s[0].kind {
            StatKind::Function { path, method, body } => {
                assert_eq!(path, &vec!["M".to_string(), "util".to_string()]);
                assert_eq!(method.as_deref(), Some("run"));
                assert!(body.is_vararg);
                assert_eq!(body.line, 1);
                assert_eq!(body.end_line, 3);
                assert_eq!(body.block.ret.as_ref().unwrap().line, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(s[1].kind, StatKind::LocalFunction { .. }));
        assert!(matches!(&s[2].kind, StatKind::Call(Expr::Method(_, name, args)) if name == "method" && args.len() == 1));
        let StatKind::Call(Expr::Call(_, args)) = &s[3].kind else {
            panic!("expected call");
        };
        assert!(matches!(&args[0], Expr::Table(fields) if fields.len() == 4));
    }

    #[test]
    fn test_return_must_end_block() {
        let err = parse_chunk("return 1\nx = 2").unwrap_err();
        assert!(err.message.contains("expected"));
    }

    #[test]
    fn test_non_call_expression_statement_is_error() {
        let err = parse_chunk("x + 1").unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_deep_nesting_is_limited() {
        let parens = |n: usize| format!("return {}1{}", "(".repeat(n), ")".repeat(n));
        assert!(parse_chunk(&parens(100)).is_ok());
        let err = parse_chunk(&parens(300)).unwrap_err();
        assert!(err.message.contains("too many syntax levels"), "{}", err.message);

        let blocks = format!("{}x = 1{}", "do ".repeat(250), " end".repeat(250));
        let err = parse_chunk(&blocks).unwrap_err();
        assert!(err.message.contains("limit is 200"), "{}", err.message);
    }

    #[test]
    fn test_missing_end_reports_eof() {
        let err = parse_chunk("function f()\n  return 1\n").unwrap_err();
        assert!(err.message.contains("'end' expected"));
    }
}
