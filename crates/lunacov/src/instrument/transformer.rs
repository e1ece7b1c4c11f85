//! Probe insertion
//!
//! Walks a parsed chunk depth-first and returns a new chunk with
//! [`Probe`] statements in front of every executable statement and at the
//! entry of every function body, conditional branch and loop body. The
//! input chunk is left untouched.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::lua::ast::{
    target_name, Block, Chunk, ElseClause, Expr, Field, FuncBody, FunctionKeys, IfClause, Probe, Return,
    Stat, StatKind, ANONYMOUS,
};
use crate::result::{CoverageError, CoverageResult};

/// Lua refuses more than 200 active locals per function
const MAX_LOCALS: usize = 200;

/// Kind of code block tracked for block coverage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    /// Body of a function
    FunctionBody,
    /// `if` or `elseif` branch
    IfBranch,
    /// `else` branch
    ElseBranch,
    /// Body of a `while`, `repeat` or `for` loop
    LoopBody,
}

/// A function discovered during instrumentation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionInfo {
    /// Unique key within the file (`name:line`)
    pub key: String,
    /// Inferred name
    pub name: String,
    /// Line of the `function` keyword
    pub line: u32,
    /// Index of the function's body block
    pub block: u32,
}

/// A block discovered during instrumentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// What kind of block this is
    pub kind: BlockKind,
    /// Line where the block starts
    pub line: u32,
}

/// Static shape of an instrumented file
///
/// Probe indices refer into `functions` and `blocks`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentationLayout {
    /// Lines with at least one probe
    pub executable_lines: BTreeSet<u32>,
    /// Functions in source order
    pub functions: Vec<FunctionInfo>,
    /// Blocks in source order
    pub blocks: Vec<BlockInfo>,
    /// Lines in the original source
    pub line_count: u32,
}

/// Result of [`transform`]
#[derive(Debug, Clone)]
pub struct Transformed {
    /// Chunk with probes inserted
    pub chunk: Chunk,
    /// Lines, functions and blocks the probes refer to
    pub layout: InstrumentationLayout,
}

/// Insert coverage probes into a chunk
///
/// `reserved_locals` is the number of top-level locals the caller will add
/// in front of the generated code.
///
/// # Errors
///
/// Returns [`CoverageError::Transform`] if the chunk cannot take the extra
/// locals the probes need.
pub fn transform(chunk: &Chunk, path: &str, reserved_locals: usize) -> CoverageResult<Transformed> {
    let top_level = top_level_locals(&chunk.block);
    if top_level + reserved_locals > MAX_LOCALS {
        return Err(CoverageError::Transform {
            path: path.to_string(),
            message: format!(
                "main chunk declares {top_level} locals; probes need {reserved_locals} more (limit {MAX_LOCALS})"
            ),
        });
    }

    let mut walker = Transformer {
        layout: InstrumentationLayout {
            line_count: chunk.line_count,
            ..InstrumentationLayout::default()
        },
        keys: FunctionKeys::new(),
    };
    let block = walker.block(&chunk.block, None);
    Ok(Transformed {
        chunk: Chunk {
            block,
            line_count: chunk.line_count,
        },
        layout: walker.layout,
    })
}

fn top_level_locals(block: &Block) -> usize {
    block
        .stats
        .iter()
        .map(|stat| match &stat.kind {
            StatKind::Local { names, .. } => names.len(),
            StatKind::LocalFunction { .. } => 1,
            _ => 0,
        })
        .sum()
}

/// Whether a statement gets a line probe
pub(crate) const fn is_executable(kind: &StatKind) -> bool {
    !matches!(
        kind,
        StatKind::Empty | StatKind::Label(_) | StatKind::Track(_)
    )
}

struct Transformer {
    layout: InstrumentationLayout,
    keys: FunctionKeys,
}

fn probe(p: Probe, line: u32) -> Stat {
    Stat {
        kind: StatKind::Track(p),
        line,
    }
}

impl Transformer {
    fn new_block(&mut self, kind: BlockKind, line: u32) -> u32 {
        self.layout.blocks.push(BlockInfo { kind, line });
        (self.layout.blocks.len() - 1) as u32
    }

    /// Rebuild a block with an optional entry probe
    fn block(&mut self, block: &Block, entry: Option<(Probe, u32)>) -> Block {
        let mut out = Block::default();
        if let Some((p, line)) = entry {
            out.stats.push(probe(p, line));
        }

        // one line probe per line per block
        let mut probed: HashSet<u32> = HashSet::new();
        for stat in &block.stats {
            if is_executable(&stat.kind) && probed.insert(stat.line) {
                let _ = self.layout.executable_lines.insert(stat.line);
                out.stats.push(probe(Probe::Line(stat.line), stat.line));
            }
            out.stats.push(Stat {
                kind: self.stat(&stat.kind, stat.line),
                line: stat.line,
            });
        }

        if let Some(ret) = &block.ret {
            if probed.insert(ret.line) {
                let _ = self.layout.executable_lines.insert(ret.line);
                out.stats.push(probe(Probe::Line(ret.line), ret.line));
            }
            out.ret = Some(Return {
                exprs: self.exprs(&ret.exprs),
                line: ret.line,
            });
        }
        out
    }

    fn tracked_block(&mut self, block: &Block, kind: BlockKind, line: u32) -> Block {
        let id = self.new_block(kind, line);
        self.block(block, Some((Probe::Block(id), line)))
    }

    fn function(&mut self, body: &FuncBody, name: &str) -> FuncBody {
        let key = self.keys.next(name, body.line);
        let block = self.new_block(BlockKind::FunctionBody, body.line);
        self.layout.functions.push(FunctionInfo {
            key,
            name: name.to_string(),
            line: body.line,
            block,
        });
        let id = (self.layout.functions.len() - 1) as u32;
        FuncBody {
            params: body.params.clone(),
            is_vararg: body.is_vararg,
            block: self.block(&body.block, Some((Probe::Function(id), body.line))),
            line: body.line,
            end_line: body.end_line,
        }
    }

    fn stat(&mut self, kind: &StatKind, line: u32) -> StatKind {
        match kind {
            StatKind::Local { names, exprs } => StatKind::Local {
                names: names.clone(),
                exprs: exprs
                    .iter()
                    .enumerate()
                    .map(|(i, e)| self.named_expr(e, names.get(i).map(|(n, _)| n.clone())))
                    .collect(),
            },
            StatKind::Assign { targets, exprs } => {
                let targets: Vec<Expr> = targets.iter().map(|t| self.expr(t)).collect();
                let exprs = exprs
                    .iter()
                    .enumerate()
                    .map(|(i, e)| self.named_expr(e, targets.get(i).and_then(target_name)))
                    .collect();
                StatKind::Assign { targets, exprs }
            }
            StatKind::Call(e) => StatKind::Call(self.expr(e)),
            StatKind::Do(b) => StatKind::Do(self.block(b, None)),
            StatKind::While { cond, body } => StatKind::While {
                cond: self.expr(cond),
                body: self.tracked_block(body, BlockKind::LoopBody, line),
            },
            StatKind::Repeat { body, cond } => StatKind::Repeat {
                body: self.tracked_block(body, BlockKind::LoopBody, line),
                cond: self.expr(cond),
            },
            StatKind::If {
                clauses,
                else_clause,
                end_line,
            } => StatKind::If {
                clauses: clauses
                    .iter()
                    .map(|c| IfClause {
                        cond: self.expr(&c.cond),
                        block: self.tracked_block(&c.block, BlockKind::IfBranch, c.line),
                        line: c.line,
                    })
                    .collect(),
                else_clause: else_clause.as_ref().map(|e| ElseClause {
                    block: self.tracked_block(&e.block, BlockKind::ElseBranch, e.line),
                    line: e.line,
                }),
                end_line: *end_line,
            },
            StatKind::NumericFor {
                var,
                start,
                limit,
                step,
                body,
            } => StatKind::NumericFor {
                var: var.clone(),
                start: self.expr(start),
                limit: self.expr(limit),
                step: step.as_ref().map(|s| self.expr(s)),
                body: self.tracked_block(body, BlockKind::LoopBody, line),
            },
            StatKind::GenericFor { names, exprs, body } => StatKind::GenericFor {
                names: names.clone(),
                exprs: self.exprs(exprs),
                body: self.tracked_block(body, BlockKind::LoopBody, line),
            },
            StatKind::Function { path, method, body } => {
                let mut name = path.join(".");
                if let Some(m) = method {
                    name.push(':');
                    name.push_str(m);
                }
                StatKind::Function {
                    path: path.clone(),
                    method: method.clone(),
                    body: self.function(body, &name),
                }
            }
            StatKind::LocalFunction { name, body } => StatKind::LocalFunction {
                name: name.clone(),
                body: self.function(body, name),
            },
            other => other.clone(),
        }
    }

    fn exprs(&mut self, exprs: &[Expr]) -> Vec<Expr> {
        exprs.iter().map(|e| self.expr(e)).collect()
    }

    fn named_expr(&mut self, expr: &Expr, name: Option<String>) -> Expr {
        match (expr, name) {
            (Expr::Function(body), Some(name)) => Expr::Function(Box::new(self.function(body, &name))),
            (other, _) => self.expr(other),
        }
    }

    fn expr(&mut self, expr: &Expr) -> Expr {
        match expr {
            Expr::Function(body) => Expr::Function(Box::new(self.function(body, ANONYMOUS))),
            Expr::Table(fields) => Expr::Table(
                fields
                    .iter()
                    .map(|f| match f {
                        Field::Positional(e) => Field::Positional(self.expr(e)),
                        Field::Named(n, e) => Field::Named(n.clone(), self.named_expr(e, Some(n.clone()))),
                        Field::Keyed(k, v) => {
                            let k = self.expr(k);
                            Field::Keyed(k, self.expr(v))
                        }
                    })
                    .collect(),
            ),
            Expr::Binary(op, l, r) => {
                let l = self.expr(l);
                Expr::Binary(*op, Box::new(l), Box::new(self.expr(r)))
            }
            Expr::Unary(op, e) => Expr::Unary(*op, Box::new(self.expr(e))),
            Expr::Paren(e) => Expr::Paren(Box::new(self.expr(e))),
            Expr::Index(o, k) => {
                let o = self.expr(o);
                Expr::Index(Box::new(o), Box::new(self.expr(k)))
            }
            Expr::Member(o, n) => Expr::Member(Box::new(self.expr(o)), n.clone()),
            Expr::Call(f, args) => {
                let f = self.expr(f);
                Expr::Call(Box::new(f), self.exprs(args))
            }
            Expr::Method(o, n, args) => {
                let o = self.expr(o);
                Expr::Method(Box::new(o), n.clone(), self.exprs(args))
            }
            leaf => leaf.clone(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::lua::parse;

    fn run(src: &str) -> Transformed {
        transform(&parse(src, "t.lua").unwrap(), "t.lua", 3).unwrap()
    }

    fn probes(block: &Block) -> Vec<Probe> {
        block
            .stats
            .iter()
            .filter_map(|s| match s.kind {
                StatKind::Track(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_line_probes_precede_statements() {
        let t = run("local a = 1\nlocal b = 2\nreturn a + b");
        assert_eq!(
            probes(&t.chunk.block),
            vec![Probe::Line(1), Probe::Line(2), Probe::Line(3)]
        );
        assert_eq!(t.layout.executable_lines, BTreeSet::from([1, 2, 3]));
        assert!(matches!(t.chunk.block.stats[0].kind, StatKind::Track(Probe::Line(1))));
        assert!(matches!(t.chunk.block.stats[1].kind, StatKind::Local { .. }));
    }

    #[test]
    fn test_one_probe_per_line_per_block() {
        let t = run("a() b() c()\nd()");
        assert_eq!(probes(&t.chunk.block), vec![Probe::Line(1), Probe::Line(2)]);
    }

    #[test]
    fn test_comments_blank_lines_and_labels_are_not_executable() {
        let t = run("-- header\n\nlocal x = 1\n::top::\n;\nx = x + 1");
        assert_eq!(t.layout.executable_lines, BTreeSet::from([3, 6]));
    }

    #[test]
    fn test_function_entry_probe_and_naming() {
        let src = "local M = {}\nfunction M.add(a, b)\n  return a + b\nend\nlocal f = function() end\nM.h = { run = function() end }\nreturn M";
        let t = run(src);
        let names: Vec<_> = t.layout.functions.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(names, vec!["M.add:2", "f:5", "run:6"]);

        let StatKind::Function { body, .. } = &t.chunk.block.stats[3].kind else {
            panic!("expected function statement");
        };
        assert_eq!(probes(&body.block), vec![Probe::Function(0), Probe::Line(3)]);
        assert_eq!(t.layout.blocks[0].kind, BlockKind::FunctionBody);
        assert_eq!(t.layout.functions[0].block, 0);
    }

    #[test]
    fn test_branch_and_loop_blocks() {
        let src = "if x then\n  a()\nelseif y then\n  b()\nelse\n  c()\nend\nwhile z do z = false end\nfor i = 1, 2 do end";
        let t = run(src);
        let kinds: Vec<_> = t.layout.blocks.iter().map(|b| (b.kind, b.line)).collect();
        assert_eq!(
            kinds,
            vec![
                (BlockKind::IfBranch, 1),
                (BlockKind::IfBranch, 3),
                (BlockKind::ElseBranch, 5),
                (BlockKind::LoopBody, 8),
                (BlockKind::LoopBody, 9),
            ]
        );
        let StatKind::If { clauses, .. } = &t.chunk.block.stats[1].kind else {
            panic!("expected if");
        };
        assert_eq!(probes(&clauses[1].block), vec![Probe::Block(1), Probe::Line(4)]);
    }

    #[test]
    fn test_original_chunk_is_not_mutated() {
        let chunk = parse("local a = 1", "t.lua").unwrap();
        let before = chunk.clone();
        let _ = transform(&chunk, "t.lua", 3).unwrap();
        assert_eq!(chunk, before);
    }

    #[test]
    fn test_too_many_top_level_locals_fails() {
        let src: String = (0..199).map(|i| format!("local v{i} = {i}\n")).collect();
        let chunk = parse(&src, "big.lua").unwrap();
        let err = transform(&chunk, "big.lua", 3).unwrap_err();
        assert!(matches!(err, CoverageError::Transform { .. }));
    }
}
