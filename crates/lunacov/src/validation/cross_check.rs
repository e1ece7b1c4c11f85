//! Independent static re-analysis of embedded source
//!
//! Walks the syntax tree on its own, without the instrumenter, to find
//! executable lines and function keys, then diffs them against the
//! coverage data. A disagreement points at an instrumentation bug.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::coverage::CoverageData;
use crate::lua::ast::{target_name, Block, Expr, Field, FuncBody, FunctionKeys, StatKind, ANONYMOUS};
use crate::lua::{self, Chunk};

/// Differences found for one file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiscrepancy {
    /// Executable by static analysis, absent from coverage data
    pub missing_lines: Vec<u32>,
    /// Tracked by coverage data, not executable by static analysis
    pub extra_lines: Vec<u32>,
    /// Functions found by static analysis, absent from coverage data
    pub missing_functions: Vec<String>,
}

impl FileDiscrepancy {
    fn is_empty(&self) -> bool {
        self.missing_lines.is_empty() && self.extra_lines.is_empty() && self.missing_functions.is_empty()
    }
}

/// Outcome of the cross-check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossCheckResult {
    /// Files whose embedded source was analyzed
    pub files_checked: usize,
    /// Per-file differences, only for files that have any
    pub discrepancies: BTreeMap<String, FileDiscrepancy>,
    /// Files without embedded source, or whose source did not parse
    pub unanalyzed_files: Vec<String>,
    /// False if any embedded source failed to parse
    pub analysis_success: bool,
}

/// Static facts of one file
#[derive(Debug, Default)]
struct StaticFacts {
    lines: BTreeSet<u32>,
    functions: Vec<String>,
    keys: FunctionKeys,
}

impl StaticFacts {
    fn of(chunk: &Chunk) -> Self {
        let mut facts = Self::default();
        facts.block(&chunk.block);
        facts
    }

    fn block(&mut self, block: &Block) {
        for stat in &block.stats {
            if !matches!(stat.kind, StatKind::Empty | StatKind::Label(_) | StatKind::Track(_)) {
                let _ = self.lines.insert(stat.line);
            }
            self.stat(&stat.kind);
        }
        if let Some(ret) = &block.ret {
            let _ = self.lines.insert(ret.line);
            for e in &ret.exprs {
                self.expr(e, None);
            }
        }
    }

    fn function(&mut self, body: &FuncBody, name: &str) {
        self.functions.push(self.keys.next(name, body.line));
        self.block(&body.block);
    }

    fn stat(&mut self, kind: &StatKind) {
        match kind {
            StatKind::Local { names, exprs } => {
                for (i, e) in exprs.iter().enumerate() {
                    self.expr(e, names.get(i).map(|(n, _)| n.clone()));
                }
            }
            StatKind::Assign { targets, exprs } => {
                for t in targets {
                    self.expr(t, None);
                }
                for (i, e) in exprs.iter().enumerate() {
                    self.expr(e, targets.get(i).and_then(target_name));
                }
            }
            StatKind::Call(e) => self.expr(e, None),
            StatKind::Do(b) => self.block(b),
            StatKind::While { cond, body } => {
                self.expr(cond, None);
                self.block(body);
            }
            StatKind::Repeat { body, cond } => {
                self.block(body);
                self.expr(cond, None);
            }
            StatKind::If {
                clauses,
                else_clause,
                ..
            } => {
                for clause in clauses {
                    self.expr(&clause.cond, None);
                    self.block(&clause.block);
                }
                if let Some(e) = else_clause {
                    self.block(&e.block);
                }
            }
            StatKind::NumericFor {
                start,
                limit,
                step,
                body,
                ..
            } => {
                self.expr(start, None);
                self.expr(limit, None);
                if let Some(s) = step {
                    self.expr(s, None);
                }
                self.block(body);
            }
            StatKind::GenericFor { exprs, body, .. } => {
                for e in exprs {
                    self.expr(e, None);
                }
                self.block(body);
            }
            StatKind::Function { path, method, body } => {
                let mut name = path.join(".");
                if let Some(m) = method {
                    name = format!("{name}:{m}");
                }
                self.function(body, &name);
            }
            StatKind::LocalFunction { name, body } => self.function(body, name),
            StatKind::Empty
            | StatKind::Label(_)
            | StatKind::Goto(_)
            | StatKind::Break
            | StatKind::Track(_) => {}
        }
    }

    fn expr(&mut self, expr: &Expr, name: Option<String>) {
        match expr {
            Expr::Function(body) => self.function(body, name.as_deref().unwrap_or(ANONYMOUS)),
            Expr::Table(fields) => {
                for field in fields {
                    match field {
                        Field::Positional(e) => self.expr(e, None),
                        Field::Named(n, e) => self.expr(e, Some(n.clone())),
                        Field::Keyed(k, v) => {
                            self.expr(k, None);
                            self.expr(v, None);
                        }
                    }
                }
            }
            Expr::Binary(_, l, r) | Expr::Index(l, r) => {
                self.expr(l, None);
                self.expr(r, None);
            }
            Expr::Unary(_, e) | Expr::Paren(e) | Expr::Member(e, _) => self.expr(e, None),
            Expr::Call(f, args) | Expr::Method(f, _, args) => {
                self.expr(f, None);
                for a in args {
                    self.expr(a, None);
                }
            }
            Expr::Nil
            | Expr::True
            | Expr::False
            | Expr::Vararg
            | Expr::Number(_)
            | Expr::Str(_)
            | Expr::Name(_) => {}
        }
    }
}

/// Re-derive executable lines and functions from embedded source and diff
/// them against the recorded coverage
///
/// Files without embedded source are listed as unanalyzed, not treated
/// as errors.
#[must_use]
pub fn cross_check_with_static_analysis(data: &CoverageData) -> CrossCheckResult {
    let mut result = CrossCheckResult {
        analysis_success: true,
        ..CrossCheckResult::default()
    };
    let Some(files) = &data.files else {
        result.analysis_success = false;
        return result;
    };

    for (path, file) in files {
        let Some(original) = data
            .original_files
            .as_ref()
            .and_then(|o| o.get(path))
            .filter(|o| !o.source.is_empty())
        else {
            result.unanalyzed_files.push(path.clone());
            continue;
        };
        let chunk = match lua::parse(&original.source, path) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(file = %path, error = %e, "static analysis could not parse source");
                result.unanalyzed_files.push(path.clone());
                result.analysis_success = false;
                continue;
            }
        };
        result.files_checked += 1;

        let facts = StaticFacts::of(&chunk);
        let recorded: BTreeSet<u32> = file.lines.keys().copied().collect();
        let discrepancy = FileDiscrepancy {
            missing_lines: facts.lines.difference(&recorded).copied().collect(),
            extra_lines: recorded.difference(&facts.lines).copied().collect(),
            missing_functions: facts
                .functions
                .into_iter()
                .filter(|key| !file.functions.contains_key(key))
                .collect(),
        };
        if !discrepancy.is_empty() {
            tracing::warn!(
                file = %path,
                missing_lines = discrepancy.missing_lines.len(),
                extra_lines = discrepancy.extra_lines.len(),
                missing_functions = discrepancy.missing_functions.len(),
                "static analysis disagrees with coverage data"
            );
            let _ = result.discrepancies.insert(path.clone(), discrepancy);
        }
    }
    result
}
