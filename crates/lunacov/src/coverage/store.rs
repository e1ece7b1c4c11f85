//! Coverage data store
//!
//! One store per run. Probe callbacks write into preallocated per-file
//! vectors, so marking a line, function or block is an index and an add.
//!
//! Line states only ever move forward: `executable -> executed -> covered`.
//! Marking a line covered also marks it executed, and lines that are not
//! executable for the file are ignored, so `covered ⊆ executed ⊆ executable`
//! holds after any sequence of calls.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use super::block::{BlockId, FileId, FunctionId};
use super::data::{
    BlockCoverage, CoverageData, FileCoverage, FunctionCoverage, LineCoverage, OriginalFile,
};
use crate::instrument::InstrumentationLayout;

#[derive(Debug)]
struct FileRecord {
    path: String,
    source: String,
    layout: InstrumentationLayout,
    /// Indexed by line number; slot 0 unused
    executable: Vec<bool>,
    line_hits: Vec<u64>,
    covered: Vec<bool>,
    function_calls: Vec<u64>,
    block_hits: Vec<u64>,
}

impl FileRecord {
    fn new(path: &str, layout: &InstrumentationLayout, source: &str) -> Self {
        let max_line = layout
            .executable_lines
            .last()
            .copied()
            .unwrap_or(0)
            .max(layout.line_count) as usize;
        let mut executable = vec![false; max_line + 1];
        for &line in &layout.executable_lines {
            executable[line as usize] = true;
        }
        Self {
            path: path.to_string(),
            source: source.to_string(),
            layout: layout.clone(),
            executable,
            line_hits: vec![0; max_line + 1],
            covered: vec![false; max_line + 1],
            function_calls: vec![0; layout.functions.len()],
            block_hits: vec![0; layout.blocks.len()],
        }
    }

    fn is_executable(&self, line: u32) -> bool {
        self.executable.get(line as usize).copied().unwrap_or(false)
    }

    fn coverage(&self) -> FileCoverage {
        let lines = self
            .layout
            .executable_lines
            .iter()
            .map(|&n| {
                let i = n as usize;
                (
                    n,
                    LineCoverage {
                        executed: self.line_hits[i] > 0,
                        covered: self.covered[i],
                        hits: self.line_hits[i],
                    },
                )
            })
            .collect();
        let functions = self
            .layout
            .functions
            .iter()
            .zip(&self.function_calls)
            .map(|(f, &calls)| {
                (
                    f.key.clone(),
                    FunctionCoverage {
                        name: f.name.clone(),
                        line: f.line,
                        calls,
                    },
                )
            })
            .collect();
        let blocks = self
            .layout
            .blocks
            .iter()
            .zip(&self.block_hits)
            .enumerate()
            .map(|(i, (b, &hits))| {
                (
                    i as u32,
                    BlockCoverage {
                        kind: b.kind,
                        line: b.line,
                        hits,
                    },
                )
            })
            .collect();
        FileCoverage::from_parts(lines, functions, blocks)
    }

    fn original(&self) -> OriginalFile {
        OriginalFile {
            source: self.source.clone(),
            executable_lines: self.layout.executable_lines.iter().copied().collect(),
            functions: self.layout.functions.iter().map(|f| f.key.clone()).collect(),
            lines: self.layout.line_count as usize,
        }
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    files: Vec<FileRecord>,
    by_path: HashMap<String, FileId>,
}

/// Shared handle to the coverage records of one run
///
/// Cloning the handle shares the records. The store is single-threaded.
#[derive(Debug, Clone, Default)]
pub struct CoverageStore {
    inner: Rc<RefCell<StoreInner>>,
}

impl CoverageStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file and return its id
    ///
    /// Registering the same path again with the same layout keeps the
    /// recorded hits. A different layout (the file changed) starts the
    /// record over under the same id.
    pub fn register_file(&self, path: &str, layout: &InstrumentationLayout, source: &str) -> FileId {
        let mut inner = self.inner.borrow_mut();
        if let Some(&id) = inner.by_path.get(path) {
            let record = &mut inner.files[id.index()];
            if record.layout != *layout || record.source != source {
                tracing::debug!(path, "file layout changed, resetting coverage record");
                *record = FileRecord::new(path, layout, source);
            }
            return id;
        }
        let id = FileId::new(inner.files.len() as u32);
        inner.files.push(FileRecord::new(path, layout, source));
        let _ = inner.by_path.insert(path.to_string(), id);
        id
    }

    /// Id of a registered file
    #[must_use]
    pub fn file_id(&self, path: &str) -> Option<FileId> {
        self.inner.borrow().by_path.get(path).copied()
    }

    /// Whether any file is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().files.is_empty()
    }

    /// Record that a line ran
    #[inline]
    pub fn mark_executed(&self, file: FileId, line: u32) {
        let mut inner = self.inner.borrow_mut();
        if let Some(record) = inner.files.get_mut(file.index()) {
            if record.is_executable(line) {
                let hits = &mut record.line_hits[line as usize];
                *hits = hits.saturating_add(1);
            }
        }
    }

    /// Record a function entry
    #[inline]
    pub fn mark_function(&self, file: FileId, function: FunctionId) {
        let mut inner = self.inner.borrow_mut();
        if let Some(calls) = inner
            .files
            .get_mut(file.index())
            .and_then(|r| r.function_calls.get_mut(function.index()))
        {
            *calls = calls.saturating_add(1);
        }
    }

    /// Record a block entry
    #[inline]
    pub fn mark_block(&self, file: FileId, block: BlockId) {
        let mut inner = self.inner.borrow_mut();
        if let Some(hits) = inner
            .files
            .get_mut(file.index())
            .and_then(|r| r.block_hits.get_mut(block.index()))
        {
            *hits = hits.saturating_add(1);
        }
    }

    /// Mark an original-source line as validated by an assertion
    ///
    /// Returns false for unknown files and non-executable lines.
    pub fn mark_line_covered(&self, path: &str, line: u32) -> bool {
        let mut inner = self.inner.borrow_mut();
        let Some(&id) = inner.by_path.get(path) else {
            return false;
        };
        let record = &mut inner.files[id.index()];
        if !record.is_executable(line) {
            return false;
        }
        let i = line as usize;
        record.covered[i] = true;
        if record.line_hits[i] == 0 {
            record.line_hits[i] = 1;
        }
        true
    }

    /// Zero every counter, keeping registrations
    pub fn reset(&self) {
        let mut inner = self.inner.borrow_mut();
        for record in &mut inner.files {
            record.line_hits.fill(0);
            record.covered.fill(false);
            record.function_calls.fill(0);
            record.block_hits.fill(0);
        }
    }

    /// Snapshot of everything recorded so far
    #[must_use]
    pub fn get_data(&self) -> CoverageData {
        let inner = self.inner.borrow();
        let mut files = BTreeMap::new();
        let mut originals = BTreeMap::new();
        for record in &inner.files {
            let _ = files.insert(record.path.clone(), record.coverage());
            let _ = originals.insert(record.path.clone(), record.original());
        }
        CoverageData::from_files(files, Some(originals))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::instrument::instrument_source;

    const SOURCE: &str = "local M = {}\nfunction M.f(x)\n  if x then\n    return 1\n  end\n  return 2\nend\nreturn M\n";

    fn registered() -> (CoverageStore, FileId) {
        let inst = instrument_source("m.lua", SOURCE).unwrap();
        let store = CoverageStore::new();
        let id = store.register_file("m.lua", &inst.layout, SOURCE);
        (store, id)
    }

    #[test]
    fn test_mark_executed_counts_hits() {
        let (store, id) = registered();
        store.mark_executed(id, 1);
        store.mark_executed(id, 1);
        let data = store.get_data();
        let file = &data.files.as_ref().unwrap()["m.lua"];
        assert_eq!(file.lines[&1].hits, 2);
        assert!(file.lines[&1].executed);
        assert!(!file.lines[&1].covered);
        assert_eq!(file.executed_lines, 1);
    }

    #[test]
    fn test_non_executable_lines_are_ignored() {
        let (store, id) = registered();
        store.mark_executed(id, 5);
        store.mark_executed(id, 500);
        assert!(!store.mark_line_covered("m.lua", 7));
        assert!(!store.mark_line_covered("other.lua", 1));
        let data = store.get_data();
        assert_eq!(data.summary.unwrap().executed_lines, 0);
    }

    #[test]
    fn test_covered_implies_executed() {
        let (store, _) = registered();
        assert!(store.mark_line_covered("m.lua", 4));
        let data = store.get_data();
        let line = data.files.unwrap()["m.lua"].lines[&4];
        assert!(line.executed && line.covered);
    }

    #[test]
    fn test_functions_and_blocks() {
        let (store, id) = registered();
        store.mark_function(id, FunctionId::new(0));
        store.mark_block(id, BlockId::new(0));
        store.mark_block(id, BlockId::new(99));
        let data = store.get_data();
        let file = &data.files.as_ref().unwrap()["m.lua"];
        assert_eq!(file.total_functions, 1);
        assert_eq!(file.covered_functions, 1);
        assert_eq!(file.functions["M.f:2"].calls, 1);
        assert_eq!(file.total_blocks, 2);
        assert_eq!(file.covered_blocks, 1);
        let original = &data.original_files.as_ref().unwrap()["m.lua"];
        assert_eq!(original.executable_lines, vec![1, 2, 3, 4, 6, 8]);
        assert_eq!(original.lines, 8);
    }

    #[test]
    fn test_reregister_same_layout_keeps_hits() {
        let (store, id) = registered();
        store.mark_executed(id, 1);
        let inst = instrument_source("m.lua", SOURCE).unwrap();
        assert_eq!(store.register_file("m.lua", &inst.layout, SOURCE), id);
        assert_eq!(store.get_data().summary.unwrap().executed_lines, 1);

        let changed = "return 1\n";
        let inst = instrument_source("m.lua", changed).unwrap();
        assert_eq!(store.register_file("m.lua", &inst.layout, changed), id);
        assert_eq!(store.get_data().summary.unwrap().executed_lines, 0);
    }

    #[test]
    fn test_reset_clears_counters() {
        let (store, id) = registered();
        store.mark_executed(id, 1);
        let _ = store.mark_line_covered("m.lua", 2);
        store.reset();
        let s = store.get_data().summary.unwrap();
        assert_eq!(s.executed_lines, 0);
        assert_eq!(s.covered_lines, 0);
        assert_eq!(s.total_files, 1);
    }
}
