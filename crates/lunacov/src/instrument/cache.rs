//! In-memory cache of instrumented modules
//!
//! Entries are keyed by path plus a [`ModificationSignature`]. A changed
//! file produces a different key, so stale entries are never served and
//! need no explicit invalidation. A file that cannot be read has no key and
//! bypasses the cache entirely.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::SystemTime;

use sha2::{Digest, Sha256};

use super::Instrumented;

/// Snapshot of a file's modification state
///
/// The modification time alone can miss two edits within the timestamp
/// resolution, so the length and a SHA-256 digest of the content are part
/// of the signature as well.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModificationSignature {
    /// Last modification time, if the platform reports one
    pub modified: Option<SystemTime>,
    /// File length in bytes
    pub len: u64,
    /// SHA-256 of the content
    pub digest: [u8; 32],
}

impl ModificationSignature {
    /// Read the signature of a file
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the file cannot be stat'ed or read.
    pub fn read(path: &Path) -> std::io::Result<Self> {
        let metadata = fs::metadata(path)?;
        let content = fs::read(path)?;
        Ok(Self::of(&content, metadata.modified().ok()))
    }

    /// Signature for content already in memory
    #[must_use]
    pub fn of(content: &[u8], modified: Option<SystemTime>) -> Self {
        Self {
            modified,
            len: content.len() as u64,
            digest: Sha256::digest(content).into(),
        }
    }

    /// Hex form of the digest
    #[must_use]
    pub fn digest_hex(&self) -> String {
        self.digest.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Cache key: a path and its signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    /// File path
    pub path: PathBuf,
    /// Signature at the time the key was taken
    pub signature: ModificationSignature,
}

impl CacheKey {
    /// Key for the file's current state, `None` if it cannot be read
    #[must_use]
    pub fn for_path(path: &Path) -> Option<Self> {
        match ModificationSignature::read(path) {
            Ok(signature) => Some(Self {
                path: path.to_path_buf(),
                signature,
            }),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "no cache key, bypassing cache");
                None
            }
        }
    }
}

/// A cached, compiled, instrumented module
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Key the entry was built for
    pub key: CacheKey,
    /// Instrumented source, source map and layout
    pub instrumented: Rc<Instrumented>,
    /// Compiled chunk; calling it runs the module body
    pub chunk: mlua::Function,
}

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries currently held
    pub entries: usize,
    /// Lookups that returned an entry
    pub hits: u64,
    /// Lookups that did not
    pub misses: u64,
}

/// Instrumented-module cache, one entry per path
#[derive(Debug, Default)]
pub struct InstrumentCache {
    entries: HashMap<PathBuf, CacheEntry>,
    hits: u64,
    misses: u64,
}

impl InstrumentCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for the file's current state
    ///
    /// Reads the file to compute its key; unreadable files are a miss.
    pub fn get(&mut self, path: &Path) -> Option<CacheEntry> {
        match CacheKey::for_path(path) {
            Some(key) => self.lookup(&key),
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Entry for an already computed key
    pub fn lookup(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let found = self
            .entries
            .get(&key.path)
            .filter(|entry| entry.key == *key)
            .cloned();
        if found.is_some() {
            self.hits += 1;
            tracing::debug!(path = %key.path.display(), "instrument cache hit");
        } else {
            self.misses += 1;
            tracing::debug!(path = %key.path.display(), "instrument cache miss");
        }
        found
    }

    /// Store an entry, replacing any older one for the same path
    ///
    /// Returns false, storing nothing, if the entry's key names another path.
    pub fn set(&mut self, path: &Path, entry: CacheEntry) -> bool {
        if entry.key.path != path {
            return false;
        }
        let _ = self.entries.insert(path.to_path_buf(), entry);
        true
    }

    /// Drop every entry
    pub fn clear(&mut self) -> bool {
        self.entries.clear();
        true
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hit/miss counters
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits,
            misses: self.misses,
        }
    }
}
