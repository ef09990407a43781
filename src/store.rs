//! Content stores: path -> bytes mappings that own change detection
//!
//! The engine never decides whether a write "really changed" a file; it
//! defers that, per file, to the store via `ContentStore::write`. The
//! built-in `MemoryStore` compares bytes for equality; hosts can supply
//! their own implementation (for example one backed by disk or a database)
//! as long as it honors the same contract.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A single file-level change.
///
/// `contents: None` always means "the path no longer exists; remove it."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: PathBuf,
    pub contents: Option<Vec<u8>>,
}

impl FileChange {
    /// A change that creates or replaces the file at `path`.
    pub fn update(path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            contents: Some(contents.into()),
        }
    }

    /// A change that removes the file at `path`.
    pub fn delete(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            contents: None,
        }
    }

    /// Whether this change is a deletion.
    pub fn is_delete(&self) -> bool {
        self.contents.is_none()
    }
}

/// Path -> bytes store that decides whether a write is a real change.
pub trait ContentStore: Send + Sync {
    /// Read the stored contents of `path`, if present.
    fn read(&self, path: &Path) -> Option<Vec<u8>>;

    /// Apply `contents` (or a deletion for `None`) at `path`.
    ///
    /// Returns the applied change, or `None` when the store's state already
    /// matched (same bytes, or deleting a path that does not exist).
    fn write(&mut self, path: &Path, contents: Option<&[u8]>) -> Option<FileChange>;

    /// Whether `path` is present in the store.
    fn contains(&self, path: &Path) -> bool;

    /// All paths currently present.
    fn paths(&self) -> Vec<PathBuf>;
}

/// In-memory content store backing the engine's input and per-stage outputs
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    files: HashMap<PathBuf, Vec<u8>>,
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of files
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl ContentStore for MemoryStore {
    fn read(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.get(path).cloned()
    }

    fn write(&mut self, path: &Path, contents: Option<&[u8]>) -> Option<FileChange> {
        match contents {
            Some(bytes) => {
                if self.files.get(path).map(Vec::as_slice) == Some(bytes) {
                    return None;
                }
                self.files.insert(path.to_path_buf(), bytes.to_vec());
                Some(FileChange::update(path, bytes))
            }
            None => self.files.remove(path).map(|_| FileChange::delete(path)),
        }
    }

    fn contains(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    fn paths(&self) -> Vec<PathBuf> {
        self.files.keys().cloned().collect()
    }
}
