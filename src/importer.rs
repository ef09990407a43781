//! Importer harness: pluggable resolution of external paths
//!
//! An importer wraps one user-supplied function that resolves paths the
//! pipeline's own stores cannot serve (node-modules-style lookups, virtual
//! files, remote fetches). Importers are registered on the engine in
//! priority order; a build invocation tries each in turn until one returns a
//! result.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Error, Result};

/// What an importer produced for one external request.
#[derive(Debug, Clone)]
pub struct ImportResult {
    /// Absolute path the request resolved to.
    pub path: PathBuf,
    /// Resolved contents.
    pub contents: Vec<u8>,
    /// Every path the importer consulted while resolving, hit or miss.
    ///
    /// All of these become dependency edges of the requesting build path, so
    /// that consulted-but-missed paths also trigger future rebuilds.
    pub accessed: HashSet<PathBuf>,
}

impl ImportResult {
    /// A result that consulted only its own resolved path.
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        let path = path.into();
        let accessed = HashSet::from([path.clone()]);
        Self {
            path,
            contents: contents.into(),
            accessed,
        }
    }

    /// Add a consulted path to the `accessed` set.
    pub fn with_accessed(mut self, path: impl Into<PathBuf>) -> Self {
        self.accessed.insert(path.into());
        self
    }
}

/// User resolution function: `Ok(None)` means "cannot satisfy this request".
pub type ImporterFn = dyn Fn(&Path, &[String]) -> Result<Option<ImportResult>> + Send + Sync;

/// Thin harness around one user-supplied external-resolution function
#[derive(Clone)]
pub struct Importer {
    func: Arc<ImporterFn>,
}

impl Importer {
    /// Wrap a resolution function.
    pub fn new(
        func: impl Fn(&Path, &[String]) -> Result<Option<ImportResult>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            func: Arc::new(func),
        }
    }

    /// Run the importer for `path` with the given type hints.
    ///
    /// A returned result is validated against the importer contract; a
    /// relative or empty result path is a fatal `MalformedImport` error.
    pub fn execute(&self, path: &Path, type_hints: &[String]) -> Result<Option<ImportResult>> {
        let result = (self.func)(path, type_hints)?;
        if let Some(ref r) = result {
            if r.path.as_os_str().is_empty() {
                return Err(Error::MalformedImport {
                    path: path.to_path_buf(),
                    message: "importer returned an empty result path".to_string(),
                });
            }
            if r.path.is_relative() {
                return Err(Error::MalformedImport {
                    path: path.to_path_buf(),
                    message: format!("importer returned a relative path: {}", r.path.display()),
                });
            }
        }
        Ok(result)
    }
}

impl fmt::Debug for Importer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Importer(..)")
    }
}
