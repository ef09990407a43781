//! Per-invocation build context
//!
//! A `BuildContext` is constructed fresh for every (stage, build path, batch)
//! and handed to the stage's build function. It exposes the file being built,
//! pattern matching over its base-relative path, and the import API. Every
//! import attempt, successful or not, records a dependency edge, which is
//! what drives the next batch's rebuild decisions.
//!
//! Within one stage execution, sibling contexts run concurrently and share
//! the same dependency recorder and external-import cache; both live behind
//! mutexes for that reason.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::engine::{EventSink, StageEvent};
use crate::error::{Error, Result};
use crate::importer::{ImportResult, Importer};
use crate::path;
use crate::pattern::{MatcherCache, Pattern};
use crate::relation::Relation;
use crate::store::ContentStore;

/// A successfully imported file: resolved path plus contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedFile {
    pub path: PathBuf,
    pub contents: Vec<u8>,
}

impl ImportedFile {
    /// Contents as text, lossily converted.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.contents).into_owned()
    }
}

/// Cache key for external imports: normalized path plus sorted type hints.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ImportKey {
    path: PathBuf,
    hints: Vec<String>,
}

/// Per-stage cache of external import results; persists across batches and
/// is never proactively invalidated by the engine.
pub(crate) type ImportCache = HashMap<ImportKey, ImportResult>;

/// Per-invocation context handed to a stage's build function
pub struct BuildContext<'a> {
    stage: &'a str,
    build_path: PathBuf,
    rel_path: String,
    contents: Vec<u8>,
    base: &'a Path,
    input: &'a dyn ContentStore,
    deps: &'a Mutex<Relation>,
    import_cache: &'a Mutex<ImportCache>,
    importers: &'a [Importer],
    matchers: &'a MatcherCache,
    events: &'a EventSink,
}

impl<'a> BuildContext<'a> {
    /// Construct a context for one build path.
    ///
    /// Fails with `PathEscape` if the path does not resolve inside `base`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        stage: &'a str,
        base: &'a Path,
        build_path: &Path,
        contents: Vec<u8>,
        input: &'a dyn ContentStore,
        deps: &'a Mutex<Relation>,
        import_cache: &'a Mutex<ImportCache>,
        importers: &'a [Importer],
        matchers: &'a MatcherCache,
        events: &'a EventSink,
    ) -> Result<Self> {
        let build_path = path::resolve_within(base, build_path)?;
        let rel_path = path::relative_to_base(base, &build_path)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            stage,
            build_path,
            rel_path,
            contents,
            base,
            input,
            deps,
            import_cache,
            importers,
            matchers,
            events,
        })
    }

    /// Absolute path of the file being built.
    pub fn path(&self) -> &Path {
        &self.build_path
    }

    /// Base-relative form of the build path.
    pub fn rel_path(&self) -> &str {
        &self.rel_path
    }

    /// Current contents of the file being built.
    pub fn contents(&self) -> &[u8] {
        &self.contents
    }

    /// Contents as text, lossily converted.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.contents).into_owned()
    }

    /// The engine's base directory.
    pub fn base(&self) -> &Path {
        self.base
    }

    /// Test the base-relative build path against a pattern.
    pub fn matches(&self, pattern: &Pattern) -> Result<bool> {
        self.matchers.matches(pattern, &self.rel_path)
    }

    /// Import a file from this stage's input store.
    ///
    /// The path is resolved against the base directory; resolution outside
    /// the base is fatal. A dependency edge is recorded for the resolved
    /// path whether or not the read succeeds, so a later creation of a
    /// missing file still triggers a rebuild.
    pub fn import_internal(&self, path: impl AsRef<Path>) -> Result<ImportedFile> {
        let resolved = path::resolve_within(self.base, path.as_ref())?;
        self.record_dependency(&resolved)?;
        match self.input.read(&resolved) {
            Some(contents) => Ok(ImportedFile {
                path: resolved,
                contents,
            }),
            None => Err(Error::NotFound { path: resolved }),
        }
    }

    /// Import a file via the configured importers, in registration order.
    ///
    /// The request path is normalized (base-relative when it falls inside
    /// the base directory, absolute otherwise) and looked up in the stage's
    /// import cache first. On an importer hit, every path the importer
    /// consulted becomes a dependency edge and the result is cached.
    pub fn import_external(
        &self,
        path: impl AsRef<Path>,
        type_hints: &[&str],
    ) -> Result<ImportedFile> {
        let hints: Vec<String> = type_hints.iter().map(|h| h.to_string()).collect();
        let normalized = self.normalize_external(path.as_ref());
        let key = ImportKey {
            path: normalized.clone(),
            hints: {
                let mut sorted = hints.clone();
                sorted.sort();
                sorted
            },
        };

        if let Some(cached) = self.cached_import(&key)? {
            self.record_import_dependencies(&cached)?;
            return Ok(ImportedFile {
                path: cached.path,
                contents: cached.contents,
            });
        }

        for importer in self.importers {
            if let Some(result) = importer.execute(&normalized, &hints)? {
                self.record_import_dependencies(&result)?;
                self.cache_import(key, result.clone())?;
                return Ok(ImportedFile {
                    path: result.path,
                    contents: result.contents,
                });
            }
        }

        Err(Error::NotFound { path: normalized })
    }

    /// Import a file, preferring the stage's input store.
    ///
    /// Paths that resolve inside the base directory are tried internally
    /// first; a recoverable miss falls back to the importers. Paths outside
    /// the base go straight to the importers.
    pub fn import(&self, path: impl AsRef<Path>, type_hints: &[&str]) -> Result<ImportedFile> {
        let path = path.as_ref();
        if path::resolve_within(self.base, path).is_ok() {
            match self.import_internal(path) {
                Ok(file) => return Ok(file),
                Err(e) if e.is_recoverable() => {}
                Err(e) => return Err(e),
            }
        }
        self.import_external(path, type_hints)
    }

    /// First successful `import` over an ordered candidate list.
    ///
    /// When every candidate fails recoverably, the last such failure is
    /// propagated; any other failure propagates immediately.
    pub fn import_first<I, P>(&self, candidates: I, type_hints: &[&str]) -> Result<ImportedFile>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.first_of(candidates, |p| self.import(p, type_hints))
    }

    /// First successful `import_internal` over an ordered candidate list.
    pub fn import_first_internal<I, P>(&self, candidates: I) -> Result<ImportedFile>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.first_of(candidates, |p| self.import_internal(p))
    }

    /// First successful `import_external` over an ordered candidate list.
    pub fn import_first_external<I, P>(
        &self,
        candidates: I,
        type_hints: &[&str],
    ) -> Result<ImportedFile>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.first_of(candidates, |p| self.import_external(p, type_hints))
    }

    /// Forward a named event from the build function to the engine's event
    /// sink.
    pub fn emit(&self, name: &str, detail: &str) {
        (self.events.as_ref())(&StageEvent::Message {
            stage: self.stage.to_string(),
            path: self.build_path.clone(),
            name: name.to_string(),
            detail: detail.to_string(),
        });
    }

    fn first_of<I, P>(
        &self,
        candidates: I,
        mut attempt: impl FnMut(&Path) -> Result<ImportedFile>,
    ) -> Result<ImportedFile>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut last: Option<Error> = None;
        for candidate in candidates {
            match attempt(candidate.as_ref()) {
                Ok(file) => return Ok(file),
                Err(e) if e.is_recoverable() => last = Some(e),
                Err(e) => return Err(e),
            }
        }
        // an empty candidate list reports the build path itself
        Err(last.unwrap_or(Error::NotFound {
            path: self.build_path.clone(),
        }))
    }

    /// Normalized key/request form of an external path: base-relative when
    /// inside the base directory, otherwise as given (normalized).
    fn normalize_external(&self, path: &Path) -> PathBuf {
        let normalized = path::normalize(path);
        if normalized.is_absolute() {
            path::relative_to_base(self.base, &normalized).unwrap_or(normalized)
        } else {
            normalized
        }
    }

    fn record_dependency(&self, read: &Path) -> Result<()> {
        let mut deps = self.deps.lock().map_err(|_| Error::LockPoisoned {
            context: "dependency recorder".to_string(),
        })?;
        deps.add(&self.build_path, read);
        Ok(())
    }

    /// Record the resolved path and everything the importer consulted.
    fn record_import_dependencies(&self, result: &ImportResult) -> Result<()> {
        self.record_dependency(&result.path)?;
        for accessed in &result.accessed {
            self.record_dependency(accessed)?;
        }
        Ok(())
    }

    fn cached_import(&self, key: &ImportKey) -> Result<Option<ImportResult>> {
        let cache = self.import_cache.lock().map_err(|_| Error::LockPoisoned {
            context: "import cache".to_string(),
        })?;
        Ok(cache.get(key).cloned())
    }

    fn cache_import(&self, key: ImportKey, result: ImportResult) -> Result<()> {
        let mut cache = self.import_cache.lock().map_err(|_| Error::LockPoisoned {
            context: "import cache".to_string(),
        })?;
        cache.insert(key, result);
        Ok(())
    }
}
