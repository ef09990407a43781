//! Stage execution harness
//!
//! A stage owns one pipeline station's persistent bookkeeping: the dependency
//! relation ("the last build of `owner` read `path`"), the output relation
//! ("the last build of `owner` produced `path`"), the station's output store,
//! and the external import cache. `execute` computes the build set for one
//! batch, fans the build function out over it, merges fresh bookkeeping with
//! carried-over entries for paths it did not rebuild, and diffs the output
//! relation's right-sets to surface deletions.
//!
//! Both relations are replaced wholesale at the end of every batch, never
//! mutated in place; they are only touched inside `execute`, and `execute`
//! calls never overlap because the engine admits one batch at a time.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::{debug, trace};
use rayon::prelude::*;

use crate::context::{BuildContext, ImportCache};
use crate::engine::{EventSink, StageEvent};
use crate::error::{Error, Result};
use crate::importer::Importer;
use crate::path;
use crate::pattern::MatcherCache;
use crate::relation::Relation;
use crate::store::{ContentStore, FileChange, MemoryStore};

/// One output file produced by a build function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub path: PathBuf,
    pub contents: Vec<u8>,
}

impl OutputFile {
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
        }
    }
}

/// What a build function returned for one build path.
///
/// `Contents` means "same path, new contents"; `Files` and `Map` name their
/// output paths explicitly, resolved against the base directory. `None`
/// means the invocation produced nothing, which leaves any previous outputs
/// of the path to be surfaced as deletions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutput {
    None,
    Contents(Vec<u8>),
    Files(Vec<OutputFile>),
    Map(BTreeMap<PathBuf, Vec<u8>>),
}

impl From<Vec<u8>> for BuildOutput {
    fn from(contents: Vec<u8>) -> Self {
        BuildOutput::Contents(contents)
    }
}

impl From<&str> for BuildOutput {
    fn from(contents: &str) -> Self {
        BuildOutput::Contents(contents.as_bytes().to_vec())
    }
}

impl From<String> for BuildOutput {
    fn from(contents: String) -> Self {
        BuildOutput::Contents(contents.into_bytes())
    }
}

impl From<Vec<OutputFile>> for BuildOutput {
    fn from(files: Vec<OutputFile>) -> Self {
        BuildOutput::Files(files)
    }
}

impl From<BTreeMap<PathBuf, Vec<u8>>> for BuildOutput {
    fn from(map: BTreeMap<PathBuf, Vec<u8>>) -> Self {
        BuildOutput::Map(map)
    }
}

/// User build function: invoked once per build path per batch.
pub(crate) type BuildFn = dyn Fn(&BuildContext) -> Result<BuildOutput> + Send + Sync;

/// One station of the pipeline, with its persistent bookkeeping.
///
/// Constructed and driven by the engine only; hosts declare stages through
/// `EngineBuilder::stage`.
pub(crate) struct Stage {
    name: String,
    build: Arc<BuildFn>,
    deps: Relation,
    outputs: Relation,
    output_store: MemoryStore,
    import_cache: Mutex<ImportCache>,
    matchers: MatcherCache,
}

impl Stage {
    pub(crate) fn new(
        name: impl Into<String>,
        build: impl Fn(&BuildContext) -> Result<BuildOutput> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            build: Arc::new(build),
            deps: Relation::new(),
            outputs: Relation::new(),
            output_store: MemoryStore::new(),
            import_cache: Mutex::new(ImportCache::new()),
            matchers: MatcherCache::new(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn output_store(&self) -> &MemoryStore {
        &self.output_store
    }

    /// Run one batch through this stage.
    ///
    /// `changed_internal` is the previous station's output delta (or the
    /// engine's input delta for the first station); `changed_external` is
    /// forwarded unchanged to every station. Returns the net output delta.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn execute(
        &mut self,
        base: &Path,
        input: &dyn ContentStore,
        changed_internal: &BTreeSet<PathBuf>,
        changed_external: &BTreeSet<PathBuf>,
        importers: &[Importer],
        events: &EventSink,
        verbose: bool,
    ) -> Result<Vec<FileChange>> {
        let build_set = self.build_set(changed_internal, changed_external);
        if verbose {
            debug!(
                "stage {}: {} changed, {} to build",
                self.name,
                changed_internal.len(),
                build_set.len()
            );
        } else {
            trace!(
                "stage {}: {} changed, {} to build",
                self.name,
                changed_internal.len(),
                build_set.len()
            );
        }

        // deleted inputs stay in the build set but schedule no invocation;
        // their previous outputs fall out through the deletion diff
        let work: Vec<(PathBuf, Vec<u8>)> = build_set
            .iter()
            .filter_map(|p| input.read(p).map(|contents| (p.clone(), contents)))
            .collect();

        let new_deps = Mutex::new(Relation::new());
        let results: Mutex<BTreeMap<PathBuf, BuildOutput>> = Mutex::new(BTreeMap::new());

        let stage_name = self.name.as_str();
        let build = Arc::clone(&self.build);
        let import_cache = &self.import_cache;
        let matchers = &self.matchers;

        work.into_par_iter().for_each(|(build_path, contents)| {
            let outcome = BuildContext::new(
                stage_name,
                base,
                &build_path,
                contents,
                input,
                &new_deps,
                import_cache,
                importers,
                matchers,
                events,
            )
            .and_then(|ctx| (build.as_ref())(&ctx));
            match outcome {
                Ok(output) => match results.lock() {
                    Ok(mut results) => {
                        results.insert(build_path, output);
                    }
                    Err(_) => {
                        (events.as_ref())(&StageEvent::BuildFailed {
                            stage: stage_name.to_string(),
                            path: build_path,
                            error: Error::LockPoisoned {
                                context: "build result collector".to_string(),
                            },
                        });
                    }
                },
                Err(error) => {
                    (events.as_ref())(&StageEvent::BuildFailed {
                        stage: stage_name.to_string(),
                        path: build_path,
                        error,
                    });
                }
            }
        });

        let mut new_deps = new_deps.into_inner().map_err(|_| Error::LockPoisoned {
            context: "dependency recorder".to_string(),
        })?;
        let results = results.into_inner().map_err(|_| Error::LockPoisoned {
            context: "build result collector".to_string(),
        })?;

        // normalize outputs, record output edges; ordering follows the
        // sorted build set since results are keyed by build path
        let mut new_outputs = Relation::new();
        let mut changes: Vec<FileChange> = Vec::new();
        for (owner, output) in results {
            match normalize_output(base, &owner, output) {
                Ok(files) => {
                    for (produced, contents) in files {
                        new_outputs.add(&owner, &produced);
                        changes.push(FileChange::update(produced, contents));
                    }
                }
                Err(error) => {
                    // a malformed output voids the whole invocation; edges
                    // already recorded in new_deps stay, so a fix to any
                    // input still triggers a rebuild
                    (events.as_ref())(&StageEvent::BuildFailed {
                        stage: self.name.clone(),
                        path: owner,
                        error,
                    });
                }
            }
        }

        // carry over bookkeeping for owners that were not rebuilt; their
        // last build result is still valid
        for owner in self.deps.lefts() {
            if !build_set.contains(owner) {
                for read in self.deps.rights_for(owner) {
                    new_deps.add(owner, read);
                }
            }
        }
        for owner in self.outputs.lefts() {
            if !build_set.contains(owner) {
                for produced in self.outputs.rights_for(owner) {
                    new_outputs.add(owner, produced);
                }
            }
        }

        // anything produced before but not now is a deletion
        let old_rights: BTreeSet<PathBuf> =
            self.outputs.rights().map(Path::to_path_buf).collect();
        for gone in &old_rights {
            if new_outputs.lefts_for(gone).next().is_none() {
                changes.push(FileChange::delete(gone));
            }
        }

        self.deps = new_deps;
        self.outputs = new_outputs;

        // write through, keeping only what the store reports as a net change
        let mut net: Vec<FileChange> = Vec::new();
        for change in changes {
            if let Some(applied) = self
                .output_store
                .write(&change.path, change.contents.as_deref())
            {
                net.push(applied);
            }
        }
        Ok(net)
    }

    /// Changed paths plus every owner whose last build read a changed path.
    fn build_set(
        &self,
        changed_internal: &BTreeSet<PathBuf>,
        changed_external: &BTreeSet<PathBuf>,
    ) -> BTreeSet<PathBuf> {
        let mut build_set = changed_internal.clone();
        for changed in changed_internal.iter().chain(changed_external) {
            for owner in self.deps.lefts_for(changed) {
                build_set.insert(owner.to_path_buf());
            }
        }
        build_set
    }
}

/// Flatten a build output into resolved `(path, contents)` pairs.
///
/// Output paths must be non-empty and resolve inside the base directory;
/// anything else is a contract violation charged to `owner` alone.
fn normalize_output(
    base: &Path,
    owner: &Path,
    output: BuildOutput,
) -> Result<Vec<(PathBuf, Vec<u8>)>> {
    let entries: Vec<(PathBuf, Vec<u8>)> = match output {
        BuildOutput::None => return Ok(Vec::new()),
        BuildOutput::Contents(contents) => return Ok(vec![(owner.to_path_buf(), contents)]),
        BuildOutput::Files(files) => files.into_iter().map(|f| (f.path, f.contents)).collect(),
        BuildOutput::Map(map) => map.into_iter().collect(),
    };

    let mut resolved = Vec::with_capacity(entries.len());
    for (out_path, contents) in entries {
        if out_path.as_os_str().is_empty() {
            return Err(Error::MalformedOutput {
                path: owner.to_path_buf(),
                message: "empty output path".to_string(),
            });
        }
        let out_path = path::resolve_within(base, &out_path).map_err(|_| Error::MalformedOutput {
            path: owner.to_path_buf(),
            message: format!(
                "output path escapes the base directory: {}",
                out_path.display()
            ),
        })?;
        resolved.push((out_path, contents));
    }
    Ok(resolved)
}
