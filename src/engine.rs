//! Pipeline orchestrator
//!
//! The engine owns the ordered stage chain, the importer list, and the
//! overall input store. Stage `i` reads from stage `i-1`'s output store;
//! stage 0 reads from the input store, and the last stage's output store is
//! the pipeline's output. `batch` is the single entry point: it resolves raw
//! input changes to a true delta, threads that delta through the stages
//! sequentially, and returns the last executed stage's net output delta.
//!
//! One batch runs at a time process-wide. A `batch` call while another is in
//! flight fails with `Busy` and leaves all state untouched.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use log::{debug, error};

use crate::context::BuildContext;
use crate::error::{Error, Result};
use crate::importer::{ImportResult, Importer};
use crate::path;
use crate::stage::{BuildOutput, Stage};
use crate::store::{ContentStore, FileChange, MemoryStore};

/// Out-of-band notification from a stage to the host.
#[derive(Debug)]
pub enum StageEvent {
    /// A single build invocation failed; the batch continued without it.
    BuildFailed {
        stage: String,
        path: PathBuf,
        error: Error,
    },
    /// A build function called `emit` on its context.
    Message {
        stage: String,
        path: PathBuf,
        name: String,
        detail: String,
    },
}

/// Host callback receiving stage events during a batch.
pub type EventSink = Arc<dyn Fn(&StageEvent) + Send + Sync>;

/// The sink installed when the host does not register one: build failures go
/// to `log::error!`, emitted messages to `log::debug!`.
pub fn default_event_sink() -> EventSink {
    Arc::new(|event| match event {
        StageEvent::BuildFailed { stage, path, error } => {
            error!("stage {}: build failed for {}: {}", stage, path.display(), error);
        }
        StageEvent::Message {
            stage,
            path,
            name,
            detail,
        } => {
            debug!("stage {}: {} from {}: {}", stage, name, path.display(), detail);
        }
    })
}

struct Inner {
    input: MemoryStore,
    stages: Vec<Stage>,
}

/// Incremental build pipeline: an ordered chain of stages over one base
/// directory
pub struct Engine {
    base: PathBuf,
    importers: Vec<Importer>,
    events: EventSink,
    verbose: bool,
    stage_names: Vec<String>,
    inner: Mutex<Inner>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("base", &self.base)
            .field("importers", &self.importers)
            .field("verbose", &self.verbose)
            .field("stage_names", &self.stage_names)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Start configuring an engine.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Run one batch of input changes through the pipeline.
    ///
    /// `input_changes` are resolved against the input store first; entries
    /// the store reports as no-ops are dropped before any stage runs.
    /// `changed_external` paths are forwarded to every stage, since any
    /// stage's build function may hold external dependencies.
    ///
    /// Per-invocation build failures are routed to the event sink and never
    /// abort the batch. The returned list is the last executed stage's net
    /// output delta; processing stops early once a stage yields no changes.
    pub fn batch(
        &self,
        input_changes: impl IntoIterator<Item = FileChange>,
        changed_external: impl IntoIterator<Item = PathBuf>,
    ) -> Result<Vec<FileChange>> {
        let mut inner = match self.inner.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Err(Error::Busy),
            Err(TryLockError::Poisoned(_)) => {
                return Err(Error::LockPoisoned {
                    context: "engine state".to_string(),
                })
            }
        };
        let Inner { input, stages } = &mut *inner;

        let external: BTreeSet<PathBuf> = changed_external
            .into_iter()
            .map(|p| path::normalize(&p))
            .collect();

        let mut changed: BTreeSet<PathBuf> = BTreeSet::new();
        for change in input_changes {
            if let Some(applied) = input.write(&change.path, change.contents.as_deref()) {
                changed.insert(applied.path);
            }
        }
        debug!(
            "batch: {} net input changes, {} external",
            changed.len(),
            external.len()
        );

        let mut result: Vec<FileChange> = Vec::new();
        for i in 0..stages.len() {
            let (upstream, rest) = stages.split_at_mut(i);
            let stage = &mut rest[0];
            let stage_input: &dyn ContentStore = match upstream.last() {
                Some(prev) => prev.output_store(),
                None => input,
            };
            result = stage.execute(
                &self.base,
                stage_input,
                &changed,
                &external,
                &self.importers,
                &self.events,
                self.verbose,
            )?;
            if result.is_empty() {
                debug!("batch: stage {} yielded no changes, stopping", stage.name());
                return Ok(result);
            }
            changed = result.iter().map(|c| c.path.clone()).collect();
        }
        Ok(result)
    }

    /// Read a path from the pipeline's final output store.
    pub fn read_output(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        let inner = self.lock()?;
        Ok(inner
            .stages
            .last()
            .and_then(|stage| stage.output_store().read(path)))
    }

    /// Read a path from the overall input store.
    pub fn read_input(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        let inner = self.lock()?;
        Ok(inner.input.read(path))
    }

    /// Names of the configured stages, in pipeline order.
    pub fn stage_names(&self) -> &[String] {
        &self.stage_names
    }

    /// The engine's base directory.
    pub fn base(&self) -> &Path {
        &self.base
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| Error::LockPoisoned {
            context: "engine state".to_string(),
        })
    }
}

/// Builder for `Engine`
pub struct EngineBuilder {
    base: Option<PathBuf>,
    stages: Vec<Stage>,
    importers: Vec<Importer>,
    events: EventSink,
    verbose: bool,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            base: None,
            stages: Vec::new(),
            importers: Vec::new(),
            events: default_event_sink(),
            verbose: false,
        }
    }

    /// Set the base directory. Must be absolute.
    pub fn base(mut self, base: impl Into<PathBuf>) -> Self {
        self.base = Some(base.into());
        self
    }

    /// Append a stage to the pipeline.
    pub fn stage(
        mut self,
        name: impl Into<String>,
        build: impl Fn(&BuildContext) -> Result<BuildOutput> + Send + Sync + 'static,
    ) -> Self {
        self.stages.push(Stage::new(name, build));
        self
    }

    /// Append an importer; importers are tried in registration order.
    pub fn importer(
        mut self,
        func: impl Fn(&Path, &[String]) -> Result<Option<ImportResult>> + Send + Sync + 'static,
    ) -> Self {
        self.importers.push(Importer::new(func));
        self
    }

    /// Replace the default event sink.
    pub fn event_sink(mut self, sink: EventSink) -> Self {
        self.events = sink;
        self
    }

    /// Promote per-invocation tracing from `trace!` to `debug!`.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn build(self) -> Result<Engine> {
        let base = self.base.ok_or_else(|| Error::Config {
            message: "a base directory is required".to_string(),
        })?;
        if !base.is_absolute() {
            return Err(Error::Config {
                message: format!("base directory must be absolute: {}", base.display()),
            });
        }
        if self.stages.is_empty() {
            return Err(Error::Config {
                message: "at least one stage is required".to_string(),
            });
        }
        let stage_names = self.stages.iter().map(|s| s.name().to_string()).collect();
        Ok(Engine {
            base: path::normalize(&base),
            importers: self.importers,
            events: self.events,
            verbose: self.verbose,
            stage_names,
            inner: Mutex::new(Inner {
                input: MemoryStore::new(),
                stages: self.stages,
            }),
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
