//! # conveyor
//!
//! An embeddable incremental build engine. A changing set of source files is
//! threaded through an ordered chain of transform stages; each stage
//! re-invokes its build function only for the files (and their dependents)
//! plausibly affected by the current change set, and the engine returns a
//! minimal diff of the final output set.
//!
//! The engine is designed to live inside a larger tool, such as a file
//! watcher, CLI, or dev server, that supplies raw file changes and consumes
//! output diffs.
//!
//! ## Example
//!
//! ```
//! use conveyor::{BuildOutput, Engine, FileChange};
//!
//! let engine = Engine::builder()
//!     .base("/src")
//!     .stage("upper", |ctx| Ok(BuildOutput::from(ctx.text().to_uppercase())))
//!     .build()
//!     .unwrap();
//!
//! let result = engine
//!     .batch([FileChange::update("/src/a.txt", *b"hello")], [])
//!     .unwrap();
//! assert_eq!(result, vec![FileChange::update("/src/a.txt", *b"HELLO")]);
//!
//! // identical bytes are not a change, so nothing is rebuilt
//! let result = engine
//!     .batch([FileChange::update("/src/a.txt", *b"hello")], [])
//!     .unwrap();
//! assert!(result.is_empty());
//! ```
//!
//! ## How rebuilds are decided
//!
//! Every import a build function performs records a dependency edge for its
//! build path. On the next batch, a stage rebuilds the paths listed as
//! changed plus every path whose last build read something now changed,
//! internal or external. Outputs of builds that no longer happen surface as
//! deletions in the batch result.

pub mod context;
pub mod engine;
pub mod error;
pub mod importer;
pub mod path;
pub mod pattern;
pub mod relation;
pub mod stage;
pub mod store;

#[cfg(test)]
mod relation_proptest;

pub use context::{BuildContext, ImportedFile};
pub use engine::{default_event_sink, Engine, EngineBuilder, EventSink, StageEvent};
pub use error::{Error, Result};
pub use importer::{ImportResult, Importer};
pub use pattern::{MatcherCache, Pattern};
pub use relation::Relation;
pub use stage::{BuildOutput, OutputFile};
pub use store::{ContentStore, FileChange, MemoryStore};
