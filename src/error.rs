//! # Error Handling
//!
//! Centralized error handling for the `conveyor` engine, built on the
//! `thiserror` library.
//!
//! The variants fall into three groups:
//!
//! - **Recoverable lookup failures** (`NotFound`, `IsDirectory`): expected
//!   outcomes of candidate-based imports. Multi-candidate lookups skip past
//!   them; `Error::is_recoverable` identifies them.
//! - **Contract violations** (`PathEscape`, `MalformedOutput`,
//!   `MalformedImport`): programmer errors in build functions or importers.
//!   Fatal for the single build path involved, never retried, and isolated so
//!   sibling build paths in the same batch are unaffected.
//! - **Engine errors** (`Busy`, `Config`, `LockPoisoned`) and wrapped
//!   infrastructure errors (`Glob`, `Regex`).
//!
//! The `Result` type alias is used throughout the crate to simplify
//! signatures.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for conveyor operations
#[derive(Error, Debug)]
pub enum Error {
    /// A path could not be served from the relevant content store or by any
    /// configured importer.
    #[error("file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// A path resolved to a directory where file contents were expected.
    ///
    /// Reserved for content stores that distinguish directories; the built-in
    /// `MemoryStore` never produces it.
    #[error("path is a directory: {}", path.display())]
    IsDirectory { path: PathBuf },

    /// A path resolved outside the engine's base directory.
    #[error("path escapes the base directory: {} (base: {})", path.display(), base.display())]
    PathEscape { path: PathBuf, base: PathBuf },

    /// A build function returned an output that violates the output contract
    /// (for example an empty output path).
    #[error("malformed build output for {}: {message}", path.display())]
    MalformedOutput { path: PathBuf, message: String },

    /// An importer returned a result that violates the importer contract.
    #[error("malformed importer result for {}: {message}", path.display())]
    MalformedImport { path: PathBuf, message: String },

    /// A user build function reported a failure.
    #[error("build failed for {}: {message}", path.display())]
    Build { path: PathBuf, message: String },

    /// A batch was submitted while a previous batch was still in flight.
    ///
    /// Fatal to that `batch` call only; engine state is unaffected.
    #[error("a batch is already in flight")]
    Busy,

    /// Invalid engine construction parameters.
    #[error("engine configuration error: {message}")]
    Config { message: String },

    /// A glob pattern error, wrapped from `glob::PatternError`.
    #[error("Glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),

    /// A regular expression error, wrapped from `regex::Error`.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// An error indicating that a mutex or other lock has been poisoned.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },
}

impl Error {
    /// Whether this is a recoverable lookup failure that candidate-based
    /// imports may skip past.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::NotFound { .. } | Error::IsDirectory { .. })
    }

    /// Convenience constructor for a build-function failure.
    pub fn build(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Build {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
