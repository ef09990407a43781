//! Build-path patterns and the per-stage matcher cache
//!
//! Build functions test their base-relative path against a `Pattern`, which
//! may be a single glob, a list of globs, a pre-compiled regex, or an
//! arbitrary predicate. Compiled glob matchers are memoized per stage, keyed
//! by pattern text, so repeated `matches` calls across invocations do not
//! recompile. The cache is deliberately stage-scoped rather than
//! process-global, so independently constructed engines never share state.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};

/// A pattern a build function can match its build path against
#[derive(Clone)]
pub enum Pattern {
    /// Single glob, e.g. `pages/**/*.md`.
    Glob(String),
    /// Any-of list of globs.
    Globs(Vec<String>),
    /// Pre-compiled regular expression.
    Regex(regex::Regex),
    /// Arbitrary predicate over the base-relative path.
    Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Glob(g) => f.debug_tuple("Glob").field(g).finish(),
            Pattern::Globs(gs) => f.debug_tuple("Globs").field(gs).finish(),
            Pattern::Regex(re) => f.debug_tuple("Regex").field(&re.as_str()).finish(),
            Pattern::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl From<&str> for Pattern {
    fn from(glob: &str) -> Self {
        Pattern::Glob(glob.to_string())
    }
}

impl From<String> for Pattern {
    fn from(glob: String) -> Self {
        Pattern::Glob(glob)
    }
}

impl From<Vec<String>> for Pattern {
    fn from(globs: Vec<String>) -> Self {
        Pattern::Globs(globs)
    }
}

impl From<regex::Regex> for Pattern {
    fn from(re: regex::Regex) -> Self {
        Pattern::Regex(re)
    }
}

impl Pattern {
    /// Build a predicate pattern.
    pub fn predicate(f: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Pattern::Predicate(Arc::new(f))
    }
}

/// Stage-scoped cache of compiled glob matchers, keyed by pattern text
#[derive(Debug, Default)]
pub struct MatcherCache {
    compiled: Mutex<HashMap<String, glob::Pattern>>,
}

impl MatcherCache {
    /// Create a new empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Test `rel_path` against `pattern`, memoizing compiled globs.
    pub fn matches(&self, pattern: &Pattern, rel_path: &str) -> Result<bool> {
        match pattern {
            Pattern::Glob(glob) => self.glob_matches(glob, rel_path),
            Pattern::Globs(globs) => {
                for glob in globs {
                    if self.glob_matches(glob, rel_path)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Pattern::Regex(re) => Ok(re.is_match(rel_path)),
            Pattern::Predicate(f) => Ok(f(rel_path)),
        }
    }

    /// Number of compiled globs currently cached.
    pub fn len(&self) -> usize {
        self.compiled.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Whether no globs have been compiled yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn glob_matches(&self, text: &str, rel_path: &str) -> Result<bool> {
        let mut cache = self.compiled.lock().map_err(|_| Error::LockPoisoned {
            context: "matcher cache".to_string(),
        })?;
        if let Some(compiled) = cache.get(text) {
            return Ok(compiled.matches(rel_path));
        }
        let compiled = glob::Pattern::new(text)?;
        let hit = compiled.matches(rel_path);
        cache.insert(text.to_string(), compiled);
        Ok(hit)
    }
}
