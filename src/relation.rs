//! Many-to-many path relation used for dependency and output bookkeeping
//!
//! Each stage keeps two of these: one recording "the last successful build of
//! `owner` read `path`" and one recording "the last successful build of
//! `owner` produced `path`". Both sides are indexed, so reverse lookups
//! ("who read this changed file?") are O(1) on the key.
//!
//! Set semantics throughout: no duplicate pairs, no ordering contract.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// A many-to-many relation over two labelled sides, "left" and "right"
#[derive(Debug, Clone, Default)]
pub struct Relation {
    by_left: HashMap<PathBuf, HashSet<PathBuf>>,
    by_right: HashMap<PathBuf, HashSet<PathBuf>>,
    len: usize,
}

impl Relation {
    /// Create a new empty relation
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the pair `(left, right)`. Idempotent; returns `true` if the pair
    /// was newly inserted.
    pub fn add(&mut self, left: &Path, right: &Path) -> bool {
        let inserted = self
            .by_left
            .entry(left.to_path_buf())
            .or_default()
            .insert(right.to_path_buf());
        if inserted {
            self.by_right
                .entry(right.to_path_buf())
                .or_default()
                .insert(left.to_path_buf());
            self.len += 1;
        }
        inserted
    }

    /// Remove the pair `(left, right)`; returns `true` if it was present.
    pub fn remove(&mut self, left: &Path, right: &Path) -> bool {
        let removed = match self.by_left.get_mut(left) {
            Some(rights) => rights.remove(right),
            None => false,
        };
        if removed {
            if self.by_left.get(left).is_some_and(HashSet::is_empty) {
                self.by_left.remove(left);
            }
            if let Some(lefts) = self.by_right.get_mut(right) {
                lefts.remove(left);
                if lefts.is_empty() {
                    self.by_right.remove(right);
                }
            }
            self.len -= 1;
        }
        removed
    }

    /// Whether the pair `(left, right)` is present.
    pub fn contains(&self, left: &Path, right: &Path) -> bool {
        self.by_left
            .get(left)
            .is_some_and(|rights| rights.contains(right))
    }

    /// All right-values paired with `left`.
    pub fn rights_for<'a>(&'a self, left: &Path) -> impl Iterator<Item = &'a Path> {
        self.by_left
            .get(left)
            .into_iter()
            .flatten()
            .map(PathBuf::as_path)
    }

    /// All left-values paired with `right`.
    pub fn lefts_for<'a>(&'a self, right: &Path) -> impl Iterator<Item = &'a Path> {
        self.by_right
            .get(right)
            .into_iter()
            .flatten()
            .map(PathBuf::as_path)
    }

    /// All distinct left-values.
    pub fn lefts(&self) -> impl Iterator<Item = &Path> {
        self.by_left.keys().map(PathBuf::as_path)
    }

    /// All distinct right-values.
    pub fn rights(&self) -> impl Iterator<Item = &Path> {
        self.by_right.keys().map(PathBuf::as_path)
    }

    /// Iterate over all `(left, right)` pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (&Path, &Path)> {
        self.by_left.iter().flat_map(|(left, rights)| {
            rights
                .iter()
                .map(move |right| (left.as_path(), right.as_path()))
        })
    }

    /// Number of distinct pairs.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the relation holds no pairs.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
