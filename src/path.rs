//! Path manipulation utilities for conveyor
//!
//! All resolution here is lexical: `.` and `..` components are folded without
//! touching the filesystem, so the engine behaves identically for paths that
//! exist only inside content stores.

use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Lexically normalize a path, resolving `.` and `..` components.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                // `..` at the root stays at the root
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolve `path` against `base`, requiring the result to stay inside `base`.
///
/// Relative paths are joined onto `base`; absolute paths are normalized and
/// checked. A result outside `base` is a fatal `PathEscape` error.
pub fn resolve_within(base: &Path, path: &Path) -> Result<PathBuf> {
    let resolved = if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&base.join(path))
    };

    if resolved.starts_with(base) {
        Ok(resolved)
    } else {
        Err(Error::PathEscape {
            path: resolved,
            base: base.to_path_buf(),
        })
    }
}

/// Base-relative form of a path, or `None` when it falls outside `base`.
pub fn relative_to_base(base: &Path, path: &Path) -> Option<PathBuf> {
    path.strip_prefix(base).ok().map(Path::to_path_buf)
}
