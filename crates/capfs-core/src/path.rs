//! Slash-separated paths relative to a filesystem root.
//!
//! Paths handled here never start with `/` and never contain `.`, `..` or
//! empty components. The empty string denotes the root.

use crate::error::{FsError, FsResult};

/// Checks that `name` is a single, usable path component.
pub fn validate_name(name: &str) -> FsResult<()> {
    if name.is_empty() || name == "." || name.contains('/') || name.contains('\0') {
        return Err(FsError::InvalidArgument(format!("invalid name: {name:?}")));
    }
    if name == ".." {
        return Err(FsError::CrossedBoundary(name.to_string()));
    }
    Ok(())
}

/// Joins a normalized parent path and a single name component.
pub fn join(parent: &str, name: &str) -> FsResult<String> {
    validate_name(name)?;
    if parent.is_empty() {
        Ok(name.to_string())
    } else {
        Ok(format!("{parent}/{name}"))
    }
}

/// Normalizes an arbitrary slash-separated path.
///
/// Leading slashes, empty components and `.` are dropped and `..` pops the
/// previous component. A `..` that would climb above the root is an error.
pub fn normalize(path: &str) -> FsResult<String> {
    let mut parts: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(FsError::CrossedBoundary(path.to_string()));
                }
            }
            other => parts.push(other),
        }
    }
    Ok(parts.join("/"))
}

/// Returns true if `path` is already in normalized form.
pub fn is_normalized(path: &str) -> bool {
    path.is_empty() || path.split('/').all(|c| validate_name(c).is_ok())
}

/// The parent of a normalized path (the root is its own parent).
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// The final component of a normalized path (empty for the root).
pub fn file_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Returns true if `path` equals `ancestor` or lies beneath it.
pub fn starts_with(path: &str, ancestor: &str) -> bool {
    if ancestor.is_empty() {
        return true;
    }
    path == ancestor
        || (path.len() > ancestor.len()
            && path.starts_with(ancestor)
            && path.as_bytes()[ancestor.len()] == b'/')
}

/// Replaces the `from` prefix of `path` with `to`.
///
/// Returns `None` when `path` does not lie under `from`.
pub fn rebase(path: &str, from: &str, to: &str) -> Option<String> {
    if !starts_with(path, from) {
        return None;
    }
    let rest = path[from.len()..].trim_start_matches('/');
    if rest.is_empty() {
        Some(to.to_string())
    } else if to.is_empty() {
        Some(rest.to_string())
    } else {
        Some(format!("{to}/{rest}"))
    }
}
