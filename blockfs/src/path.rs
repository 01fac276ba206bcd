//! Path canonicalization. Canonical paths are absolute, have `.` and `..` resolved,
//! and carry no trailing slash; they are the keys of the file table.

use crate::error::{FsError, Result};
use regex::Regex;
use std::sync::OnceLock;

pub const ROOT: &str = "/";

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // The pattern is a literal, compiling it cannot fail.
    PATTERN.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_./-]+$").unwrap())
}

/// Checks the raw path string against the allowed character set.
pub fn validate_name(path: &str) -> Result<()> {
    if name_pattern().is_match(path) {
        Ok(())
    } else {
        Err(FsError::InvalidName(path.to_string()))
    }
}

/// Converts any path into its canonical absolute form. A `..` that would climb
/// above the root is ignored.
pub fn resolve(path: &str) -> String {
    if path == ROOT {
        return ROOT.to_string();
    }

    let mut resolved: Vec<&str> = Vec::new();
    for part in path.split('/').filter(|p| !p.is_empty()) {
        match part {
            "." => {}
            ".." => {
                resolved.pop();
            }
            name => resolved.push(name),
        }
    }

    format!("/{}", resolved.join("/"))
}

/// Parent of a canonical path. The root is its own parent.
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => ROOT,
        Some(i) => &path[..i],
    }
}

/// Last component of a canonical path, empty for the root.
pub fn file_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[i + 1..],
        None => path,
    }
}

/// Appends a single component to a canonical directory path.
pub fn join(dir: &str, name: &str) -> String {
    format!("{}{}", child_prefix(dir), name)
}

/// The prefix every strict descendant of `dir` starts with.
pub fn child_prefix(dir: &str) -> String {
    if dir == ROOT {
        ROOT.to_string()
    } else {
        format!("{}/", dir)
    }
}

/// True when `path` lies strictly below `dir`. Both must be canonical.
pub fn is_descendant(path: &str, dir: &str) -> bool {
    path != dir && path.starts_with(&child_prefix(dir))
}

/// Every proper ancestor of a canonical path except the root, outermost first.
/// `/a/b/c` yields `/a` and `/a/b`.
pub fn ancestors(path: &str) -> Vec<String> {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    (1..parts.len())
        .map(|n| format!("/{}", parts[..n].join("/")))
        .collect()
}
