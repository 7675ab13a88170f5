//! Building the ordered list of repositories for a run.
//!
//! Repositories come from explicit paths and/or from scanning the immediate
//! subdirectories of a discovery root, filtered by include/exclude globs on
//! the directory name.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use glob_match::glob_match;
use tracing::{debug, info, warn};

use super::repository::RepositoryHandle;
use crate::config::ReposConfig;
use crate::errors::RepositoryError;

/// Scan `root` for working trees one level deep.
///
/// A directory counts when it contains a `.git` entry (directory or file, so
/// linked worktrees and submodules are found too). Results are sorted by
/// directory name.
pub fn discover(
    root: &Path,
    include: &[String],
    exclude: &[String],
) -> Result<Vec<RepositoryHandle>, RepositoryError> {
    info!(root = %root.display(), "discovering repositories");
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(root)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir() && path.join(".git").exists())
        .collect();
    dirs.sort();

    let mut found = Vec::new();
    for dir in dirs {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !matches_filters(&name, include, exclude) {
            debug!(name, "filtered out");
            continue;
        }
        match RepositoryHandle::open(&dir) {
            Ok(handle) => found.push(handle),
            Err(e) => warn!(path = %dir.display(), error = %e, "skipping unreadable repository"),
        }
    }
    debug!(count = found.len(), "discovered repositories");
    Ok(found)
}

/// `include` empty means everything; any `exclude` match wins.
pub fn matches_filters(name: &str, include: &[String], exclude: &[String]) -> bool {
    let included = include.is_empty() || include.iter().any(|p| glob_match(p, name));
    let excluded = exclude.iter().any(|p| glob_match(p, name));
    included && !excluded
}

/// Resolve the configured sources plus any extra paths into handles.
///
/// Explicit paths come first, in the given order, then discovered ones.
/// Duplicate roots are dropped (first occurrence wins). An explicit path
/// that is not a working tree is an error; discovery skips those silently.
pub fn collect(
    config: &ReposConfig,
    extra_paths: &[PathBuf],
) -> Result<Vec<RepositoryHandle>, RepositoryError> {
    let mut handles = Vec::new();
    for path in config.paths.iter().chain(extra_paths.iter()) {
        handles.push(RepositoryHandle::open(path)?);
    }
    if let Some(ref root) = config.discover_root {
        handles.extend(discover(root, &config.include, &config.exclude)?);
    }

    let mut seen = HashSet::new();
    handles.retain(|h| seen.insert(h.root().to_path_buf()));
    Ok(handles)
}
