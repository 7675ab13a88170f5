//! Working-tree handles, read through `git2`.

use std::path::{Path, PathBuf};

use git2::Repository;
use tracing::{debug, info};

use crate::errors::RepositoryError;

/// A working-tree root the controller may merge into.
///
/// The core only reads through the handle; every mutation goes through the
/// command gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryHandle {
    root: PathBuf,
    name: String,
}

impl RepositoryHandle {
    /// Wrap a root path without checking it. Used by hosts that already know
    /// the path is a working tree, and by tests with a scripted gateway.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string());
        Self { root, name }
    }

    /// Open the working tree that contains `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let path = path.as_ref();
        let repo = Repository::discover(path)
            .map_err(|_| RepositoryError::NotFound(path.display().to_string()))?;
        let workdir = repo
            .workdir()
            .ok_or_else(|| RepositoryError::Bare(path.display().to_string()))?;
        let root = workdir.canonicalize()?;
        info!(root = %root.display(), "opened working tree");
        Ok(Self::new(root))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory name of the root, used as the display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current branch name, or the short revision when HEAD is detached.
    ///
    /// Returns `"(detached)"` if neither can be read (unborn branch, missing
    /// repository).
    pub fn current_ref(&self) -> String {
        match self.read_head() {
            Ok(name) => name,
            Err(e) => {
                debug!(root = %self.root.display(), error = %e, "could not read HEAD");
                "(detached)".to_string()
            }
        }
    }

    fn read_head(&self) -> Result<String, git2::Error> {
        let repo = Repository::open(&self.root)?;
        let head = repo.head()?;
        if head.is_branch() {
            if let Some(name) = head.shorthand() {
                return Ok(name.to_string());
            }
        }
        let commit = head.peel_to_commit()?;
        let id = commit.id().to_string();
        Ok(id[..id.len().min(10)].to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_with_commit(dir: &Path) -> Repository {
        let repo = Repository::init(dir).unwrap();
        std::fs::write(dir.join("f.txt"), "c").unwrap();
        {
            let mut index = repo.index().unwrap();
            index.add_path(Path::new("f.txt")).unwrap();
            index.write().unwrap();
            let tree_id = index.write_tree().unwrap();
            let tree = repo.find_tree(tree_id).unwrap();
            let sig = git2::Signature::now("T", "t@t.com").unwrap();
            repo.commit(Some("HEAD"), &sig, &sig, "init", &tree, &[])
                .unwrap();
        }
        repo
    }

    #[test]
    fn test_name_from_root() {
        let handle = RepositoryHandle::new("/work/service-a");
        assert_eq!(handle.name(), "service-a");
        assert_eq!(handle.root(), Path::new("/work/service-a"));
    }

    #[test]
    fn test_open_and_current_branch() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_with_commit(dir.path());
        let branch = repo.head().unwrap().shorthand().unwrap().to_string();

        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let handle = RepositoryHandle::open(dir.path().join("sub")).unwrap();
        assert_eq!(handle.root(), dir.path().canonicalize().unwrap());
        assert_eq!(handle.current_ref(), branch);
    }

    #[test]
    fn test_detached_head_shows_revision() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_with_commit(dir.path());
        let oid = repo.head().unwrap().target().unwrap();
        repo.set_head_detached(oid).unwrap();

        let handle = RepositoryHandle::open(dir.path()).unwrap();
        assert_eq!(handle.current_ref(), oid.to_string()[..10]);
    }

    #[test]
    fn test_open_not_a_repo() {
        let dir = tempfile::tempdir().unwrap();
        let result = RepositoryHandle::open(dir.path());
        assert!(matches!(result, Err(RepositoryError::NotFound(_))));
    }

    #[test]
    fn test_current_ref_on_missing_repo() {
        let handle = RepositoryHandle::new("/nonexistent/repo");
        assert_eq!(handle.current_ref(), "(detached)");
    }
}
