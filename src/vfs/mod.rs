//! File-system access used by the aggregator and the mutation coordinator.
//!
//! The engine never touches `std::fs` directly; listing, existence checks
//! and mutations all go through [`FileSystem`].

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use walkdir::WalkDir;

/// One file or directory found under a listed root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FsEntry {
    pub path: PathBuf,
    pub is_dir: bool,
}

impl FsEntry {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
        }
    }

    pub fn dir(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_dir: true,
        }
    }

    pub fn name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
    }
}

pub trait FileSystem: Send + Sync {
    /// Every file and directory below `root`, excluding `root` itself.
    fn list_recursive(&self, root: &Path) -> Result<Vec<FsEntry>>;

    fn exists(&self, path: &Path) -> bool;

    fn read_to_string(&self, path: &Path) -> Result<String>;

    fn delete(&self, path: &Path) -> Result<()>;

    /// Rename `from` to `to`; fails when `to` already exists.
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    fn copy(&self, from: &Path, to: &Path) -> Result<()>;
}

/// `std::fs` backed implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn list_recursive(&self, root: &Path) -> Result<Vec<FsEntry>> {
        let mut entries = Vec::new();
        for entry in WalkDir::new(root).min_depth(1).follow_links(false) {
            let entry =
                entry.with_context(|| format!("failed to list files under {}", root.display()))?;
            entries.push(FsEntry {
                is_dir: entry.file_type().is_dir(),
                path: entry.into_path(),
            });
        }
        Ok(entries)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
    }

    fn delete(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).with_context(|| format!("failed to delete {}", path.display()))
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        if to.exists() {
            anyhow::bail!("cannot rename {} onto existing {}", from.display(), to.display());
        }
        fs::rename(from, to)
            .with_context(|| format!("failed to rename {} to {}", from.display(), to.display()))
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        fs::copy(from, to)
            .map(|_| ())
            .with_context(|| format!("failed to copy {} to {}", from.display(), to.display()))
    }
}

/// Scoped write permission for file mutations.
///
/// Every mutating call runs while a [`WriteGuard`] is alive; the guard is
/// released when it goes out of scope, on success and on error alike.
#[derive(Debug, Default)]
pub struct WriteLock {
    inner: Mutex<()>,
}

pub struct WriteGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl WriteLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self) -> WriteGuard<'_> {
        let guard = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        WriteGuard { _guard: guard }
    }

    /// Run `op` while holding write permission.
    pub fn run<T>(&self, op: impl FnOnce() -> Result<T>) -> Result<T> {
        let _guard = self.acquire();
        op()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_list_recursive_excludes_root() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("a/b/c.png"), b"png").unwrap();

        let mut entries = LocalFileSystem.list_recursive(dir.path()).unwrap();
        entries.sort_by(|l, r| l.path.cmp(&r.path));

        assert_eq!(
            entries,
            vec![
                FsEntry::dir(dir.path().join("a")),
                FsEntry::dir(dir.path().join("a/b")),
                FsEntry::file(dir.path().join("a/b/c.png")),
            ]
        );
    }

    #[test]
    fn test_rename_refuses_existing_target() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("from.png");
        let to = dir.path().join("to.png");
        fs::write(&from, b"from").unwrap();
        fs::write(&to, b"to").unwrap();

        assert!(LocalFileSystem.rename(&from, &to).is_err());
        assert!(from.exists());
        assert_eq!(fs::read(&to).unwrap(), b"to");
    }

    #[test]
    fn test_delete_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = LocalFileSystem
            .delete(&dir.path().join("missing.png"))
            .unwrap_err();
        assert!(err.to_string().contains("failed to delete"));
    }

    #[test]
    fn test_write_lock_releases_on_error() {
        let lock = WriteLock::new();
        let result: Result<()> = lock.run(|| anyhow::bail!("boom"));
        assert!(result.is_err());
        // Acquiring again would deadlock if the guard had leaked.
        let _guard = lock.acquire();
    }
}
