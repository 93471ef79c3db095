use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

use crate::internal::aggregate::{AggregateRoot, SpecIdentity};
use crate::internal::models::{SNAPSHOTS_DIR, SPEC_FILE_PATTERN, VariantCategory};
use crate::internal::naming::SCREENSHOT_EXTENSION;
use crate::internal::profile::Profile;
use crate::utils::paths::{file_name, relative_slash, strip_extension, to_slash};
use crate::vfs::{FileSystem, FsEntry};

/// Builds a fresh [`AggregateRoot`] from a full listing of the test root.
pub struct IdentityAggregator<'a> {
    fs: &'a dyn FileSystem,
    profile: Profile,
    test_root: &'a Path,
    enable_metrics: bool,
}

impl<'a> IdentityAggregator<'a> {
    pub fn new(fs: &'a dyn FileSystem, profile: Profile, test_root: &'a Path) -> Self {
        Self {
            fs,
            profile,
            test_root,
            enable_metrics: false,
        }
    }

    pub fn with_metrics(mut self, enable_metrics: bool) -> Self {
        self.enable_metrics = enable_metrics;
        self
    }

    /// Walk the test root and group every screenshot under its spec and display name.
    ///
    /// Reference folders are processed first and are the only ones allowed to
    /// create spec identities or record spec folders. Diff and latest images
    /// join a spec found by reference; those of an unknown spec are dropped.
    pub fn rebuild(&self) -> Result<AggregateRoot> {
        let start = Instant::now();
        let entries = self
            .fs
            .list_recursive(self.test_root)
            .with_context(|| format!("failed to scan test root {}", self.test_root.display()))?;

        let spec_files = self.spec_files(&entries);
        let mut files_by_folder: HashMap<&Path, Vec<&FsEntry>> = HashMap::new();
        for entry in entries.iter().filter(|entry| !entry.is_dir) {
            if let Some(parent) = entry.path.parent() {
                files_by_folder.entry(parent).or_default().push(entry);
            }
        }

        let mut root = AggregateRoot::new();
        let mut dropped = 0usize;
        for category in VariantCategory::AGGREGATION_ORDER {
            for folder in self.profile.collect_spec_folders(category, &entries) {
                let Some(spec_name) = self.spec_identity_name(&folder.path) else {
                    debug!(folder = %folder.path.display(), "Spec folder outside a snapshot tree, skipping");
                    continue;
                };
                let screenshots = files_by_folder
                    .get(folder.path.as_path())
                    .map(Vec::as_slice)
                    .unwrap_or_default();

                let spec = match category {
                    VariantCategory::Reference => {
                        let spec = root.insert_spec(SpecIdentity::new(&spec_name));
                        if spec.spec_file.is_none() {
                            spec.spec_file = spec_files.get(&spec_name).cloned();
                        }
                        spec.add_folder(folder.path.clone());
                        spec
                    }
                    VariantCategory::Diff | VariantCategory::Latest => match root.spec_mut(&spec_name) {
                        Some(spec) => spec,
                        None => {
                            debug!(
                                folder = %folder.path.display(),
                                %category,
                                files = screenshots.len(),
                                "No reference spec folder, dropping images"
                            );
                            dropped += screenshots.len();
                            continue;
                        }
                    },
                };

                for entry in screenshots {
                    if !entry.name().ends_with(SCREENSHOT_EXTENSION) {
                        continue;
                    }
                    if !self.fs.exists(&entry.path) {
                        debug!(path = %entry.path.display(), "Screenshot vanished before attachment");
                        continue;
                    }
                    spec.find_or_insert(&file_name(&entry.path))
                        .add_file(category, entry.path.clone());
                }
            }
        }
        root.sort_all();

        let stats = root.statistics();
        info!(
            test_root = %self.test_root.display(),
            profile = %self.profile,
            specs = stats.spec_count,
            screenshots = stats.screenshot_count,
            references = stats.reference_count,
            dropped,
            "Rebuilt screenshot aggregate"
        );
        if self.enable_metrics {
            debug!(elapsed = ?start.elapsed(), entries = entries.len(), "aggregator.rebuild");
        }
        Ok(root)
    }

    /// `<path of the snapshot tree's owner relative to the root>/<spec folder name>`.
    ///
    /// Matches the spec source path relative to the root without its extension.
    pub fn spec_identity_name(&self, folder: &Path) -> Option<String> {
        let depth = self.profile.category_depth()?;
        let snapshots = folder.ancestors().nth(depth + 1)?;
        if snapshots.file_name()? != SNAPSHOTS_DIR {
            return None;
        }
        let owner = snapshots.parent()?;
        let relative = relative_slash(self.test_root, owner)?;
        let name = file_name(folder);
        Some(match relative.is_empty() {
            true => name,
            false => format!("{relative}/{name}"),
        })
    }

    /// Spec sources keyed by their root-relative path without extension.
    fn spec_files(&self, entries: &[FsEntry]) -> HashMap<String, PathBuf> {
        entries
            .iter()
            .filter(|entry| !entry.is_dir && SPEC_FILE_PATTERN.is_match(entry.name()))
            .filter(|entry| !to_slash(&entry.path).contains(&format!("/{SNAPSHOTS_DIR}/")))
            .filter_map(|entry| {
                let relative = relative_slash(self.test_root, &entry.path)?;
                Some((strip_extension(&relative).to_string(), entry.path.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::LocalFileSystem;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"png").unwrap();
    }

    #[test]
    fn test_spec_identity_name() {
        let root = PathBuf::from("/p/tests/wdio");
        let aggregator = IdentityAggregator::new(&LocalFileSystem, Profile::Legacy, &root);
        assert_eq!(
            aggregator.spec_identity_name(&root.join("__snapshots__/reference/en/chrome_huge/button-spec")),
            Some("button-spec".to_string())
        );
        assert_eq!(
            aggregator.spec_identity_name(&root.join("nested/__snapshots__/diff/en/chrome_huge/button-spec")),
            Some("nested/button-spec".to_string())
        );
        assert_eq!(
            aggregator.spec_identity_name(&root.join("other/reference/en/chrome_huge/button-spec")),
            None
        );
    }

    #[test]
    fn test_rebuild_groups_variants_and_links_spec_file() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        touch(root, "button-spec.js");
        touch(root, "__snapshots__/reference/en/chrome_huge/button-spec/b[default].png");
        touch(root, "__snapshots__/reference/en/chrome_medium/button-spec/b[default].png");
        touch(root, "__snapshots__/reference/en/chrome_huge/button-spec/a[default].png");
        touch(root, "__snapshots__/latest/en/chrome_huge/button-spec/a[default].png");
        touch(root, "__snapshots__/diff/en/chrome_huge/button-spec/a[default].png");

        let aggregate = IdentityAggregator::new(&LocalFileSystem, Profile::Legacy, root)
            .rebuild()
            .unwrap();

        assert_eq!(aggregate.specs().len(), 1);
        let spec = &aggregate.specs()[0];
        assert_eq!(spec.display_name, "button-spec");
        assert_eq!(spec.spec_file.as_deref(), Some(root.join("button-spec.js").as_path()));
        assert_eq!(spec.folders.len(), 2);

        let names: Vec<&str> = spec.screenshots().iter().map(|s| s.display_name.as_str()).collect();
        assert_eq!(names, vec!["a[default].png", "b[default].png"]);
        let a = spec.find("a[default].png").unwrap();
        assert!(a.has_diff() && a.has_latest());
        assert_eq!(spec.find("b[default].png").unwrap().files(VariantCategory::Reference).len(), 2);
    }

    #[test]
    fn test_diff_only_screenshot_joins_referenced_spec() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        touch(root, "__snapshots__/reference/en/chrome_huge/button-spec/button[default].png");
        touch(root, "__snapshots__/diff/en/chrome_huge/button-spec/button[new].png");
        touch(root, "__snapshots__/latest/en/chrome_huge/button-spec/button[new].png");

        let aggregate = IdentityAggregator::new(&LocalFileSystem, Profile::Legacy, root)
            .rebuild()
            .unwrap();

        let spec = aggregate.spec("button-spec").unwrap();
        let names: Vec<&str> = spec.screenshots().iter().map(|s| s.display_name.as_str()).collect();
        assert_eq!(names, vec!["button[default].png", "button[new].png"]);
        let new = spec.find("button[new].png").unwrap();
        assert!(new.has_diff() && new.has_latest());
        assert!(new.files(VariantCategory::Reference).is_empty());
        assert_eq!(spec.folders.len(), 1);
    }

    /// Lists files that no longer exist by the time they are attached.
    struct StaleListing {
        vanished: PathBuf,
    }

    impl FileSystem for StaleListing {
        fn list_recursive(&self, root: &Path) -> Result<Vec<FsEntry>> {
            LocalFileSystem.list_recursive(root)
        }

        fn exists(&self, path: &Path) -> bool {
            path != self.vanished && LocalFileSystem.exists(path)
        }

        fn read_to_string(&self, path: &Path) -> Result<String> {
            LocalFileSystem.read_to_string(path)
        }

        fn delete(&self, path: &Path) -> Result<()> {
            LocalFileSystem.delete(path)
        }

        fn rename(&self, from: &Path, to: &Path) -> Result<()> {
            LocalFileSystem.rename(from, to)
        }

        fn copy(&self, from: &Path, to: &Path) -> Result<()> {
            LocalFileSystem.copy(from, to)
        }
    }

    #[test]
    fn test_vanished_files_are_not_attached() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        touch(root, "__snapshots__/reference/en/chrome_huge/button-spec/kept.png");
        touch(root, "__snapshots__/reference/en/chrome_huge/button-spec/gone.png");
        let fs = StaleListing {
            vanished: root.join("__snapshots__/reference/en/chrome_huge/button-spec/gone.png"),
        };

        let aggregate = IdentityAggregator::new(&fs, Profile::Legacy, root).rebuild().unwrap();

        let spec = aggregate.spec("button-spec").unwrap();
        assert!(spec.find("kept.png").is_some());
        assert!(spec.find("gone.png").is_none());
    }

    #[test]
    fn test_noop_profile_builds_nothing() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "__snapshots__/reference/en/chrome_huge/button-spec/b[default].png");
        let aggregate = IdentityAggregator::new(&LocalFileSystem, Profile::Noop, dir.path())
            .rebuild()
            .unwrap();
        assert!(aggregate.specs().is_empty());
    }
}
