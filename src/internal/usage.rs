//! Cross-references validation calls in spec sources against the aggregate.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

use crate::internal::aggregate::AggregateRoot;
use crate::internal::models::{SNAPSHOTS_DIR, SPEC_FILE_PATTERN, ScreenshotKey};
use crate::internal::naming::is_screenshot_validation_call;
use crate::internal::profile::Profile;
use crate::syntax::{CallIndex, CallTree, Position};
use crate::utils::paths::{relative_slash, strip_extension, to_slash};
use crate::vfs::FileSystem;

/// A parsed spec source file.
#[derive(Debug, Clone)]
pub struct SpecSource {
    pub path: PathBuf,
    /// Root-relative path without extension; equals the spec identity's display name.
    pub spec_id: String,
    pub tree: CallTree,
}

impl SpecSource {
    pub fn load(fs: &dyn FileSystem, test_root: &Path, path: &Path) -> Result<Self> {
        let spec_id = relative_slash(test_root, path)
            .map(|relative| strip_extension(&relative).to_string())
            .with_context(|| format!("{} is outside the test root", path.display()))?;
        let source = fs.read_to_string(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            spec_id,
            tree: CallTree::parse(&source)
                .with_context(|| format!("Failed to parse {}", path.display()))?,
        })
    }

    /// Screenshot names resolved from every validation call, with the position
    /// of the name literal or of the call when the name was defaulted.
    pub fn resolved_names(&self, profile: Profile) -> Vec<(String, Position)> {
        self.tree
            .calls()
            .iter()
            .enumerate()
            .filter(|(_, call)| is_screenshot_validation_call(call))
            .filter_map(|(id, call)| {
                let name = profile.resolve_with_fallback(&self.tree, id);
                let position = call
                    .name_arg
                    .as_ref()
                    .map(|arg| arg.position)
                    .unwrap_or(call.position);
                match name.is_empty() {
                    true => None,
                    false => Some((name, position)),
                }
            })
            .collect()
    }
}

/// Outcome of a navigate-to-usage lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageLookup {
    Found { file: PathBuf, position: Position },
    NoSpecFile,
    NoMatchingCall,
}

/// A validation call whose screenshot has no identity in the aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingScreenshot {
    pub key: ScreenshotKey,
    pub file: PathBuf,
    pub position: Position,
}

pub struct UsageScanner<'a> {
    fs: &'a dyn FileSystem,
    profile: Profile,
    test_root: &'a Path,
    enable_metrics: bool,
}

impl<'a> UsageScanner<'a> {
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

    /// Every spec source file under the test root, outside the snapshot trees.
    pub fn spec_files(&self) -> Result<Vec<PathBuf>> {
        let snapshots = format!("/{SNAPSHOTS_DIR}/");
        let mut files: Vec<PathBuf> = self
            .fs
            .list_recursive(self.test_root)?
            .into_iter()
            .filter(|entry| !entry.is_dir && SPEC_FILE_PATTERN.is_match(entry.name()))
            .filter(|entry| !to_slash(&entry.path).contains(&snapshots))
            .map(|entry| entry.path)
            .collect();
        files.sort();
        Ok(files)
    }

    /// Flag every screenshot identity no validation call resolves to.
    ///
    /// Updates the `unused` flag on each identity and returns the unused keys.
    pub fn find_unused(&self, aggregate: &mut AggregateRoot) -> Result<Vec<ScreenshotKey>> {
        let start = Instant::now();
        let mut candidates: BTreeSet<ScreenshotKey> = aggregate.keys().into_iter().collect();
        let mut scanned = 0usize;

        for path in self.spec_files()? {
            if candidates.is_empty() {
                debug!("Every screenshot is referenced, stopping scan");
                break;
            }
            let source = SpecSource::load(self.fs, self.test_root, &path)?;
            scanned += 1;
            for (name, _) in source.resolved_names(self.profile) {
                candidates.remove(&ScreenshotKey::new(&source.spec_id, name));
            }
        }

        for spec in aggregate.specs_mut() {
            let spec_name = spec.display_name.clone();
            for screenshot in spec.screenshots_mut() {
                let key = ScreenshotKey::new(&spec_name, &screenshot.display_name);
                screenshot.set_unused(candidates.contains(&key));
            }
        }

        info!(unused = candidates.len(), scanned, "Scanned spec files for unused screenshots");
        if self.enable_metrics {
            debug!(elapsed = ?start.elapsed(), "usage.find_unused");
        }
        Ok(candidates.into_iter().collect())
    }

    /// Validation calls whose resolved screenshot is not in the aggregate.
    pub fn find_missing(&self, aggregate: &AggregateRoot) -> Result<Vec<MissingScreenshot>> {
        let mut missing = Vec::new();
        for path in self.spec_files()? {
            let source = SpecSource::load(self.fs, self.test_root, &path)?;
            for (name, position) in source.resolved_names(self.profile) {
                let key = ScreenshotKey::new(&source.spec_id, name);
                if aggregate.screenshot(&key).is_none() && !missing.iter().any(|m: &MissingScreenshot| m.key == key) {
                    missing.push(MissingScreenshot {
                        key,
                        file: source.path.clone(),
                        position,
                    });
                }
            }
        }
        info!(missing = missing.len(), "Scanned spec files for missing screenshots");
        Ok(missing)
    }

    /// Locate the validation call that produces `key` in its spec source.
    pub fn find_usage(&self, aggregate: &AggregateRoot, key: &ScreenshotKey) -> Result<UsageLookup> {
        let spec = aggregate
            .spec(&key.spec)
            .filter(|spec| spec.find(&key.screenshot).is_some())
            .with_context(|| format!("screenshot {key} does not exist"))?;
        let Some(spec_file) = spec.spec_file.as_deref() else {
            return Ok(UsageLookup::NoSpecFile);
        };
        if !self.fs.exists(spec_file) {
            return Ok(UsageLookup::NoSpecFile);
        }

        let source = SpecSource::load(self.fs, self.test_root, spec_file)?;
        let found = source
            .resolved_names(self.profile)
            .into_iter()
            .find(|(name, _)| *name == key.screenshot);
        Ok(match found {
            Some((_, position)) => UsageLookup::Found {
                file: source.path,
                position,
            },
            None => UsageLookup::NoMatchingCall,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::aggregate::SpecIdentity;
    use crate::internal::models::VariantCategory;
    use crate::vfs::LocalFileSystem;
    use std::fs;
    use tempfile::TempDir;

    const SPEC_SOURCE: &str = "describe('button', () => {\n  it('default', () => {\n    Terra.validates.element();\n  });\n  it('hovered', () => {\n    Terra.validates.element('hover [hovered]');\n  });\n  it('missing', () => {\n    Terra.validates.screenshot('focus');\n  });\n});\n";

    fn setup() -> (TempDir, AggregateRoot) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("button-spec.js"), SPEC_SOURCE).unwrap();
        let mut aggregate = AggregateRoot::new();
        let spec = aggregate.insert_spec(SpecIdentity::new("button-spec"));
        spec.spec_file = Some(dir.path().join("button-spec.js"));
        for name in ["button[default].png", "button[hovered].png", "button[stale].png"] {
            spec.find_or_insert(name)
                .add_file(VariantCategory::Reference, dir.path().join(name));
        }
        (dir, aggregate)
    }

    #[test]
    fn test_find_unused_flags_identities() {
        let (dir, mut aggregate) = setup();
        let scanner = UsageScanner::new(&LocalFileSystem, Profile::Legacy, dir.path());

        let unused = scanner.find_unused(&mut aggregate).unwrap();

        assert_eq!(unused, vec![ScreenshotKey::new("button-spec", "button[stale].png")]);
        let spec = aggregate.spec("button-spec").unwrap();
        assert!(spec.find("button[stale].png").unwrap().is_unused());
        assert!(!spec.find("button[default].png").unwrap().is_unused());
    }

    #[test]
    fn test_modern_profile_has_no_default_name() {
        let (dir, mut aggregate) = setup();
        let scanner = UsageScanner::new(&LocalFileSystem, Profile::Modern, dir.path());
        let unused = scanner.find_unused(&mut aggregate).unwrap();
        assert_eq!(unused.len(), 3);
    }

    #[test]
    fn test_find_missing() {
        let (dir, aggregate) = setup();
        let scanner = UsageScanner::new(&LocalFileSystem, Profile::Legacy, dir.path());
        let missing = scanner.find_missing(&aggregate).unwrap();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].key, ScreenshotKey::new("button-spec", "button[focus].png"));
        assert_eq!(missing[0].position, Position { line: 9, column: 32 });
    }

    #[test]
    fn test_find_usage() {
        let (dir, aggregate) = setup();
        let scanner = UsageScanner::new(&LocalFileSystem, Profile::Legacy, dir.path());

        let hovered = scanner
            .find_usage(&aggregate, &ScreenshotKey::new("button-spec", "button[hovered].png"))
            .unwrap();
        assert_eq!(
            hovered,
            UsageLookup::Found {
                file: dir.path().join("button-spec.js"),
                position: Position { line: 6, column: 29 },
            }
        );

        let defaulted = scanner
            .find_usage(&aggregate, &ScreenshotKey::new("button-spec", "button[default].png"))
            .unwrap();
        assert_eq!(
            defaulted,
            UsageLookup::Found {
                file: dir.path().join("button-spec.js"),
                position: Position { line: 3, column: 5 },
            }
        );

        let stale = scanner
            .find_usage(&aggregate, &ScreenshotKey::new("button-spec", "button[stale].png"))
            .unwrap();
        assert_eq!(stale, UsageLookup::NoMatchingCall);
    }

    #[test]
    fn test_find_usage_without_spec_file() {
        let (dir, mut aggregate) = setup();
        aggregate.spec_mut("button-spec").unwrap().spec_file = None;
        let scanner = UsageScanner::new(&LocalFileSystem, Profile::Legacy, dir.path());
        let lookup = scanner
            .find_usage(&aggregate, &ScreenshotKey::new("button-spec", "button[stale].png"))
            .unwrap();
        assert_eq!(lookup, UsageLookup::NoSpecFile);
    }
}
