//! Bulk file mutations over every physical variant of one screenshot identity.
//!
//! Each operation acts on the files first, repairs the aggregate for the
//! files that succeeded, and reports the failed paths in one error.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use strum_macros::{Display, EnumIter};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::internal::aggregate::{AggregateRoot, ScreenshotIdentity};
use crate::internal::ledger::WriteLedger;
use crate::internal::models::{ScreenshotKey, VariantCategory};
use crate::internal::naming::SCREENSHOT_EXTENSION;
use crate::utils::paths::to_slash;
use crate::vfs::{FileSystem, WriteLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum MutationKind {
    #[strum(serialize = "delete")]
    Delete,
    #[strum(serialize = "rename")]
    Rename,
    #[strum(serialize = "replace-with-latest")]
    ReplaceWithLatest,
}

/// Actions offered on a screenshot identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum ScreenshotAction {
    Delete,
    Rename,
    ReplaceWithLatest,
    CompareLatest,
    ShowDiff,
}

impl ScreenshotAction {
    pub fn is_applicable(&self, screenshot: &ScreenshotIdentity) -> bool {
        match self {
            Self::Delete | Self::Rename => true,
            Self::ReplaceWithLatest | Self::CompareLatest => screenshot.has_latest(),
            Self::ShowDiff => screenshot.has_diff(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MutationError {
    #[error("screenshot {0} does not exist")]
    NotFound(ScreenshotKey),
    #[error("the new screenshot name must not be blank")]
    BlankName,
    #[error("the new screenshot name '{0}' is the same as the current one")]
    UnchangedName(String),
    #[error("screenshot {0} has no latest image")]
    NoLatest(ScreenshotKey),
    #[error("{} already exists", .0.display())]
    TargetExists(PathBuf),
    #[error("{kind} failed for {} file(s):\n{}", .failed.len(), join_paths(.failed))]
    Partial { kind: MutationKind, failed: Vec<PathBuf> },
}

impl MutationError {
    pub fn kind_failed(&self) -> Option<MutationKind> {
        match self {
            Self::Partial { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

pub(crate) fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub deleted: usize,
    pub spec_removed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameOutcome {
    pub renamed: usize,
    pub new_key: ScreenshotKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceOutcome {
    pub replaced: usize,
    pub diffs_removed: usize,
}

/// `path` with its `/__snapshots__/<from>` marker swapped for `<to>`.
fn counterpart_path(path: &Path, from: VariantCategory, to: VariantCategory) -> Option<PathBuf> {
    let slash = to_slash(path);
    let marker = from.marker();
    let start = slash.rfind(&format!("{marker}/"))?;
    let swapped = format!(
        "{}{}{}",
        &slash[..start],
        to.marker(),
        &slash[start + marker.len()..]
    );
    Some(PathBuf::from(swapped))
}

/// Ensure the `.png` extension; `None` when the name is blank.
fn complete_name(new_name: &str) -> Option<String> {
    let trimmed = new_name.trim();
    match trimmed.is_empty() {
        true => None,
        false if trimmed.ends_with(SCREENSHOT_EXTENSION) => Some(trimmed.to_string()),
        false => Some(format!("{trimmed}{SCREENSHOT_EXTENSION}")),
    }
}

#[derive(Clone)]
pub struct MutationCoordinator {
    fs: Arc<dyn FileSystem>,
    write_lock: Arc<WriteLock>,
    ledger: WriteLedger,
}

impl MutationCoordinator {
    pub fn new(fs: Arc<dyn FileSystem>, ledger: WriteLedger) -> Self {
        Self {
            fs,
            write_lock: Arc::new(WriteLock::new()),
            ledger,
        }
    }

    pub fn ledger(&self) -> &WriteLedger {
        &self.ledger
    }

    fn delete_file(&self, path: &Path, kind: MutationKind) -> anyhow::Result<()> {
        self.ledger.record(path, kind);
        self.write_lock.run(|| self.fs.delete(path))
    }

    /// Delete every variant of `key`.
    ///
    /// On any failure the identity stays in the aggregate with the files that
    /// could not be deleted; otherwise it is removed, along with its spec when
    /// that was the last screenshot.
    pub fn delete(&self, aggregate: &mut AggregateRoot, key: &ScreenshotKey) -> Result<DeleteOutcome, MutationError> {
        let files = aggregate
            .screenshot(key)
            .map(ScreenshotIdentity::all_files)
            .ok_or_else(|| MutationError::NotFound(key.clone()))?;

        let mut deleted = Vec::new();
        let mut failed = Vec::new();
        for (category, path) in files {
            match self.delete_file(&path, MutationKind::Delete) {
                Ok(()) => deleted.push((category, path)),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to delete screenshot");
                    failed.push(path);
                }
            }
        }

        let mut spec_removed = false;
        if let Some(spec) = aggregate.spec_mut(&key.spec) {
            if let Some(screenshot) = spec.find_mut(&key.screenshot) {
                for (category, path) in &deleted {
                    screenshot.remove_file(*category, path);
                }
            }
            if failed.is_empty()
                && spec.find(&key.screenshot).is_some_and(ScreenshotIdentity::is_empty)
            {
                spec.remove(&key.screenshot);
                spec_removed = spec.is_empty();
            }
        }
        if spec_removed {
            aggregate.remove_spec(&key.spec);
        }

        info!(screenshot = %key, deleted = deleted.len(), failed = failed.len(), "Deleted screenshot");
        match failed.is_empty() {
            true => Ok(DeleteOutcome {
                deleted: deleted.len(),
                spec_removed,
            }),
            false => Err(MutationError::Partial {
                kind: MutationKind::Delete,
                failed,
            }),
        }
    }

    /// Rename every variant of `key` to `new_name` in place.
    ///
    /// `.png` is appended when missing. Renamed files move to the identity
    /// carrying the new name, which is created when absent.
    pub fn rename(
        &self,
        aggregate: &mut AggregateRoot,
        key: &ScreenshotKey,
        new_name: &str,
    ) -> Result<RenameOutcome, MutationError> {
        let new_name = complete_name(new_name).ok_or(MutationError::BlankName)?;
        if new_name == key.screenshot {
            return Err(MutationError::UnchangedName(new_name));
        }
        let files = aggregate
            .screenshot(key)
            .map(ScreenshotIdentity::all_files)
            .ok_or_else(|| MutationError::NotFound(key.clone()))?;

        let moves: Vec<(VariantCategory, PathBuf, PathBuf)> = files
            .into_iter()
            .map(|(category, path)| {
                let target = path.with_file_name(&new_name);
                (category, path, target)
            })
            .collect();
        if let Some((_, _, target)) = moves.iter().find(|(_, _, target)| self.fs.exists(target)) {
            return Err(MutationError::TargetExists(target.clone()));
        }

        let mut renamed = Vec::new();
        let mut failed = Vec::new();
        for (category, from, to) in moves {
            self.ledger.record(&from, MutationKind::Rename);
            self.ledger.record(&to, MutationKind::Rename);
            match self.write_lock.run(|| self.fs.rename(&from, &to)) {
                Ok(()) => renamed.push((category, from, to)),
                Err(e) => {
                    warn!(path = %from.display(), error = %e, "Failed to rename screenshot");
                    failed.push(from);
                }
            }
        }

        if let Some(spec) = aggregate.spec_mut(&key.spec) {
            if let Some(old) = spec.find_mut(&key.screenshot) {
                for (category, from, _) in &renamed {
                    old.remove_file(*category, from);
                }
            }
            if !renamed.is_empty() {
                let target = spec.find_or_insert(&new_name);
                target.set_unused(false);
                for (category, _, to) in &renamed {
                    target.add_file(*category, to.clone());
                }
            }
            if spec.find(&key.screenshot).is_some_and(ScreenshotIdentity::is_empty) {
                spec.remove(&key.screenshot);
            }
            spec.sort();
        }

        let new_key = ScreenshotKey::new(&key.spec, &new_name);
        info!(from = %key, to = %new_key, renamed = renamed.len(), failed = failed.len(), "Renamed screenshot");
        match failed.is_empty() {
            true => Ok(RenameOutcome {
                renamed: renamed.len(),
                new_key,
            }),
            false => Err(MutationError::Partial {
                kind: MutationKind::Rename,
                failed,
            }),
        }
    }

    /// Promote the latest images of `key` to references.
    ///
    /// Each latest image replaces the reference at the same dimensional path,
    /// and the matching diff image is deleted. Latest images are kept.
    pub fn replace_with_latest(
        &self,
        aggregate: &mut AggregateRoot,
        key: &ScreenshotKey,
    ) -> Result<ReplaceOutcome, MutationError> {
        let screenshot = aggregate
            .screenshot(key)
            .ok_or_else(|| MutationError::NotFound(key.clone()))?;
        if !screenshot.has_latest() {
            return Err(MutationError::NoLatest(key.clone()));
        }
        let latests = screenshot.files(VariantCategory::Latest).to_vec();
        let references = screenshot.files(VariantCategory::Reference).to_vec();
        let diffs = screenshot.files(VariantCategory::Diff).to_vec();

        let mut removed_references = Vec::new();
        let mut added_references = Vec::new();
        let mut removed_diffs = Vec::new();
        let mut failed = Vec::new();
        let kind = MutationKind::ReplaceWithLatest;

        for latest in &latests {
            let reference = counterpart_path(latest, VariantCategory::Latest, VariantCategory::Reference)
                .and_then(|expected| references.iter().find(|r| to_slash(r) == to_slash(&expected)));
            let Some(reference) = reference else {
                debug!(latest = %latest.display(), "No reference at the same dimensional path, skipping");
                continue;
            };

            if let Err(e) = self.delete_file(reference, kind) {
                warn!(path = %reference.display(), error = %e, "Failed to delete reference screenshot");
                failed.push(reference.clone());
                continue;
            }
            removed_references.push(reference.clone());

            self.ledger.record(reference, kind);
            match self.write_lock.run(|| self.fs.copy(latest, reference)) {
                Ok(()) => added_references.push(reference.clone()),
                Err(e) => {
                    warn!(from = %latest.display(), to = %reference.display(), error = %e, "Failed to copy latest screenshot");
                    failed.push(reference.clone());
                    continue;
                }
            }

            let diff = counterpart_path(latest, VariantCategory::Latest, VariantCategory::Diff)
                .and_then(|expected| diffs.iter().find(|d| to_slash(d) == to_slash(&expected)));
            if let Some(diff) = diff {
                match self.delete_file(diff, kind) {
                    Ok(()) => removed_diffs.push(diff.clone()),
                    Err(e) => {
                        warn!(path = %diff.display(), error = %e, "Failed to delete diff screenshot");
                        failed.push(diff.clone());
                    }
                }
            }
        }

        if let Some(screenshot) = aggregate.screenshot_mut(key) {
            for path in &removed_references {
                screenshot.remove_file(VariantCategory::Reference, path);
            }
            for path in &added_references {
                screenshot.add_file(VariantCategory::Reference, path.clone());
            }
            for path in &removed_diffs {
                screenshot.remove_file(VariantCategory::Diff, path);
            }
        }

        info!(
            screenshot = %key,
            replaced = added_references.len(),
            diffs_removed = removed_diffs.len(),
            failed = failed.len(),
            "Replaced references with latest"
        );
        match failed.is_empty() {
            true => Ok(ReplaceOutcome {
                replaced: added_references.len(),
                diffs_removed: removed_diffs.len(),
            }),
            false => Err(MutationError::Partial { kind, failed }),
        }
    }
}
