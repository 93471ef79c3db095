//! One open project: its settings, profile, aggregate and the serialized
//! operations over them.
//!
//! Rebuilds and mutations take the operation mutex, so no two of them ever
//! interleave, and run their file-system work on the blocking pool. A
//! finished rebuild swaps in a whole new aggregate and then posts
//! [`WorkspaceEvent::Refreshed`] for the view to pick up.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::config::WorkspaceSettings;
use crate::internal::aggregate::{AggregateRoot, Statistics};
use crate::internal::aggregator::IdentityAggregator;
use crate::internal::ledger::WriteLedger;
use crate::internal::models::{DimensionalContext, ScreenshotKey};
use crate::internal::mutation::{
    DeleteOutcome, MutationCoordinator, MutationError, MutationKind, RenameOutcome, ReplaceOutcome,
};
use crate::internal::notification::Notification;
use crate::internal::usage::{MissingScreenshot, UsageLookup, UsageScanner};
use crate::internal::watcher::{ChangeWatcher, is_external_trigger};
use crate::utils::paths::to_slash;
use crate::vfs::FileSystem;

#[derive(Debug, Clone)]
pub enum WorkspaceEvent {
    Refreshed(Statistics),
    Notify(Notification),
}

#[derive(Clone)]
pub struct Workspace {
    settings: Arc<WorkspaceSettings>,
    fs: Arc<dyn FileSystem>,
    aggregate: Arc<RwLock<AggregateRoot>>,
    coordinator: MutationCoordinator,
    operations: Arc<Mutex<()>>,
    events: UnboundedSender<WorkspaceEvent>,
}

impl Workspace {
    /// Create the workspace and run the initial rebuild.
    ///
    /// The test root is canonicalized first so it compares equal to the
    /// absolute paths the watcher and the file listing report.
    pub async fn open(
        mut settings: WorkspaceSettings,
        fs: Arc<dyn FileSystem>,
    ) -> Result<(Self, UnboundedReceiver<WorkspaceEvent>)> {
        settings.test_root = std::fs::canonicalize(&settings.test_root)
            .with_context(|| format!("Test root {} is not accessible", settings.test_root.display()))?;
        let (events, rx) = mpsc::unbounded_channel();
        let ledger = WriteLedger::with_metrics(settings.write_ledger_ttl, settings.enable_performance_metrics);
        info!(
            test_root = %settings.test_root.display(),
            profile = %settings.profile,
            "Opening workspace"
        );
        let workspace = Self {
            coordinator: MutationCoordinator::new(Arc::clone(&fs), ledger),
            settings: Arc::new(settings),
            fs,
            aggregate: Arc::new(RwLock::new(AggregateRoot::new())),
            operations: Arc::new(Mutex::new(())),
            events,
        };
        workspace.rebuild().await?;
        Ok((workspace, rx))
    }

    pub fn settings(&self) -> &WorkspaceSettings {
        &self.settings
    }

    fn post(&self, event: WorkspaceEvent) {
        if self.events.send(event).is_err() {
            debug!("Workspace event receiver dropped");
        }
    }

    /// Replace the aggregate with a fresh scan of the test root.
    pub async fn rebuild(&self) -> Result<Statistics> {
        let _operation = self.operations.lock().await;
        let fs = Arc::clone(&self.fs);
        let settings = Arc::clone(&self.settings);
        let fresh = tokio::task::spawn_blocking(move || {
            IdentityAggregator::new(fs.as_ref(), settings.profile, &settings.test_root)
                .with_metrics(settings.enable_performance_metrics)
                .rebuild()
        })
        .await
        .context("rebuild task failed")??;

        let stats = fresh.statistics();
        *self.aggregate.write().await = fresh;
        self.post(WorkspaceEvent::Refreshed(stats));
        Ok(stats)
    }

    /// A copy of the current aggregate for display.
    pub async fn snapshot(&self) -> AggregateRoot {
        self.aggregate.read().await.clone()
    }

    pub async fn statistics(&self) -> Statistics {
        self.aggregate.read().await.statistics()
    }

    async fn mutate<T, F>(&self, kind: MutationKind, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&MutationCoordinator, &mut AggregateRoot) -> Result<T, MutationError> + Send + 'static,
    {
        let _operation = self.operations.lock().await;
        let mut aggregate = Arc::clone(&self.aggregate).write_owned().await;
        let coordinator = self.coordinator.clone();
        let (result, stats) = tokio::task::spawn_blocking(move || {
            let result = op(&coordinator, &mut aggregate);
            (result, aggregate.statistics())
        })
        .await
        .with_context(|| format!("{kind} task failed"))?;

        self.post(WorkspaceEvent::Refreshed(stats));
        result.map_err(|e| {
            self.post(WorkspaceEvent::Notify(Notification::from_mutation_error(kind, &e)));
            e.into()
        })
    }

    pub async fn delete(&self, key: ScreenshotKey) -> Result<DeleteOutcome> {
        self.mutate(MutationKind::Delete, move |coordinator, aggregate| {
            coordinator.delete(aggregate, &key)
        })
        .await
    }

    pub async fn rename(&self, key: ScreenshotKey, new_name: String) -> Result<RenameOutcome> {
        self.mutate(MutationKind::Rename, move |coordinator, aggregate| {
            coordinator.rename(aggregate, &key, &new_name)
        })
        .await
    }

    pub async fn replace_with_latest(&self, key: ScreenshotKey) -> Result<ReplaceOutcome> {
        self.mutate(MutationKind::ReplaceWithLatest, move |coordinator, aggregate| {
            coordinator.replace_with_latest(aggregate, &key)
        })
        .await
    }

    /// Flag unused screenshots in the aggregate and return their keys.
    pub async fn find_unused(&self) -> Result<Vec<ScreenshotKey>> {
        let _operation = self.operations.lock().await;
        let mut aggregate = Arc::clone(&self.aggregate).write_owned().await;
        let fs = Arc::clone(&self.fs);
        let settings = Arc::clone(&self.settings);
        tokio::task::spawn_blocking(move || {
            UsageScanner::new(fs.as_ref(), settings.profile, &settings.test_root)
                .with_metrics(settings.enable_performance_metrics)
                .find_unused(&mut aggregate)
        })
        .await
        .context("unused scan task failed")?
    }

    pub async fn find_missing(&self) -> Result<Vec<MissingScreenshot>> {
        let aggregate = self.snapshot().await;
        let fs = Arc::clone(&self.fs);
        let settings = Arc::clone(&self.settings);
        tokio::task::spawn_blocking(move || {
            UsageScanner::new(fs.as_ref(), settings.profile, &settings.test_root).find_missing(&aggregate)
        })
        .await
        .context("missing scan task failed")?
    }

    /// Locate the call producing `key`; not-found outcomes are also posted as notifications.
    pub async fn find_usage(&self, key: ScreenshotKey) -> Result<UsageLookup> {
        let aggregate = self.snapshot().await;
        let fs = Arc::clone(&self.fs);
        let settings = Arc::clone(&self.settings);
        let lookup_key = key.clone();
        let lookup = tokio::task::spawn_blocking(move || {
            UsageScanner::new(fs.as_ref(), settings.profile, &settings.test_root)
                .find_usage(&aggregate, &lookup_key)
        })
        .await
        .context("usage lookup task failed")??;

        if let Some(notification) = Notification::from_usage_lookup(&key, &lookup) {
            self.post(WorkspaceEvent::Notify(notification));
        }
        Ok(lookup)
    }

    /// Breadcrumb of a reference or diff image; `None` for latest images,
    /// paths outside the snapshot tree, or the noop profile.
    pub fn context_of(&self, path: &Path) -> Option<String> {
        let slash = self.breadcrumb_source(path)?;
        self.settings
            .profile
            .context_breadcrumb(&slash, &self.settings.context_separator)
    }

    pub fn dimensional_context_of(&self, path: &Path) -> Option<DimensionalContext> {
        let slash = self.breadcrumb_source(path)?;
        self.settings.profile.dimensional_context(&slash)
    }

    fn breadcrumb_source(&self, path: &Path) -> Option<String> {
        let slash = to_slash(path);
        match self.settings.profile.has_context(&slash) {
            true => Some(slash),
            false => None,
        }
    }

    /// Rebuild whenever the test root changes outside our own mutations.
    /// Runs until the watcher stops delivering events.
    pub async fn watch(&self) -> Result<()> {
        let ledger = self.coordinator.ledger().clone();
        let (_watcher, mut rx) = ChangeWatcher::start(&self.settings.test_root, ledger.clone())?;
        info!(test_root = %self.settings.test_root.display(), "Watching for external changes");

        while let Some(mut batch) = rx.recv().await {
            while let Ok(more) = rx.try_recv() {
                batch.extend(more);
            }
            ledger.cleanup_expired();
            match is_external_trigger(&batch, &self.settings.test_root) {
                true => {
                    info!(events = batch.len(), "External change detected, rebuilding");
                    self.rebuild().await?;
                }
                false => debug!(events = batch.len(), "Ignoring self-caused or content-only changes"),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::profile::Profile;
    use crate::vfs::LocalFileSystem;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"png").unwrap();
    }

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("button-spec.js"),
            "describe('button', () => {\n  Terra.validates.element();\n});\n",
        )
        .unwrap();
        touch(dir.path(), "__snapshots__/reference/en/chrome_huge/button-spec/button[default].png");
        touch(dir.path(), "__snapshots__/reference/en/chrome_huge/button-spec/button[stale].png");
        touch(dir.path(), "__snapshots__/diff/en/chrome_huge/button-spec/button[default].png");
        dir
    }

    async fn open(dir: &TempDir) -> (Workspace, UnboundedReceiver<WorkspaceEvent>) {
        Workspace::open(WorkspaceSettings::new(dir.path(), Profile::Legacy), Arc::new(LocalFileSystem))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_open_posts_refresh() {
        let dir = project();
        let (workspace, mut rx) = open(&dir).await;

        let stats = workspace.statistics().await;
        assert_eq!(stats.spec_count, 1);
        assert_eq!(stats.screenshot_count, 2);
        assert!(matches!(rx.recv().await, Some(WorkspaceEvent::Refreshed(s)) if s == stats));
    }

    #[tokio::test]
    async fn test_failed_mutation_posts_notification() {
        let dir = project();
        let (workspace, mut rx) = open(&dir).await;
        let _ = rx.recv().await;

        let key = ScreenshotKey::new("button-spec", "button[default].png");
        let err = workspace.rename(key, "  ".to_string()).await.unwrap_err();
        assert_eq!(err.downcast_ref::<MutationError>(), Some(&MutationError::BlankName));

        assert!(matches!(rx.recv().await, Some(WorkspaceEvent::Refreshed(_))));
        match rx.recv().await {
            Some(WorkspaceEvent::Notify(notification)) => {
                assert_eq!(notification.title, "Error During Screenshot Rename")
            }
            other => panic!("expected a notification, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_delete_then_unused_scan() {
        let dir = project();
        let (workspace, _rx) = open(&dir).await;

        let unused = workspace.find_unused().await.unwrap();
        assert_eq!(unused, vec![ScreenshotKey::new("button-spec", "button[stale].png")]);

        let outcome = workspace.delete(unused[0].clone()).await.unwrap();
        assert_eq!(outcome.deleted, 1);
        assert_eq!(workspace.statistics().await.screenshot_count, 1);
    }

    #[tokio::test]
    async fn test_context_of() {
        let dir = project();
        let (workspace, _rx) = open(&dir).await;
        let reference = dir
            .path()
            .join("__snapshots__/reference/en/chrome_huge/button-spec/button[default].png");
        let latest = dir
            .path()
            .join("__snapshots__/latest/en/chrome_huge/button-spec/button[default].png");

        assert_eq!(workspace.context_of(&reference).as_deref(), Some("en | chrome | huge"));
        assert_eq!(workspace.context_of(&latest), None);
    }

    #[tokio::test]
    async fn test_context_of_incomplete_path_is_none() {
        let dir = project();
        let (workspace, _rx) = open(&dir).await;

        assert_eq!(workspace.context_of(&dir.path().join("__snapshots__/reference/en")), None);
        assert_eq!(
            workspace.context_of(&dir.path().join("__snapshots__/reference/en/chrome_huge")),
            None
        );
        assert_eq!(workspace.dimensional_context_of(&dir.path().join("__snapshots__/diff")), None);
    }

    #[tokio::test]
    async fn test_watch_rebuilds_on_external_change() {
        let dir = project();
        let (workspace, mut rx) = open(&dir).await;
        let _ = rx.recv().await;

        let watching = workspace.clone();
        let handle = tokio::spawn(async move { watching.watch().await });
        tokio::time::sleep(Duration::from_millis(200)).await;

        touch(dir.path(), "__snapshots__/reference/en/chrome_huge/button-spec/button[new].png");

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no rebuild after external change");
        assert!(matches!(event, Some(WorkspaceEvent::Refreshed(_))));
        assert_eq!(workspace.statistics().await.screenshot_count, 3);
        handle.abort();
    }

    #[tokio::test]
    async fn test_relative_root_is_watched_as_absolute() {
        let dir = tempfile::Builder::new().tempdir_in(".").unwrap();
        touch(dir.path(), "__snapshots__/reference/en/chrome_huge/button-spec/button[default].png");
        let relative = Path::new(".").join(dir.path().file_name().unwrap());
        let (workspace, mut rx) = Workspace::open(
            WorkspaceSettings::new(&relative, Profile::Legacy),
            Arc::new(LocalFileSystem),
        )
        .await
        .unwrap();
        let _ = rx.recv().await;
        assert!(workspace.settings().test_root.is_absolute());

        let watching = workspace.clone();
        let handle = tokio::spawn(async move { watching.watch().await });
        tokio::time::sleep(Duration::from_millis(200)).await;

        touch(dir.path(), "__snapshots__/reference/en/chrome_huge/button-spec/button[new].png");

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no rebuild after external change under a relative root");
        assert!(matches!(event, Some(WorkspaceEvent::Refreshed(_))));
        assert_eq!(workspace.statistics().await.screenshot_count, 2);
        handle.abort();
    }

    #[tokio::test]
    async fn test_own_writes_are_tagged_under_a_relative_root() {
        let dir = tempfile::Builder::new().tempdir_in(".").unwrap();
        let file = dir
            .path()
            .join("__snapshots__/reference/en/chrome_huge/button-spec/button[default].png");
        touch(dir.path(), "__snapshots__/reference/en/chrome_huge/button-spec/button[default].png");
        let relative = Path::new(".").join(dir.path().file_name().unwrap());
        let (workspace, _rx) = Workspace::open(
            WorkspaceSettings::new(&relative, Profile::Legacy),
            Arc::new(LocalFileSystem),
        )
        .await
        .unwrap();

        workspace
            .delete(ScreenshotKey::new("button-spec", "button[default].png"))
            .await
            .unwrap();

        let absolute = fs::canonicalize(dir.path()).unwrap().join(
            file.strip_prefix(dir.path()).unwrap(),
        );
        assert_eq!(workspace.coordinator.ledger().requestor(&absolute), Some(MutationKind::Delete));
    }
}
