//! File-system change notifications for the test root.

use anyhow::{Context, Result};
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use strum_macros::Display;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use crate::internal::ledger::WriteLedger;
use crate::internal::mutation::MutationKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ChangeKind {
    Created,
    Removed,
    Renamed,
    ContentChanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
    /// The mutation that caused this event, when it was one of ours.
    pub requestor: Option<MutationKind>,
}

/// Map a raw event kind; access and unknown events are ignored.
pub fn change_kind(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Remove(_) => Some(ChangeKind::Removed),
        EventKind::Modify(ModifyKind::Name(_)) => Some(ChangeKind::Renamed),
        EventKind::Modify(_) => Some(ChangeKind::ContentChanged),
        _ => None,
    }
}

/// Convert one raw event into tagged change events.
pub fn tag_event(event: Event, ledger: &WriteLedger) -> Vec<ChangeEvent> {
    let Some(kind) = change_kind(&event.kind) else {
        return Vec::new();
    };
    event
        .paths
        .into_iter()
        .map(|path| ChangeEvent {
            requestor: ledger.requestor(&path),
            path,
            kind,
        })
        .collect()
}

/// Whether a batch warrants a rebuild: some structural change under the
/// test root that none of our own mutations caused.
pub fn is_external_trigger(batch: &[ChangeEvent], test_root: &Path) -> bool {
    batch.iter().any(|event| {
        event.requestor.is_none()
            && event.kind != ChangeKind::ContentChanged
            && event.path.starts_with(test_root)
    })
}

/// Keeps the underlying watcher alive; dropping it stops the notifications.
pub struct ChangeWatcher {
    _watcher: RecommendedWatcher,
}

impl ChangeWatcher {
    /// Watch `test_root` recursively and forward one batch per raw event.
    pub fn start(test_root: &Path, ledger: WriteLedger) -> Result<(Self, UnboundedReceiver<Vec<ChangeEvent>>)> {
        let (tx, rx): (UnboundedSender<Vec<ChangeEvent>>, _) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let batch = tag_event(event, &ledger);
                if !batch.is_empty() && tx.send(batch).is_err() {
                    debug!("Change receiver dropped");
                }
            }
            Err(e) => warn!(error = %e, "File watcher error"),
        })
        .context("failed to create file watcher")?;
        watcher
            .watch(test_root, RecursiveMode::Recursive)
            .with_context(|| format!("failed to watch {}", test_root.display()))?;
        debug!(test_root = %test_root.display(), "Watching test root");
        Ok((Self { _watcher: watcher }, rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind, RenameMode};
    use std::time::Duration;

    fn event(path: &str, kind: ChangeKind, requestor: Option<MutationKind>) -> ChangeEvent {
        ChangeEvent {
            path: PathBuf::from(path),
            kind,
            requestor,
        }
    }

    #[test]
    fn test_change_kind_mapping() {
        assert_eq!(change_kind(&EventKind::Create(CreateKind::File)), Some(ChangeKind::Created));
        assert_eq!(change_kind(&EventKind::Remove(RemoveKind::File)), Some(ChangeKind::Removed));
        assert_eq!(
            change_kind(&EventKind::Modify(ModifyKind::Name(RenameMode::Both))),
            Some(ChangeKind::Renamed)
        );
        assert_eq!(
            change_kind(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            Some(ChangeKind::ContentChanged)
        );
        assert_eq!(change_kind(&EventKind::Any), None);
    }

    #[test]
    fn test_tag_event_uses_ledger() {
        let ledger = WriteLedger::new(Duration::from_secs(60));
        ledger.record(Path::new("/r/tests/wdio/a.png"), MutationKind::Delete);
        let raw = Event::new(EventKind::Remove(RemoveKind::File))
            .add_path(PathBuf::from("/r/tests/wdio/a.png"))
            .add_path(PathBuf::from("/r/tests/wdio/b.png"));

        let tagged = tag_event(raw, &ledger);
        assert_eq!(tagged[0].requestor, Some(MutationKind::Delete));
        assert_eq!(tagged[1].requestor, None);
    }

    #[test]
    fn test_external_trigger_rules() {
        let root = Path::new("/r/tests/wdio");
        assert!(is_external_trigger(&[event("/r/tests/wdio/a.png", ChangeKind::Created, None)], root));
        assert!(!is_external_trigger(
            &[event("/r/tests/wdio/a.png", ChangeKind::Removed, Some(MutationKind::Delete))],
            root
        ));
        assert!(!is_external_trigger(&[event("/r/tests/wdio/a.png", ChangeKind::ContentChanged, None)], root));
        assert!(!is_external_trigger(&[event("/r/src/a.png", ChangeKind::Created, None)], root));
        assert!(!is_external_trigger(&[], root));
    }
}
