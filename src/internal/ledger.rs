use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::internal::mutation::MutationKind;

struct LedgerEntry {
    kind: MutationKind,
    expires_at: Instant,
}

/// Short-lived record of the paths the mutation coordinator is writing.
///
/// The change watcher asks the ledger who touched a path so that events
/// caused by our own mutations are tagged with a requestor and do not
/// trigger a rebuild. Entries expire after the configured TTL.
pub struct WriteLedger {
    entries: Arc<DashMap<PathBuf, LedgerEntry>>,
    ttl: Duration,
    enable_metrics: bool,
}

impl WriteLedger {
    pub fn new(ttl: Duration) -> Self {
        Self::with_metrics(ttl, false)
    }

    pub fn with_metrics(ttl: Duration, enable_metrics: bool) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
            enable_metrics,
        }
    }

    /// Remember that `kind` is about to touch `path`.
    pub fn record(&self, path: &Path, kind: MutationKind) {
        let start = Instant::now();
        self.entries.insert(
            path.to_path_buf(),
            LedgerEntry {
                kind,
                expires_at: Instant::now() + self.ttl,
            },
        );
        if self.enable_metrics {
            tracing::debug!(elapsed = ?start.elapsed(), path = %path.display(), %kind, "ledger.record");
        }
    }

    /// The mutation that touched `path` within the TTL, if any.
    pub fn requestor(&self, path: &Path) -> Option<MutationKind> {
        let start = Instant::now();
        let kind = self
            .entries
            .get(path)
            .filter(|entry| Instant::now() < entry.expires_at)
            .map(|entry| entry.kind);
        if self.enable_metrics {
            tracing::debug!(elapsed = ?start.elapsed(), hit = kind.is_some(), "ledger.requestor");
        }
        kind
    }

    pub fn cleanup_expired(&self) {
        let start = Instant::now();
        let before = self.entries.len();
        let now = Instant::now();
        self.entries.retain(|_, entry| now < entry.expires_at);
        if self.enable_metrics {
            let after = self.entries.len();
            tracing::debug!(elapsed = ?start.elapsed(), removed = before.saturating_sub(after), remaining = after, "ledger.cleanup_expired");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Clone for WriteLedger {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            ttl: self.ttl,
            enable_metrics: self.enable_metrics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_record_and_requestor() {
        let ledger = WriteLedger::new(Duration::from_secs(60));
        ledger.record(Path::new("/r/a.png"), MutationKind::Delete);

        assert_eq!(ledger.requestor(Path::new("/r/a.png")), Some(MutationKind::Delete));
        assert_eq!(ledger.requestor(Path::new("/r/b.png")), None);
    }

    #[test]
    fn test_entries_expire() {
        let ledger = WriteLedger::new(Duration::from_millis(50));
        ledger.record(Path::new("/r/a.png"), MutationKind::Rename);
        thread::sleep(Duration::from_millis(100));

        assert_eq!(ledger.requestor(Path::new("/r/a.png")), None);
        ledger.cleanup_expired();
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_clones_share_entries() {
        let ledger = WriteLedger::with_metrics(Duration::from_secs(60), true);
        let clone = ledger.clone();
        clone.record(Path::new("/r/a.png"), MutationKind::ReplaceWithLatest);
        assert_eq!(ledger.len(), 1);
    }
}
