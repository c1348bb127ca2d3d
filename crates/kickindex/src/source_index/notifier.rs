//
// source_index/notifier.rs
//
// Snapshot diffing and files-changed notification with a completion barrier
//

use std::collections::BTreeSet;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::file_index::FileIndex;

/// Paths that differ between two snapshots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub added: BTreeSet<PathBuf>,
    pub modified: BTreeSet<PathBuf>,
    pub deleted: BTreeSet<PathBuf>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.deleted.len()
    }

    /// All changed paths, in added/modified/deleted order
    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.added
            .iter()
            .chain(self.modified.iter())
            .chain(self.deleted.iter())
    }
}

/// Diff two snapshots.
///
/// A path present in both is modified when its variant counts differ or any
/// variant under a given symbol set is not the reference-identical variant
/// of the old snapshot.
pub fn diff_indexes(old: &FileIndex, new: &FileIndex) -> ChangeSet {
    let mut changes = ChangeSet::default();

    for (path, new_set) in new.iter() {
        match old.get(path) {
            None => {
                changes.added.insert(path.clone());
            }
            Some(old_set) => {
                if !new_set.same_variants(old_set) {
                    changes.modified.insert(path.clone());
                }
            }
        }
    }

    for path in old.paths() {
        if !new.contains_path(path) {
            changes.deleted.insert(path.clone());
        }
    }

    changes
}

/// Event raised after a pass publishes a new snapshot.
///
/// Subscribers may `attach` follow-up work; the pass does not complete
/// until every attached task has finished.
pub struct FilesChangedEvent {
    pub changes: ChangeSet,
    /// Token of the pass that produced the snapshot; cancelled if superseded
    pub cancellation: CancellationToken,
    pub snapshot: Arc<FileIndex>,
    pending: Mutex<JoinSet<()>>,
}

impl std::fmt::Debug for FilesChangedEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilesChangedEvent")
            .field("changes", &self.changes)
            .finish_non_exhaustive()
    }
}

impl FilesChangedEvent {
    pub fn new(
        changes: ChangeSet,
        cancellation: CancellationToken,
        snapshot: Arc<FileIndex>,
    ) -> Self {
        Self {
            changes,
            cancellation,
            snapshot,
            pending: Mutex::new(JoinSet::new()),
        }
    }

    /// Start follow-up work that the pass awaits before it completes
    pub fn attach<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(mut pending) = self.pending.lock() {
            pending.spawn(work);
        }
    }

    /// Wait for all attached work
    async fn join_attached(&self) -> usize {
        let mut tasks = match self.pending.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(_) => return 0,
        };
        let mut joined = 0;
        while let Some(result) = tasks.join_next().await {
            joined += 1;
            if let Err(e) = result {
                log::warn!("files-changed follow-up task failed: {}", e);
            }
        }
        joined
    }
}

pub type FilesChangedHandler = Arc<dyn Fn(&FilesChangedEvent) + Send + Sync>;

/// Fan-out of files-changed events to subscribers, fan-in of their work
#[derive(Default)]
pub struct ChangeNotifier {
    subscribers: RwLock<Vec<FilesChangedHandler>>,
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier").finish_non_exhaustive()
    }
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, handler: FilesChangedHandler) {
        if let Ok(mut subscribers) = self.subscribers.write() {
            subscribers.push(handler);
        }
    }

    /// Raise the event and wait for every subscriber's attached work.
    /// Returns the number of follow-up tasks joined.
    pub async fn notify(
        &self,
        changes: ChangeSet,
        cancellation: CancellationToken,
        snapshot: Arc<FileIndex>,
    ) -> usize {
        let event = FilesChangedEvent::new(changes, cancellation, snapshot);
        let subscribers: Vec<FilesChangedHandler> = self
            .subscribers
            .read()
            .map(|s| s.clone())
            .unwrap_or_default();

        for handler in &subscribers {
            handler(&event);
        }

        let joined = event.join_attached().await;
        log::trace!(
            "files-changed barrier released ({} subscribers, {} tasks)",
            subscribers.len(),
            joined
        );
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source_index::file_index::FileIndexBuilder;
    use crate::source_index::symbols::SymbolSet;
    use crate::source_index::variant::test_variant;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn p(name: &str) -> PathBuf {
        PathBuf::from(format!("/p/{}", name))
    }

    #[test]
    fn test_diff_added_modified_deleted() {
        let a1 = test_variant("/p/a.asm", SymbolSet::empty());
        let b1 = test_variant("/p/b.asm", SymbolSet::empty());
        let b2 = test_variant("/p/b.asm", SymbolSet::empty());
        let c1 = test_variant("/p/c.asm", SymbolSet::empty());

        let mut old = FileIndexBuilder::new();
        old.insert(p("a.asm"), SymbolSet::empty(), a1.clone());
        old.insert(p("b.asm"), SymbolSet::empty(), b1);
        let old = old.freeze();

        let mut new = FileIndexBuilder::new();
        new.insert(p("a.asm"), SymbolSet::empty(), a1);
        new.insert(p("b.asm"), SymbolSet::empty(), b2);
        new.insert(p("c.asm"), SymbolSet::empty(), c1);
        let new = new.freeze();

        let changes = diff_indexes(&old, &new);
        assert_eq!(changes.modified, BTreeSet::from([p("b.asm")]));
        assert_eq!(changes.added, BTreeSet::from([p("c.asm")]));
        assert!(changes.deleted.is_empty());

        let reverse = diff_indexes(&new, &old);
        assert_eq!(reverse.deleted, BTreeSet::from([p("c.asm")]));
        assert_eq!(reverse.modified, BTreeSet::from([p("b.asm")]));
    }

    #[test]
    fn test_diff_extra_variant_is_modification() {
        let a = test_variant("/p/a.asm", SymbolSet::empty());
        let ax = test_variant("/p/a.asm", SymbolSet::new(["X"]));

        let mut old = FileIndexBuilder::new();
        old.insert(p("a.asm"), SymbolSet::empty(), a.clone());
        let old = old.freeze();

        let mut new = FileIndexBuilder::new();
        new.insert(p("a.asm"), SymbolSet::empty(), a);
        new.insert(p("a.asm"), SymbolSet::new(["X"]), ax);
        let new = new.freeze();

        assert_eq!(diff_indexes(&old, &new).modified, BTreeSet::from([p("a.asm")]));
    }

    #[test]
    fn test_diff_identical_is_empty() {
        let a = test_variant("/p/a.asm", SymbolSet::new(["X"]));
        let mut builder = FileIndexBuilder::new();
        builder.insert(p("a.asm"), SymbolSet::new(["X"]), a);
        let index = builder.freeze();
        let changes = diff_indexes(&index, &index.clone());
        assert!(changes.is_empty());
        assert_eq!(changes.len(), 0);
    }

    #[tokio::test]
    async fn test_barrier_waits_for_attached_work() {
        let notifier = ChangeNotifier::new();
        let finished = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let finished = finished.clone();
            notifier.subscribe(Arc::new(move |event: &FilesChangedEvent| {
                let finished = finished.clone();
                event.attach(async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                });
            }));
        }

        let mut changes = ChangeSet::default();
        changes.added.insert(p("a.asm"));
        let joined = notifier
            .notify(changes, CancellationToken::new(), Arc::new(FileIndex::empty()))
            .await;

        assert_eq!(joined, 3);
        assert_eq!(finished.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_panicking_follow_up_does_not_break_barrier() {
        let notifier = ChangeNotifier::new();
        notifier.subscribe(Arc::new(|event: &FilesChangedEvent| {
            event.attach(async { panic!("subscriber bug") });
            event.attach(async {});
        }));

        let joined = notifier
            .notify(
                ChangeSet::default(),
                CancellationToken::new(),
                Arc::new(FileIndex::empty()),
            )
            .await;
        assert_eq!(joined, 2);
    }
}
