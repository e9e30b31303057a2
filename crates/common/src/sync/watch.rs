//! Local change detection.
//!
//! Raw notifications from `notify` are classified against the ignore rules and the echo
//! suppression state. Each change that survives gets its own task: mark the path
//! outbound-pending, wait for the file to be fully written, then publish a fresh snapshot
//! unless one went out less than a debounce interval ago. Deferred publishes leave the
//! adapter dirty and a periodic flush catches them up.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use notify::event::{CreateKind, EventKind, ModifyKind, RemoveKind};
use notify::{RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::watch::Receiver as WatchReceiver;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};

use crate::paths;
use crate::snapshot::{self, SnapshotError};
use crate::store::{ReplicatedStore, StoreError, SNAP_KEY};

use super::activity::SyncEvent;
use super::context::SyncContext;
use super::quiesce;
use super::suppress::PathState;

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("watcher error: {0}")]
    Watcher(#[from] notify::Error),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("background task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Renamed,
    Removed,
    /// Permission or other metadata-only change
    Metadata,
}

/// One filesystem change as reported by the watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
    pub is_dir: bool,
}

impl RawEvent {
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let is_dir = path.is_dir();
        Self { kind, path, is_dir }
    }

    /// Split a `notify` event into one raw event per path
    pub fn from_notify(event: &notify::Event) -> Vec<RawEvent> {
        let kind = match event.kind {
            EventKind::Create(_) => ChangeKind::Created,
            EventKind::Modify(ModifyKind::Name(_)) => ChangeKind::Renamed,
            EventKind::Modify(ModifyKind::Metadata(_)) => ChangeKind::Metadata,
            EventKind::Modify(_) => ChangeKind::Modified,
            EventKind::Remove(_) => ChangeKind::Removed,
            EventKind::Access(_) | EventKind::Any | EventKind::Other => return Vec::new(),
        };
        let folder = matches!(
            event.kind,
            EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder)
        );

        event
            .paths
            .iter()
            .map(|path| {
                let mut raw = RawEvent::new(kind, path.clone());
                raw.is_dir |= folder;
                raw
            })
            .collect()
    }
}

/// What the filter decided about a raw event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Publish, with the root-relative path
    Publish(String),
    OutsideRoot,
    Ignored,
    Hidden,
    Directory,
    Metadata,
    OutboundPending,
    InboundPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Snapshot published with this many entries
    Published(usize),
    /// Inside the debounce interval, left for the next flush
    Deferred,
}

#[derive(Debug, Clone)]
pub struct WatchAdapter {
    inner: Arc<AdapterInner>,
}

#[derive(Debug)]
struct AdapterInner {
    context: SyncContext,
    store: Arc<dyn ReplicatedStore>,
    last_publish: Mutex<Option<Instant>>,
    dirty: AtomicBool,
}

impl WatchAdapter {
    pub fn new(context: SyncContext, store: Arc<dyn ReplicatedStore>) -> Self {
        Self {
            inner: Arc::new(AdapterInner {
                context,
                store,
                last_publish: Mutex::new(None),
                dirty: AtomicBool::new(false),
            }),
        }
    }

    pub fn context(&self) -> &SyncContext {
        &self.inner.context
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::SeqCst)
    }

    pub fn classify(&self, event: &RawEvent) -> Verdict {
        let context = &self.inner.context;
        let Some(rel) = paths::relative_path(context.root(), &event.path) else {
            return Verdict::OutsideRoot;
        };
        if paths::is_ignored(&rel) {
            return Verdict::Ignored;
        }
        if paths::is_hidden(&rel) {
            return Verdict::Hidden;
        }
        if event.kind == ChangeKind::Metadata {
            return Verdict::Metadata;
        }
        if event.is_dir {
            return Verdict::Directory;
        }
        match context.suppression().state(&rel) {
            PathState::InboundPending => Verdict::InboundPending,
            PathState::OutboundPending => Verdict::OutboundPending,
            PathState::Idle => Verdict::Publish(rel),
        }
    }

    /// Classify and, if it survives, process one change to completion.
    ///
    /// Returns `None` for filtered events.
    pub async fn handle(&self, event: RawEvent) -> Result<Option<PublishOutcome>, WatchError> {
        match self.classify(&event) {
            Verdict::Publish(rel) => self.process(rel, event.path).await.map(Some),
            verdict => {
                tracing::trace!("skipping {}: {:?}", event.path.display(), verdict);
                Ok(None)
            }
        }
    }

    async fn process(&self, rel: String, path: PathBuf) -> Result<PublishOutcome, WatchError> {
        let context = &self.inner.context;
        context.suppression().outbound().mark(&rel);
        quiesce::until_written(&path, &context.config().quiescence).await;
        tracing::debug!("local change to {}", rel);
        self.publish_debounced().await
    }

    /// Take and publish a snapshot unconditionally
    pub async fn publish(&self) -> Result<usize, WatchError> {
        *self.inner.last_publish.lock() = Some(Instant::now());
        self.inner.dirty.store(false, Ordering::SeqCst);

        let context = &self.inner.context;
        let root = context.root().to_path_buf();
        let local_id = context.local_id();
        let snap = tokio::task::spawn_blocking(move || snapshot::snapshot(local_id, &root))
            .await
            .map_err(|e| WatchError::Task(e.to_string()))??;
        let entries = snap.metas.len();

        self.inner
            .store
            .put(SNAP_KEY, Bytes::from(snap.to_bytes()?))
            .await?;

        tracing::info!("Published snapshot with {} entries", entries);
        context.activity().emit(SyncEvent::Published { entries });
        Ok(entries)
    }

    /// Publish if the debounce interval has passed, otherwise mark dirty
    pub async fn publish_debounced(&self) -> Result<PublishOutcome, WatchError> {
        if !self.claim_publish() {
            self.inner.dirty.store(true, Ordering::SeqCst);
            return Ok(PublishOutcome::Deferred);
        }
        self.publish().await.map(PublishOutcome::Published)
    }

    /// Publish a deferred change once the debounce interval allows it
    pub async fn flush(&self) -> Result<Option<usize>, WatchError> {
        if !self.is_dirty() || !self.claim_publish() {
            return Ok(None);
        }
        self.publish().await.map(Some)
    }

    fn claim_publish(&self) -> bool {
        let debounce = self.inner.context.config().debounce;
        let mut last = self.inner.last_publish.lock();
        let now = Instant::now();
        if let Some(at) = *last {
            if now.duration_since(at) < debounce {
                return false;
            }
        }
        *last = Some(now);
        true
    }

    /// Watch the sync root until shutdown.
    ///
    /// Publishes once at startup so peers learn our current tree.
    pub async fn run(self, mut shutdown_rx: WatchReceiver<()>) -> Result<(), WatchError> {
        let root = self.inner.context.root().to_path_buf();
        let (tx, rx) = flume::unbounded();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let _ = tx.send(res);
        })?;
        watcher.watch(&root, RecursiveMode::Recursive)?;
        tracing::info!("Watching {}", root.display());

        if let Err(e) = self.publish().await {
            tracing::error!("Failed to publish initial snapshot: {}", e);
        }

        let mut flush = tokio::time::interval(self.inner.context.config().debounce);
        flush.set_missed_tick_behavior(MissedTickBehavior::Delay);
        flush.tick().await;

        let mut tasks = JoinSet::new();
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    tracing::info!("Shutdown signal received, stopping watcher");
                    break;
                }
                received = rx.recv_async() => {
                    let Ok(result) = received else { break };
                    let event = match result {
                        Ok(event) => event,
                        Err(e) => {
                            tracing::warn!("Watcher error: {}", e);
                            continue;
                        }
                    };
                    for raw in RawEvent::from_notify(&event) {
                        match self.classify(&raw) {
                            Verdict::Publish(rel) => {
                                let adapter = self.clone();
                                tasks.spawn(async move { adapter.process(rel, raw.path).await });
                            }
                            verdict => {
                                tracing::trace!("skipping {}: {:?}", raw.path.display(), verdict);
                            }
                        }
                    }
                }
                _ = flush.tick() => {
                    if let Err(e) = self.flush().await {
                        tracing::error!("Failed to publish deferred snapshot: {}", e);
                    }
                }
                Some(joined) = tasks.join_next() => match joined {
                    Ok(Err(e)) => tracing::error!("Failed to publish snapshot: {}", e),
                    Err(e) if e.is_panic() => tracing::error!("Change task panicked: {}", e),
                    _ => {}
                },
            }
        }

        drop(watcher);
        tasks.shutdown().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::{PeerId, PeerSet};
    use crate::snapshot::Snap;
    use crate::store::MemoryStore;
    use crate::sync::{QuiescenceConfig, SyncConfig};
    use std::time::Duration;
    use tempfile::TempDir;

    fn adapter(root: &std::path::Path, store: MemoryStore) -> WatchAdapter {
        let config = SyncConfig {
            grace_window: Duration::from_millis(200),
            debounce: Duration::from_millis(150),
            quiescence: QuiescenceConfig {
                settle_delay: Duration::from_millis(1),
                ..Default::default()
            },
            ..Default::default()
        };
        let context = SyncContext::new(
            PeerId::from_bytes([5; 32]),
            root.to_path_buf(),
            PeerSet::new(),
            config,
        );
        WatchAdapter::new(context, Arc::new(store))
    }

    #[test]
    fn test_from_notify() {
        let event = notify::Event::new(EventKind::Create(CreateKind::Folder))
            .add_path(PathBuf::from("/nowhere/dir"));
        let raw = RawEvent::from_notify(&event);
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].kind, ChangeKind::Created);
        assert!(raw[0].is_dir);

        let event = notify::Event::new(EventKind::Modify(ModifyKind::Name(
            notify::event::RenameMode::Both,
        )))
        .add_path(PathBuf::from("/nowhere/a"))
        .add_path(PathBuf::from("/nowhere/b"));
        let raw = RawEvent::from_notify(&event);
        assert_eq!(raw.len(), 2);
        assert!(raw.iter().all(|r| r.kind == ChangeKind::Renamed));

        let event = notify::Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path(PathBuf::from("/nowhere/a"));
        assert!(RawEvent::from_notify(&event).is_empty());
    }

    #[test]
    fn test_classify() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir(root.join("sub")).unwrap();
        let adapter = adapter(root, MemoryStore::new());

        let verdict = |kind, rel: &str| adapter.classify(&RawEvent::new(kind, root.join(rel)));

        assert_eq!(
            verdict(ChangeKind::Modified, "a.txt"),
            Verdict::Publish("a.txt".to_string())
        );
        assert_eq!(verdict(ChangeKind::Modified, ".git/index"), Verdict::Ignored);
        assert_eq!(verdict(ChangeKind::Created, ".cache/x"), Verdict::Hidden);
        assert_eq!(verdict(ChangeKind::Metadata, "a.txt"), Verdict::Metadata);
        assert_eq!(verdict(ChangeKind::Created, "sub"), Verdict::Directory);
        assert_eq!(
            adapter.classify(&RawEvent::new(ChangeKind::Created, "/elsewhere/a.txt")),
            Verdict::OutsideRoot
        );

        adapter.context().suppression().outbound().mark("out.txt");
        assert_eq!(verdict(ChangeKind::Modified, "out.txt"), Verdict::OutboundPending);
        adapter.context().suppression().inbound().mark("in.txt");
        assert_eq!(verdict(ChangeKind::Modified, "in.txt"), Verdict::InboundPending);
    }

    #[tokio::test]
    async fn test_publishes_are_debounced() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::write(root.join("a.txt"), b"a").unwrap();
        std::fs::write(root.join("b.txt"), b"b").unwrap();
        let store = MemoryStore::new();
        let adapter = adapter(root, store.clone());

        let first = adapter
            .handle(RawEvent::new(ChangeKind::Created, root.join("a.txt")))
            .await
            .unwrap();
        assert_eq!(first, Some(PublishOutcome::Published(2)));

        let bytes = store.get(SNAP_KEY).await.unwrap().unwrap();
        let snap = Snap::from_bytes(&bytes).unwrap();
        assert_eq!(snap.origin, PeerId::from_bytes([5; 32]));
        assert_eq!(snap.metas.len(), 2);

        // same path is outbound-pending now
        let echo = adapter
            .handle(RawEvent::new(ChangeKind::Modified, root.join("a.txt")))
            .await
            .unwrap();
        assert_eq!(echo, None);

        let second = adapter
            .handle(RawEvent::new(ChangeKind::Created, root.join("b.txt")))
            .await
            .unwrap();
        assert_eq!(second, Some(PublishOutcome::Deferred));
        assert!(adapter.is_dirty());
        assert_eq!(adapter.flush().await.unwrap(), None);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(adapter.flush().await.unwrap(), Some(2));
        assert!(!adapter.is_dirty());
        assert_eq!(adapter.flush().await.unwrap(), None);
    }
}
