#![allow(dead_code)]

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use common::peer::protocol::MemoryNetwork;
use common::peer::{PeerId, PeerSet};
use common::store::MemoryStore;
use common::sync::{Coordinator, QuiescenceConfig, SyncConfig, SyncContext, WatchAdapter};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Short intervals so tests run in well under a second per step
pub fn fast_config() -> SyncConfig {
    SyncConfig {
        grace_window: Duration::from_millis(500),
        debounce: Duration::from_millis(100),
        quiescence: QuiescenceConfig {
            settle_delay: Duration::from_millis(5),
            stability_interval: Duration::from_millis(20),
            max_quiescence: Duration::from_secs(2),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// One in-process node: a temp sync root with a coordinator and watch adapter
pub struct TestNode {
    pub dir: TempDir,
    pub id: PeerId,
    pub context: SyncContext,
    pub coordinator: Coordinator,
    pub adapter: WatchAdapter,
}

impl TestNode {
    pub fn new(network: &MemoryNetwork, store: &MemoryStore, seed: u8, config: SyncConfig) -> Self {
        let dir = TempDir::new().unwrap();
        let id = PeerId::from_bytes([seed; 32]);
        let context = SyncContext::new(id, dir.path().to_path_buf(), PeerSet::new(), config);
        let coordinator = Coordinator::new(context.clone(), Arc::new(network.transport(id)));
        network.register(id, Arc::new(coordinator.clone()));
        let adapter = WatchAdapter::new(context.clone(), Arc::new(store.clone()));
        Self {
            dir,
            id,
            context,
            coordinator,
            adapter,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, rel: &str, contents: &[u8]) {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }

    pub fn read(&self, rel: &str) -> Option<Vec<u8>> {
        std::fs::read(self.root().join(rel)).ok()
    }
}

/// Make every node a member of every other node's peer set
pub fn connect_all(nodes: &[&TestNode]) {
    for node in nodes {
        for other in nodes {
            if node.id != other.id {
                node.context.peers().insert(other.id);
            }
        }
    }
}

/// Poll `check` until it returns true or `timeout` passes
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
