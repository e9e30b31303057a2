use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::peer::{PeerId, PeerSet};

use super::activity::Activity;
use super::config::SyncConfig;
use super::suppress::Suppression;

/// State shared by the coordinator and the watch adapter of one node
#[derive(Debug, Clone)]
pub struct SyncContext {
    inner: Arc<ContextInner>,
}

#[derive(Debug)]
struct ContextInner {
    local_id: PeerId,
    root: PathBuf,
    peers: PeerSet,
    suppression: Suppression,
    config: SyncConfig,
    activity: Activity,
}

impl SyncContext {
    pub fn new(local_id: PeerId, root: impl Into<PathBuf>, peers: PeerSet, config: SyncConfig) -> Self {
        let suppression = Suppression::new(config.grace_window);
        Self {
            inner: Arc::new(ContextInner {
                local_id,
                root: root.into(),
                peers,
                suppression,
                config,
                activity: Activity::default(),
            }),
        }
    }

    pub fn local_id(&self) -> PeerId {
        self.inner.local_id
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn peers(&self) -> &PeerSet {
        &self.inner.peers
    }

    pub fn suppression(&self) -> &Suppression {
        &self.inner.suppression
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn activity(&self) -> &Activity {
        &self.inner.activity
    }
}
