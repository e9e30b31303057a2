use tokio::sync::broadcast;

use crate::event::Op;
use crate::peer::PeerId;

const CHANNEL_CAPACITY: usize = 256;

/// Something the sync engine did, for display and tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Local snapshot published with this many entries
    Published { entries: usize },
    /// A file was fetched from a peer and written locally
    Pulled { peer: PeerId, path: String },
    /// A file deleted on a peer was removed locally
    Removed { peer: PeerId, path: String },
    /// A peer read one of our files
    Served { peer: PeerId, path: String },
    /// A peer pushed a Write or Remove that was applied
    Accepted { peer: PeerId, op: Op, path: String },
}

#[derive(Debug, Clone)]
pub struct Activity {
    tx: broadcast::Sender<SyncEvent>,
}

impl Default for Activity {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }
}

impl Activity {
    pub fn emit(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }
}
