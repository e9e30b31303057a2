use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// Key under which each peer publishes its latest snapshot
pub const SNAP_KEY: &str = "/snap";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to encode store message: {0}")]
    Encode(String),
}

#[async_trait]
pub trait ReplicatedStore: Send + Sync + std::fmt::Debug + 'static {
    /// Set `key` locally, notify subscribers and replicate to known peers
    async fn put(&self, key: &str, value: Bytes) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    /// Stream of `(key, value)` for every change, local or remote
    fn subscribe(&self) -> Subscription;

    /// Re-announce the current value of `key` to known peers
    async fn sync(&self, key: &str) -> Result<(), StoreError>;
}

/// Change notifications from a [`ReplicatedStore`]
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<(String, Bytes)>,
}

impl Subscription {
    pub fn new(rx: broadcast::Receiver<(String, Bytes)>) -> Self {
        Self { rx }
    }

    /// Next change, or `None` once the store is gone.
    ///
    /// A subscriber that falls behind skips the missed changes; only the most recent
    /// value of a key matters to it.
    pub async fn next(&mut self) -> Option<(String, Bytes)> {
        loop {
            match self.rx.recv().await {
                Ok(change) => return Some(change),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "store subscriber lagged, skipping changes");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
