use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::broadcast;

use super::provider::{ReplicatedStore, StoreError, Subscription};

const CHANNEL_CAPACITY: usize = 64;

/// In-process store. Clones share values and subscribers, so handing a clone to each
/// of several local peers gives them one replicated keyspace.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    values: Arc<RwLock<HashMap<String, Bytes>>>,
    changes: broadcast::Sender<(String, Bytes)>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            values: Arc::new(RwLock::new(HashMap::new())),
            changes,
        }
    }

    fn notify(&self, key: &str, value: Bytes) {
        // no subscribers is fine
        let _ = self.changes.send((key.to_string(), value));
    }
}

#[async_trait]
impl ReplicatedStore for MemoryStore {
    async fn put(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        self.values.write().insert(key.to_string(), value.clone());
        self.notify(key, value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        Ok(self.values.read().get(key).cloned())
    }

    fn subscribe(&self) -> Subscription {
        Subscription::new(self.changes.subscribe())
    }

    async fn sync(&self, key: &str) -> Result<(), StoreError> {
        let current = self.values.read().get(key).cloned();
        if let Some(value) = current {
            self.notify(key, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_notifies_all_clones() {
        let store = MemoryStore::new();
        let other = store.clone();
        let mut sub = other.subscribe();

        store.put("/snap", Bytes::from_static(b"v1")).await.unwrap();

        assert_eq!(
            sub.next().await,
            Some(("/snap".to_string(), Bytes::from_static(b"v1")))
        );
        assert_eq!(
            other.get("/snap").await.unwrap(),
            Some(Bytes::from_static(b"v1"))
        );
        assert_eq!(other.get("/missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sync_reannounces_current_value() {
        let store = MemoryStore::new();
        store.put("/snap", Bytes::from_static(b"v2")).await.unwrap();

        let mut sub = store.subscribe();
        store.sync("/snap").await.unwrap();
        store.sync("/absent").await.unwrap();

        assert_eq!(
            sub.next().await,
            Some(("/snap".to_string(), Bytes::from_static(b"v2")))
        );
    }

    #[tokio::test]
    async fn test_subscription_ends_with_store() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe();
        drop(store);
        assert_eq!(sub.next().await, None);
    }
}
