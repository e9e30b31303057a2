use anyhow::anyhow;
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::{join_all, BoxFuture};
use iroh::endpoint::Connection;
use iroh::protocol::{AcceptError, ProtocolHandler};
use iroh::Endpoint;
use serde::{Deserialize, Serialize};

use crate::peer::{PeerId, PeerSet};

use super::memory::MemoryStore;
use super::provider::{ReplicatedStore, StoreError, Subscription, SNAP_KEY};

/// ALPN identifier for store replication
pub const STORE_ALPN: &[u8] = b"/peerdrive/store/1.0.0";

/// Snapshots of large trees run into megabytes
const MAX_MESSAGE_LEN: usize = 64 * 1024 * 1024;
const MAX_ACK_LEN: usize = 1024;

#[derive(Debug, Serialize, Deserialize)]
struct StorePush {
    key: String,
    value: Bytes,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreAck {
    accepted: bool,
}

/// Store replicated by pushing every write to each member of the peer set.
///
/// Values are last-write-wins per key. A connection from a peer that is not yet in the set
/// adds it, and the new peer is sent our current snapshot in return.
#[derive(Debug, Clone)]
pub struct BroadcastStore {
    local: MemoryStore,
    endpoint: Endpoint,
    peers: PeerSet,
}

impl BroadcastStore {
    pub fn new(endpoint: Endpoint, peers: PeerSet) -> Self {
        Self {
            local: MemoryStore::new(),
            endpoint,
            peers,
        }
    }

    pub fn peers(&self) -> &PeerSet {
        &self.peers
    }

    /// Register a peer. When it is new, our snapshot is re-announced in the background so
    /// the newcomer can reconcile against us.
    pub fn add_peer(&self, peer: PeerId) -> bool {
        if !self.peers.insert(peer) {
            return false;
        }
        tracing::info!("Discovered peer {}", peer);
        let store = self.clone();
        tokio::spawn(async move {
            if let Err(e) = store.sync(SNAP_KEY).await {
                tracing::warn!("Failed to announce snapshot to new peer {}: {}", peer, e);
            }
        });
        true
    }

    async fn broadcast(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        let message = StorePush {
            key: key.to_string(),
            value,
        };
        let bytes = Bytes::from(
            bincode::serialize(&message).map_err(|e| StoreError::Encode(e.to_string()))?,
        );

        let peers = self.peers.to_vec();
        let pushes = peers.iter().map(|peer| self.push_to(*peer, bytes.clone()));
        for (peer, result) in peers.iter().zip(join_all(pushes).await) {
            if let Err(e) = result {
                tracing::warn!("Failed to replicate {} to peer {}: {}", key, peer, e);
            }
        }
        Ok(())
    }

    async fn push_to(&self, peer: PeerId, message: Bytes) -> anyhow::Result<()> {
        let node_id = peer.to_node_id()?;
        let conn = self
            .endpoint
            .connect(node_id, STORE_ALPN)
            .await
            .map_err(|e| anyhow!("failed to connect: {}", e))?;
        let (mut send, mut recv) = conn
            .open_bi()
            .await
            .map_err(|e| anyhow!("failed to open stream: {}", e))?;

        send.write_all(&message)
            .await
            .map_err(|e| anyhow!("failed to write push: {}", e))?;
        send.finish()
            .map_err(|e| anyhow!("failed to finish push: {}", e))?;

        let ack_bytes = recv
            .read_to_end(MAX_ACK_LEN)
            .await
            .map_err(|e| anyhow!("failed to read ack: {}", e))?;
        let ack: StoreAck = bincode::deserialize(&ack_bytes)
            .map_err(|e| anyhow!("failed to deserialize ack: {}", e))?;
        if !ack.accepted {
            return Err(anyhow!("push rejected"));
        }
        Ok(())
    }

    async fn receive(&self, from: PeerId, message: StorePush) {
        tracing::debug!("Received {} from peer {}", message.key, from);
        self.add_peer(from);
        // local put only, never re-broadcast
        if let Err(e) = self.local.put(&message.key, message.value).await {
            tracing::error!("Failed to store {} from peer {}: {}", message.key, from, e);
        }
    }
}

#[async_trait]
impl ReplicatedStore for BroadcastStore {
    async fn put(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        self.local.put(key, value.clone()).await?;
        self.broadcast(key, value).await
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        self.local.get(key).await
    }

    fn subscribe(&self) -> Subscription {
        self.local.subscribe()
    }

    async fn sync(&self, key: &str) -> Result<(), StoreError> {
        match self.local.get(key).await? {
            Some(value) => self.broadcast(key, value).await,
            None => Ok(()),
        }
    }
}

/// Accepts store pushes from remote peers
#[derive(Debug, Clone)]
pub struct StoreProtocol {
    store: BroadcastStore,
}

impl StoreProtocol {
    pub fn new(store: BroadcastStore) -> Self {
        Self { store }
    }
}

async fn handle_connection(store: BroadcastStore, conn: Connection) -> Result<(), AcceptError> {
    let remote = conn.remote_node_id().map_err(|e| {
        let err: Box<dyn std::error::Error + Send + Sync> =
            anyhow!("failed to identify remote node: {}", e).into();
        AcceptError::from(err)
    })?;
    let remote = PeerId::from(remote);
    tracing::debug!("new store connection from {}", remote);
    store.add_peer(remote);

    // one push per stream; the connection ends when the remote closes it
    while let Ok((mut send, mut recv)) = conn.accept_bi().await {
        let message_bytes = recv.read_to_end(MAX_MESSAGE_LEN).await.map_err(|e| {
            tracing::error!("failed to read store push: {}", e);
            AcceptError::from(std::io::Error::other(e))
        })?;

        let message: StorePush = bincode::deserialize(&message_bytes).map_err(|e| {
            tracing::error!("Failed to deserialize store push: {}", e);
            let err: Box<dyn std::error::Error + Send + Sync> =
                anyhow!("failed to deserialize store push: {}", e).into();
            AcceptError::from(err)
        })?;

        store.receive(remote, message).await;

        let ack = bincode::serialize(&StoreAck { accepted: true }).map_err(|e| {
            let err: Box<dyn std::error::Error + Send + Sync> =
                anyhow!("failed to serialize ack: {}", e).into();
            AcceptError::from(err)
        })?;
        send.write_all(&ack).await.map_err(|e| {
            tracing::error!("failed to send store ack: {}", e);
            AcceptError::from(std::io::Error::other(e))
        })?;
        send.finish().map_err(|e| {
            tracing::error!("failed to finish store ack: {}", e);
            AcceptError::from(std::io::Error::other(e))
        })?;
    }

    Ok(())
}

impl ProtocolHandler for StoreProtocol {
    #[allow(refining_impl_trait)]
    fn accept(&self, conn: Connection) -> BoxFuture<'static, Result<(), AcceptError>> {
        let store = self.store.clone();
        Box::pin(handle_connection(store, conn))
    }
}
