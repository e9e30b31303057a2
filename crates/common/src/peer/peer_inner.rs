use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use iroh::{Endpoint, SecretKey};

use crate::store::{BroadcastStore, ReplicatedStore, STORE_ALPN};
use crate::sync::{Coordinator, Reactor, SyncContext, WatchAdapter};

use super::peer_addr::PeerAddr;
use super::PeerId;

/// A running sync node: its iroh endpoint plus the sync engine bound to it
#[derive(Debug, Clone)]
pub struct Peer {
    pub(super) socket_address: SocketAddr,
    pub(super) secret_key: SecretKey,
    pub(super) endpoint: Endpoint,
    pub(super) context: SyncContext,
    pub(super) coordinator: Coordinator,
    pub(super) store: BroadcastStore,
    pub(super) bootstrap: Vec<PeerAddr>,
    pub(super) discovery_interval: Duration,
}

impl Peer {
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret_key
    }

    pub fn socket(&self) -> &SocketAddr {
        &self.socket_address
    }

    pub fn id(&self) -> PeerId {
        PeerId::from(self.endpoint.node_id())
    }

    pub fn context(&self) -> &SyncContext {
        &self.context
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn store(&self) -> &BroadcastStore {
        &self.store
    }

    pub fn bootstrap(&self) -> &[PeerAddr] {
        &self.bootstrap
    }

    pub fn discovery_interval(&self) -> Duration {
        self.discovery_interval
    }

    /// Watch adapter publishing this node's tree through its store
    pub fn watch_adapter(&self) -> WatchAdapter {
        WatchAdapter::new(self.context.clone(), Arc::new(self.store.clone()))
    }

    /// Reactor reconciling this node against snapshots from its store
    pub fn reactor(&self) -> Reactor {
        Reactor::new(self.coordinator.clone(), self.store.subscribe())
    }

    /// Dial bootstrap peers that are not in the peer set yet.
    ///
    /// Each one that answers joins the peer set.
    pub async fn dial_bootstrap(&self) {
        let local_id = self.id();
        let pending: Vec<&PeerAddr> = self
            .bootstrap
            .iter()
            .filter(|addr| addr.id != local_id && !self.store.peers().contains(&addr.id))
            .collect();
        if pending.is_empty() {
            return;
        }

        let dials = pending.iter().map(|addr| self.dial(addr));
        for (addr, result) in pending.iter().zip(join_all(dials).await) {
            match result {
                Ok(()) => {
                    self.store.add_peer(addr.id);
                }
                Err(e) => tracing::debug!("Peer {} not reachable yet: {}", addr.id.short(), e),
            }
        }
    }

    async fn dial(&self, addr: &PeerAddr) -> anyhow::Result<()> {
        let node_addr = addr.to_node_addr()?;
        let conn = self.endpoint.connect(node_addr, STORE_ALPN).await?;
        conn.close(0u32.into(), b"probe");
        Ok(())
    }
}
