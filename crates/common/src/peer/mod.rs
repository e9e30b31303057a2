use iroh::protocol::Router;
use iroh::SecretKey;
use tokio::sync::watch::Receiver as WatchReceiver;
use tokio::time::MissedTickBehavior;

mod peer_addr;
mod peer_builder;
mod peer_id;
mod peer_inner;
pub mod protocol;

pub use peer_addr::{PeerAddr, PeerAddrError};
pub use peer_builder::{PeerBuildError, PeerBuilder};
pub use peer_id::{PeerId, PeerIdError, PeerSet};
pub use peer_inner::Peer;
pub use protocol::{SyncProtocol, SYNC_ALPN};

pub use iroh::NodeAddr;

use crate::store::{StoreProtocol, STORE_ALPN};

/// Fresh random node key
pub fn generate_secret_key() -> SecretKey {
    SecretKey::from_bytes(&rand::random::<[u8; 32]>())
}

/// Spawn the peer with protocol router
///
/// This starts the iroh protocol router for the sync and store protocols, and keeps
/// dialing bootstrap peers that have not joined the peer set yet. The watch adapter and
/// the reactor are run separately by the caller.
///
/// # Arguments
///
/// * `peer` - The peer instance to run
/// * `shutdown_rx` - Watch receiver for shutdown signal
pub async fn spawn(peer: Peer, mut shutdown_rx: WatchReceiver<()>) -> Result<(), PeerError> {
    let peer_id = peer.id();
    tracing::info!(peer_id = %peer_id, "Starting peer");

    let router = Router::builder(peer.endpoint().clone())
        .accept(SYNC_ALPN, SyncProtocol::new(peer.coordinator().clone()))
        .accept(STORE_ALPN, StoreProtocol::new(peer.store().clone()))
        .spawn();

    tracing::info!(peer_id = %peer_id, "Peer protocol router started");

    let mut discovery = tokio::time::interval(peer.discovery_interval());
    discovery.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            _ = discovery.tick() => peer.dial_bootstrap().await,
        }
    }
    tracing::info!(peer_id = %peer_id, "Shutdown signal received, stopping peer");

    // Shutdown the router (this closes the endpoint and stops accepting connections)
    router
        .shutdown()
        .await
        .map_err(|e| PeerError::RouterShutdown(e.into()))?;

    tracing::info!(peer_id = %peer_id, "Peer stopped");
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    #[error("failed to shutdown router: {0}")]
    RouterShutdown(anyhow::Error),
}
