use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use iroh::discovery::pkarr::dht::DhtDiscovery;
use iroh::{Endpoint, SecretKey};

use crate::store::BroadcastStore;
use crate::sync::{ConfigError, Coordinator, SyncConfig, SyncContext};

use super::peer_addr::PeerAddr;
use super::peer_inner::Peer;
use super::protocol::IrohTransport;
use super::{PeerId, PeerSet};

const DEFAULT_DISCOVERY_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum PeerBuildError {
    #[error("sync root is required")]
    MissingRoot,
    #[error("only IPv4 bind addresses are supported, got {0}")]
    UnsupportedAddress(SocketAddr),
    #[error("discovery interval must be greater than zero")]
    ZeroDiscoveryInterval,
    #[error("invalid sync config: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to build discovery: {0}")]
    Discovery(String),
    #[error("failed to bind endpoint: {0}")]
    Bind(String),
}

#[derive(Clone, Default)]
pub struct PeerBuilder {
    /// the socket addr to expose the peer on
    ///  if not set, an ephemeral port will be used
    socket_address: Option<SocketAddr>,
    /// the identity of the peer, generated if not set
    secret_key: Option<SecretKey>,
    /// directory being synced
    root: Option<PathBuf>,
    sync_config: Option<SyncConfig>,
    bootstrap: Vec<PeerAddr>,
    discovery_interval: Option<Duration>,
}

impl PeerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn socket_address(mut self, socket_addr: SocketAddr) -> Self {
        self.socket_address = Some(socket_addr);
        self
    }

    pub fn secret_key(mut self, secret_key: SecretKey) -> Self {
        self.secret_key = Some(secret_key);
        self
    }

    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn sync_config(mut self, config: SyncConfig) -> Self {
        self.sync_config = Some(config);
        self
    }

    pub fn bootstrap(mut self, peers: impl IntoIterator<Item = PeerAddr>) -> Self {
        self.bootstrap.extend(peers);
        self
    }

    pub fn discovery_interval(mut self, interval: Duration) -> Self {
        self.discovery_interval = Some(interval);
        self
    }

    pub async fn build(self) -> Result<Peer, PeerBuildError> {
        let root = self.root.ok_or(PeerBuildError::MissingRoot)?;
        let sync_config = self.sync_config.unwrap_or_default();
        sync_config.validate()?;
        let discovery_interval = self.discovery_interval.unwrap_or(DEFAULT_DISCOVERY_INTERVAL);
        if discovery_interval.is_zero() {
            return Err(PeerBuildError::ZeroDiscoveryInterval);
        }

        // set the socket port to unspecified if not set
        let socket_addr = self
            .socket_address
            .unwrap_or_else(|| SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), 0));
        let SocketAddr::V4(bind_addr) = socket_addr else {
            return Err(PeerBuildError::UnsupportedAddress(socket_addr));
        };
        let secret_key = self.secret_key.unwrap_or_else(super::generate_secret_key);

        // setup our discovery mechanism for our peer
        let mainline_discovery = DhtDiscovery::builder()
            .secret_key(secret_key.clone())
            .build()
            .map_err(|e| PeerBuildError::Discovery(e.to_string()))?;

        let endpoint = Endpoint::builder()
            .secret_key(secret_key.clone())
            .discovery(mainline_discovery)
            .bind_addr_v4(bind_addr)
            .bind()
            .await
            .map_err(|e| PeerBuildError::Bind(e.to_string()))?;

        let local_id = PeerId::from(endpoint.node_id());
        let peers = PeerSet::new();
        let context = SyncContext::new(local_id, root, peers.clone(), sync_config);
        let coordinator = Coordinator::new(
            context.clone(),
            Arc::new(IrohTransport::new(endpoint.clone())),
        );
        let store = BroadcastStore::new(endpoint.clone(), peers);

        Ok(Peer {
            socket_address: socket_addr,
            secret_key,
            endpoint,
            context,
            coordinator,
            store,
            bootstrap: self.bootstrap,
            discovery_interval,
        })
    }
}
