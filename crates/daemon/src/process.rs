use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use iroh::SecretKey;
use tokio::sync::watch;
use tokio::task::JoinSet;

use common::peer::{PeerAddr, PeerBuildError, PeerBuilder, PeerId};
use common::sync::SyncConfig;

use crate::display;

/// Everything needed to run a node
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub root: PathBuf,
    pub secret_key: SecretKey,
    /// if not set, an ephemeral port will be used
    pub listen_addr: Option<SocketAddr>,
    pub peers: Vec<PeerAddr>,
    pub discovery_interval: Duration,
    pub sync: SyncConfig,
    /// Print sync activity to stdout
    pub show_activity: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("failed to build peer: {0}")]
    Build(#[from] PeerBuildError),
}

/// Running node; dropping it without calling [`ShutdownHandle::shutdown`] leaves the
/// tasks running until the runtime stops.
#[derive(Debug)]
pub struct ShutdownHandle {
    peer_id: PeerId,
    shutdown_tx: watch::Sender<()>,
    tasks: JoinSet<()>,
}

impl ShutdownHandle {
    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// Signal every task to stop and wait for them
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(());
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Service task failed during shutdown: {}", e);
            }
        }
        tracing::info!("Service stopped");
    }
}

/// Build the peer and start the router, reactor and watcher
pub async fn start_service(config: &ServiceConfig) -> Result<ShutdownHandle, ServiceError> {
    let mut builder = PeerBuilder::new()
        .root(config.root.clone())
        .secret_key(config.secret_key.clone())
        .sync_config(config.sync.clone())
        .bootstrap(config.peers.iter().cloned())
        .discovery_interval(config.discovery_interval);
    if let Some(addr) = config.listen_addr {
        builder = builder.socket_address(addr);
    }
    let peer = builder.build().await?;

    tracing::info!("Node id: {}", peer.id());
    tracing::info!("Peer listening on: {:?}", peer.endpoint().bound_sockets());
    tracing::info!("Syncing {}", config.root.display());

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let mut tasks = JoinSet::new();

    if config.show_activity {
        let activity = peer.context().activity().subscribe();
        tasks.spawn(display::print_activity(activity, shutdown_rx.clone()));
    }

    // subscribe before the watcher publishes its first snapshot
    let reactor = peer.reactor();
    tasks.spawn(reactor.run(shutdown_rx.clone()));

    let adapter = peer.watch_adapter();
    let watch_rx = shutdown_rx.clone();
    tasks.spawn(async move {
        if let Err(e) = adapter.run(watch_rx).await {
            tracing::error!("Watcher stopped: {}", e);
        }
    });

    let peer_id = peer.id();
    tasks.spawn(async move {
        if let Err(e) = common::peer::spawn(peer, shutdown_rx).await {
            tracing::error!("Peer stopped with error: {}", e);
        }
    });

    Ok(ShutdownHandle {
        peer_id,
        shutdown_tx,
        tasks,
    })
}

/// Run a node until Ctrl-C
pub async fn spawn_service(config: &ServiceConfig) -> Result<(), ServiceError> {
    let handle = start_service(config).await?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
    handle.shutdown().await;
    Ok(())
}
