use std::net::{Ipv4Addr, SocketAddr};

use clap::Args;

use common::peer::PeerAddr;
use peerdrive_daemon::state::{AppState, StateError};
use peerdrive_daemon::{spawn_service, ServiceConfig, ServiceError};

#[derive(Args, Debug, Clone)]
pub struct Run {
    /// Override the peer listen port from the config
    #[arg(long)]
    pub port: Option<u16>,

    /// Additional peer to sync with, `<hex id>` or `<hex id>@<ip:port>` (repeatable)
    #[arg(long = "peer")]
    pub peers: Vec<PeerAddr>,

    /// Do not print sync activity
    #[arg(long)]
    pub quiet: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("state error: {0}")]
    StateError(#[from] StateError),

    #[error("service failed: {0}")]
    Service(#[from] ServiceError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Run {
    type Error = RunError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.root.clone())?;
        let secret_key = state.load_key()?;

        let listen_addr = self
            .port
            .or(state.config.peer_port)
            .map(|port| SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), port));

        let mut peers = state.config.peers.clone();
        for peer in &self.peers {
            if !peers.iter().any(|known| known.id == peer.id) {
                peers.push(peer.clone());
            }
        }

        let config = ServiceConfig {
            root: state.root.clone(),
            secret_key,
            listen_addr,
            peers,
            discovery_interval: state.config.discovery_interval,
            sync: state.config.sync.clone(),
            show_activity: !self.quiet,
        };

        spawn_service(&config).await?;
        Ok("peerdrive stopped".to_string())
    }
}
