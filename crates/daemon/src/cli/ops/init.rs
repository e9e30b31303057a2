use std::fmt;
use std::path::PathBuf;

use clap::Args;
use owo_colors::OwoColorize;

use common::peer::{PeerAddr, PeerId};
use peerdrive_daemon::state::{AppConfig, AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Peer (P2P) node listen port (optional, defaults to ephemeral port if not specified)
    #[arg(long)]
    pub peer_port: Option<u16>,

    /// Peer to sync with, `<hex id>` or `<hex id>@<ip:port>` (repeatable)
    #[arg(long = "peer")]
    pub peers: Vec<PeerAddr>,
}

#[derive(Debug)]
pub struct InitOutput {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub key_path: PathBuf,
    pub node_id: PeerId,
    pub peer_port: Option<u16>,
    pub peers: usize,
}

impl fmt::Display for InitOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} peerdrive at {}",
            "Initialized".green().bold(),
            self.root.display().to_string().bold()
        )?;
        writeln!(f, "  {} {}", "Node id:".dimmed(), self.node_id)?;
        writeln!(f, "  {} {}", "Key:".dimmed(), self.key_path.display())?;
        writeln!(f, "  {} {}", "Config:".dimmed(), self.config_path.display())?;
        let peer_port_str = match self.peer_port {
            Some(port) => port.to_string(),
            None => "ephemeral (auto-assigned)".to_string(),
        };
        writeln!(f, "  {} {}", "Peer port:".dimmed(), peer_port_str)?;
        write!(f, "  {} {}", "Peers:".dimmed(), self.peers)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = InitOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = AppConfig {
            peer_port: self.peer_port,
            peers: self.peers.clone(),
            ..Default::default()
        };
        let state = AppState::init(ctx.root.clone(), Some(config))?;
        let node_id = PeerId::from(state.load_key()?.public());

        Ok(InitOutput {
            root: state.root,
            config_path: state.config_path,
            key_path: state.key_path,
            node_id,
            peer_port: state.config.peer_port,
            peers: state.config.peers.len(),
        })
    }
}
