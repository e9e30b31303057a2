use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use iroh::endpoint::Connection;
use iroh::Endpoint;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::peer::PeerId;

use super::SYNC_ALPN;

pub type BoxedSend = Box<dyn AsyncWrite + Send + Unpin>;
pub type BoxedRecv = Box<dyn AsyncRead + Send + Unpin>;

/// One bidirectional stream to a peer
pub struct BiStream {
    pub send: BoxedSend,
    pub recv: BoxedRecv,
}

impl std::fmt::Debug for BiStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BiStream").finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid peer id {peer}: {reason}")]
    InvalidPeer { peer: PeerId, reason: String },
    #[error("failed to connect to peer {peer}: {reason}")]
    Connect { peer: PeerId, reason: String },
    #[error("failed to open stream to peer {peer}: {reason}")]
    OpenStream { peer: PeerId, reason: String },
    #[error("peer {0} is not reachable")]
    Unreachable(PeerId),
}

/// Opens streams to peers on the sync protocol
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug + 'static {
    async fn open_stream(&self, peer: PeerId) -> Result<BiStream, TransportError>;
}

/// Transport over iroh QUIC connections. Connections are kept per peer and reused
/// until they close.
#[derive(Debug, Clone)]
pub struct IrohTransport {
    endpoint: Endpoint,
    connections: Arc<Mutex<HashMap<PeerId, Connection>>>,
}

impl IrohTransport {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            connections: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn connection(&self, peer: PeerId) -> Result<Connection, TransportError> {
        let cached = self.connections.lock().get(&peer).cloned();
        if let Some(conn) = cached {
            if conn.close_reason().is_none() {
                return Ok(conn);
            }
            tracing::debug!("connection to {} closed, reconnecting", peer);
        }

        let node_id = peer
            .to_node_id()
            .map_err(|e| TransportError::InvalidPeer {
                peer,
                reason: e.to_string(),
            })?;
        let conn = self
            .endpoint
            .connect(node_id, SYNC_ALPN)
            .await
            .map_err(|e| {
                tracing::error!("Failed to connect to peer {}: {}", peer, e);
                TransportError::Connect {
                    peer,
                    reason: e.to_string(),
                }
            })?;
        self.connections.lock().insert(peer, conn.clone());
        Ok(conn)
    }
}

#[async_trait]
impl Transport for IrohTransport {
    async fn open_stream(&self, peer: PeerId) -> Result<BiStream, TransportError> {
        let conn = self.connection(peer).await?;
        let (send, recv) = conn.open_bi().await.map_err(|e| {
            // drop it so the next attempt dials fresh
            self.connections.lock().remove(&peer);
            TransportError::OpenStream {
                peer,
                reason: e.to_string(),
            }
        })?;
        Ok(BiStream {
            send: Box::new(send),
            recv: Box::new(recv),
        })
    }
}
