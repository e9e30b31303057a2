use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::peer::PeerId;

use super::transport::{BiStream, Transport, TransportError};

const PIPE_CAPACITY: usize = 64 * 1024;

/// Serves streams opened by a remote peer
#[async_trait]
pub trait StreamHandler: Send + Sync + 'static {
    async fn handle(&self, remote: PeerId, stream: BiStream);
}

/// In-process network connecting peers through `tokio::io::duplex` pipes
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    handlers: Arc<RwLock<HashMap<PeerId, Arc<dyn StreamHandler>>>>,
}

impl std::fmt::Debug for MemoryNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let peers: Vec<PeerId> = self.handlers.read().keys().copied().collect();
        f.debug_struct("MemoryNetwork").field("peers", &peers).finish()
    }
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, peer: PeerId, handler: Arc<dyn StreamHandler>) {
        self.handlers.write().insert(peer, handler);
    }

    pub fn unregister(&self, peer: &PeerId) {
        self.handlers.write().remove(peer);
    }

    /// Transport that dials out as `local`
    pub fn transport(&self, local: PeerId) -> MemoryTransport {
        MemoryTransport {
            local,
            network: self.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MemoryTransport {
    local: PeerId,
    network: MemoryNetwork,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open_stream(&self, peer: PeerId) -> Result<BiStream, TransportError> {
        let handler = self
            .network
            .handlers
            .read()
            .get(&peer)
            .cloned()
            .ok_or(TransportError::Unreachable(peer))?;

        let (local_end, remote_end) = tokio::io::duplex(PIPE_CAPACITY);
        let (local_recv, local_send) = tokio::io::split(local_end);
        let (remote_recv, remote_send) = tokio::io::split(remote_end);

        let remote = self.local;
        tokio::spawn(async move {
            handler
                .handle(
                    remote,
                    BiStream {
                        send: Box::new(remote_send),
                        recv: Box::new(remote_recv),
                    },
                )
                .await;
        });

        Ok(BiStream {
            send: Box::new(local_send),
            recv: Box::new(local_recv),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    struct Echo;

    #[async_trait]
    impl StreamHandler for Echo {
        async fn handle(&self, remote: PeerId, mut stream: BiStream) {
            let mut buf = Vec::new();
            stream.recv.read_to_end(&mut buf).await.unwrap();
            stream.send.write_all(remote.as_bytes()).await.unwrap();
            stream.send.write_all(&buf).await.unwrap();
            stream.send.shutdown().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_streams_reach_registered_handler() {
        let network = MemoryNetwork::new();
        let a = PeerId::from_bytes([1; 32]);
        let b = PeerId::from_bytes([2; 32]);
        network.register(b, Arc::new(Echo));

        let mut stream = network.transport(a).open_stream(b).await.unwrap();
        stream.send.write_all(b"ping").await.unwrap();
        stream.send.shutdown().await.unwrap();

        let mut reply = Vec::new();
        stream.recv.read_to_end(&mut reply).await.unwrap();
        assert_eq!(&reply[..32], a.as_bytes());
        assert_eq!(&reply[32..], b"ping");
    }

    #[tokio::test]
    async fn test_unknown_peer_is_unreachable() {
        let network = MemoryNetwork::new();
        let a = PeerId::from_bytes([1; 32]);
        let err = network
            .transport(a)
            .open_stream(PeerId::from_bytes([9; 32]))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Unreachable(_)));
    }
}
