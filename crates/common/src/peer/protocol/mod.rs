use anyhow::anyhow;
use futures::future::BoxFuture;
use iroh::endpoint::Connection;
use iroh::protocol::{AcceptError, ProtocolHandler};

use crate::peer::PeerId;
use crate::sync::Coordinator;

mod memory;
mod transport;

pub use memory::{MemoryNetwork, MemoryTransport, StreamHandler};
pub use transport::{BiStream, BoxedRecv, BoxedSend, IrohTransport, Transport, TransportError};

/// ALPN identifier for the file sync protocol
pub const SYNC_ALPN: &[u8] = b"/peerdrive/sync/1.0.0";

/// Accepts sync streams and hands each one to the coordinator.
///
/// Every accepted stream is served on its own task, so a slow or failing stream
/// never holds up the others on the same connection.
#[derive(Debug, Clone)]
pub struct SyncProtocol {
    coordinator: Coordinator,
}

impl SyncProtocol {
    pub fn new(coordinator: Coordinator) -> Self {
        Self { coordinator }
    }
}

async fn handle_connection(coordinator: Coordinator, conn: Connection) -> Result<(), AcceptError> {
    let remote = conn.remote_node_id().map_err(|e| {
        let err: Box<dyn std::error::Error + Send + Sync> =
            anyhow!("failed to identify remote node: {}", e).into();
        AcceptError::from(err)
    })?;
    let remote = PeerId::from(remote);
    tracing::debug!("new sync connection from {}", remote);

    loop {
        let (send, recv) = match conn.accept_bi().await {
            Ok(streams) => streams,
            Err(e) => {
                tracing::debug!("sync connection from {} closed: {}", remote, e);
                return Ok(());
            }
        };
        tracing::debug!("bidirectional stream accepted from {}", remote);

        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            coordinator
                .serve(
                    remote,
                    BiStream {
                        send: Box::new(send),
                        recv: Box::new(recv),
                    },
                )
                .await;
        });
    }
}

impl ProtocolHandler for SyncProtocol {
    #[allow(refining_impl_trait)]
    fn accept(&self, conn: Connection) -> BoxFuture<'static, Result<(), AcceptError>> {
        let coordinator = self.coordinator.clone();
        Box::pin(handle_connection(coordinator, conn))
    }
}
