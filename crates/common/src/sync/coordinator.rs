use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::Semaphore;

use crate::event::{Event, EventError, Op};
use crate::peer::protocol::{BiStream, StreamHandler, Transport, TransportError};
use crate::peer::PeerId;
use crate::snapshot::{self, Snap, SnapshotError};
use crate::wire::{self, WireError};

use super::activity::SyncEvent;
use super::context::SyncContext;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("wire error: {0}")]
    Wire(#[from] WireError),
    #[error("filesystem error: {0}")]
    Event(#[from] EventError),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("unsupported operation code {0}")]
    UnsupportedOperation(u8),
    #[error("{op} {path} pushed by peer {peer} outside the peer set")]
    UnknownPeer { peer: PeerId, op: Op, path: String },
    #[error("peer {peer} closed the stream without answering for {path}")]
    NoResponse { peer: PeerId, path: String },
    #[error("peer {peer} answered {path} with {op} {got}")]
    UnexpectedResponse {
        peer: PeerId,
        path: String,
        op: Op,
        got: String,
    },
    #[error("background task failed: {0}")]
    Task(String),
}

/// Counts from one reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub peer: PeerId,
    pub written: usize,
    pub removed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Another pass held the lock, the snapshot was dropped
    Skipped,
    Completed(PassReport),
}

/// Serves file reads to peers and reconciles the local tree against peer snapshots.
///
/// At most one reconciliation pass runs at a time. A snapshot that arrives while a pass is
/// running is dropped rather than queued; the next published snapshot covers it.
#[derive(Debug, Clone)]
pub struct Coordinator {
    context: SyncContext,
    transport: Arc<dyn Transport>,
    pass_lock: Arc<Semaphore>,
}

impl Coordinator {
    pub fn new(context: SyncContext, transport: Arc<dyn Transport>) -> Self {
        Self {
            context,
            transport,
            pass_lock: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn context(&self) -> &SyncContext {
        &self.context
    }

    /// Serve one inbound stream until the remote closes it, then close our side
    pub async fn serve(&self, remote: PeerId, stream: BiStream) {
        let BiStream { mut send, mut recv } = stream;
        if let Err(e) = self.handle_stream(remote, &mut send, &mut recv).await {
            tracing::warn!("Sync stream from peer {} aborted: {}", remote.short(), e);
        }
        if let Err(e) = send.shutdown().await {
            tracing::debug!("failed to close stream to {}: {}", remote.short(), e);
        }
    }

    /// Answer every event read from `recv`.
    ///
    /// Reads are answered with the file contents. Pushed writes and removes are applied
    /// when the node accepts pushes and `remote` is in the peer set. Anything else ends
    /// the stream with an error.
    pub async fn handle_stream<S, R>(
        &self,
        remote: PeerId,
        send: &mut S,
        recv: &mut R,
    ) -> Result<(), SyncError>
    where
        S: AsyncWrite + Unpin + Send + ?Sized,
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        loop {
            let event = match wire::read_frame(recv).await {
                Ok(Some(event)) => event,
                Ok(None) => return Ok(()),
                Err(WireError::UnsupportedOperation(code)) => {
                    return Err(SyncError::UnsupportedOperation(code))
                }
                Err(e) => return Err(e.into()),
            };
            tracing::debug!("{} {} from peer {}", event.op, event.path, remote.short());

            match event.op {
                Op::Read => {
                    let mut response = event;
                    response.load(self.context.root()).await?;
                    wire::write_frame(send, &response).await?;
                    self.context.activity().emit(SyncEvent::Served {
                        peer: remote,
                        path: response.path,
                    });
                }
                Op::Write | Op::Remove if self.context.config().accept_push => {
                    if !self.context.peers().contains(&remote) {
                        return Err(SyncError::UnknownPeer {
                            peer: remote,
                            op: event.op,
                            path: event.path,
                        });
                    }
                    self.apply_inbound(&event).await?;
                    self.context.activity().emit(SyncEvent::Accepted {
                        peer: remote,
                        op: event.op,
                        path: event.path,
                    });
                }
                op => return Err(SyncError::UnsupportedOperation(op.code())),
            }
        }
    }

    /// Fetch the contents and modification time of `path` from `peer`
    pub async fn pull(&self, peer: PeerId, path: &str) -> Result<Event, SyncError> {
        let BiStream { mut send, mut recv } = self.transport.open_stream(peer).await?;

        wire::write_frame(&mut send, &Event::read_request(path)).await?;
        send.shutdown().await.map_err(WireError::Io)?;

        let response = wire::read_frame(&mut recv)
            .await?
            .ok_or_else(|| SyncError::NoResponse {
                peer,
                path: path.to_string(),
            })?;
        if response.op != Op::Read || response.path != path {
            return Err(SyncError::UnexpectedResponse {
                peer,
                path: path.to_string(),
                op: response.op,
                got: response.path,
            });
        }
        Ok(response)
    }

    /// Bring the local tree in line with `snap`.
    ///
    /// Differing files are pulled from the snapshot's origin, then files the origin no
    /// longer has are removed. A failure on one path is logged and counted without
    /// stopping the pass.
    pub async fn reconcile(&self, snap: Snap) -> Result<PassOutcome, SyncError> {
        let Ok(_permit) = self.pass_lock.try_acquire() else {
            tracing::debug!(
                "Reconciliation already running, dropping snapshot from peer {}",
                snap.origin.short()
            );
            return Ok(PassOutcome::Skipped);
        };

        let origin = snap.origin;
        let root = self.context.root().to_path_buf();
        let local = tokio::task::spawn_blocking(move || snapshot::local_metas(&root))
            .await
            .map_err(|e| SyncError::Task(e.to_string()))??;
        let diff = snapshot::diff(&local, &snap.metas);

        let mut report = PassReport {
            peer: origin,
            written: 0,
            removed: 0,
            failed: 0,
        };
        if diff.is_empty() {
            tracing::debug!("Already in sync with peer {}", origin.short());
            return Ok(PassOutcome::Completed(report));
        }

        let fetches: Vec<String> = diff.fetches().map(|meta| meta.path.clone()).collect();
        tracing::info!(
            "Reconciling with peer {}: {} to fetch, {} to remove",
            origin.short(),
            fetches.len(),
            diff.removals().count()
        );

        let mut pulls = stream::iter(fetches)
            .map(|path| async move {
                let result = self.fetch(origin, &path).await;
                (path, result)
            })
            .buffer_unordered(self.context.config().pull_concurrency);
        while let Some((path, result)) = pulls.next().await {
            match result {
                Ok(()) => report.written += 1,
                Err(e) => {
                    tracing::warn!("Failed to pull {} from peer {}: {}", path, origin.short(), e);
                    report.failed += 1;
                }
            }
        }

        for meta in diff.removals() {
            match self.remove(origin, &meta.path).await {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    tracing::warn!("Failed to remove {}: {}", meta.path, e);
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            "Reconciled with peer {}: {} written, {} removed, {} failed",
            origin.short(),
            report.written,
            report.removed,
            report.failed
        );
        Ok(PassOutcome::Completed(report))
    }

    async fn fetch(&self, peer: PeerId, path: &str) -> Result<(), SyncError> {
        let response = self.pull(peer, path).await?;
        let event = Event::write(path, response.data, response.time);
        self.apply_inbound(&event).await?;
        self.context.activity().emit(SyncEvent::Pulled {
            peer,
            path: path.to_string(),
        });
        Ok(())
    }

    async fn remove(&self, peer: PeerId, path: &str) -> Result<(), SyncError> {
        match self.apply_inbound(&Event::remove(path)).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                tracing::debug!("{} already gone", path);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
        self.context.activity().emit(SyncEvent::Removed {
            peer,
            path: path.to_string(),
        });
        Ok(())
    }

    /// Apply an event on behalf of a peer with the path marked inbound-pending.
    ///
    /// The mark is refreshed after the write lands so the grace window covers the
    /// watcher events the write itself produces.
    async fn apply_inbound(&self, event: &Event) -> Result<(), EventError> {
        let inbound = self.context.suppression().inbound();
        inbound.mark(&event.path);
        let result = event.apply(self.context.root()).await;
        inbound.mark(&event.path);
        result
    }
}

#[async_trait]
impl StreamHandler for Coordinator {
    async fn handle(&self, remote: PeerId, stream: BiStream) {
        self.serve(remote, stream).await;
    }
}
