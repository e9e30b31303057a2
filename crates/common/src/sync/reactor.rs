use tokio::sync::watch::Receiver as WatchReceiver;
use tokio::task::JoinSet;

use crate::snapshot::Snap;
use crate::store::{Subscription, SNAP_KEY};

use super::coordinator::{Coordinator, PassOutcome};

/// Turns snapshot notifications from the store into reconciliation passes
#[derive(Debug)]
pub struct Reactor {
    coordinator: Coordinator,
    subscription: Subscription,
}

impl Reactor {
    pub fn new(coordinator: Coordinator, subscription: Subscription) -> Self {
        Self {
            coordinator,
            subscription,
        }
    }

    /// Decide whether a notification should be reconciled against.
    ///
    /// Undecodable values, our own snapshots and snapshots from peers outside the peer
    /// set are dropped.
    pub fn admit(&self, key: &str, value: &[u8]) -> Option<Snap> {
        if key != SNAP_KEY {
            return None;
        }
        let snap = match Snap::from_bytes(value) {
            Ok(snap) => snap,
            Err(e) => {
                tracing::warn!("Dropping undecodable snapshot: {}", e);
                return None;
            }
        };
        let context = self.coordinator.context();
        if snap.origin == context.local_id() {
            return None;
        }
        if !context.peers().contains(&snap.origin) {
            tracing::debug!("Ignoring snapshot from unknown peer {}", snap.origin.short());
            return None;
        }
        Some(snap)
    }

    /// React to notifications until shutdown or until the store goes away
    pub async fn run(mut self, mut shutdown_rx: WatchReceiver<()>) {
        let mut passes = JoinSet::new();
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    tracing::info!("Shutdown signal received, stopping reactor");
                    break;
                }
                change = self.subscription.next() => {
                    let Some((key, value)) = change else {
                        tracing::warn!("Store subscription closed, stopping reactor");
                        break;
                    };
                    if let Some(snap) = self.admit(&key, &value) {
                        tracing::debug!("Snapshot from peer {} with {} entries", snap.origin.short(), snap.metas.len());
                        let coordinator = self.coordinator.clone();
                        passes.spawn(async move { coordinator.reconcile(snap).await });
                    }
                }
                Some(joined) = passes.join_next() => match joined {
                    Ok(Ok(PassOutcome::Skipped)) => {}
                    Ok(Ok(PassOutcome::Completed(report))) => {
                        tracing::debug!("Pass against peer {} finished: {:?}", report.peer.short(), report);
                    }
                    Ok(Err(e)) => tracing::error!("Reconciliation failed: {}", e),
                    Err(e) if e.is_panic() => tracing::error!("Reconciliation panicked: {}", e),
                    Err(_) => {}
                },
            }
        }
        passes.shutdown().await;
    }
}
