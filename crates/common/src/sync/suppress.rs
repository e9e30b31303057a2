//! Echo suppression.
//!
//! A path written by the coordinator on behalf of a peer is *inbound-pending*, a path the
//! watch adapter is about to publish is *outbound-pending*. Watcher events for pending paths
//! are dropped, which keeps a pulled file from being re-published and bounced back. Entries
//! expire on their own after the grace window.

use std::time::Duration;

use moka::sync::Cache;

const MAX_PENDING: u64 = 1_000_000;

/// Set of paths whose membership lapses after a fixed time to live
#[derive(Clone)]
pub struct ExpiringSet {
    entries: Cache<String, ()>,
}

impl std::fmt::Debug for ExpiringSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiringSet")
            .field("len", &self.entries.entry_count())
            .finish()
    }
}

impl ExpiringSet {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(MAX_PENDING)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Add `path`, restarting its time to live if already present
    pub fn mark(&self, path: &str) {
        self.entries.insert(path.to_string(), ());
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn clear(&self, path: &str) {
        self.entries.invalidate(path);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathState {
    Idle,
    OutboundPending,
    InboundPending,
}

#[derive(Debug, Clone)]
pub struct Suppression {
    outbound: ExpiringSet,
    inbound: ExpiringSet,
}

impl Suppression {
    pub fn new(grace_window: Duration) -> Self {
        Self {
            outbound: ExpiringSet::new(grace_window),
            inbound: ExpiringSet::new(grace_window),
        }
    }

    pub fn outbound(&self) -> &ExpiringSet {
        &self.outbound
    }

    pub fn inbound(&self) -> &ExpiringSet {
        &self.inbound
    }

    pub fn state(&self, path: &str) -> PathState {
        if self.inbound.contains(path) {
            PathState::InboundPending
        } else if self.outbound.contains(path) {
            PathState::OutboundPending
        } else {
            PathState::Idle
        }
    }
}
