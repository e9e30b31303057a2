//! Replicated key-value store.
//!
//! Snapshots travel between peers through a store that replicates writes to every known
//! peer and notifies local subscribers whenever a key changes, whether the write came from
//! this node or from a remote one.

mod broadcast;
mod memory;
mod provider;

pub use broadcast::{BroadcastStore, StoreProtocol, STORE_ALPN};
pub use memory::MemoryStore;
pub use provider::{ReplicatedStore, StoreError, Subscription, SNAP_KEY};
