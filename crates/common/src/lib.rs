//! Core building blocks for peerdrive.
//!
//! A peer publishes a snapshot of its sync root to a replicated store, every other peer diffs
//! that snapshot against its own tree and pulls the files that differ straight from the
//! originating peer. The modules here are layered bottom-up:
//!
//! - [`event`]: the unit of work exchanged on the wire and applied to disk
//! - [`wire`]: length-prefixed framing of events over a byte stream
//! - [`snapshot`]: directory walks, snapshot encoding and the diff engine
//! - [`store`]: the replicated key-value channel snapshots travel through
//! - [`peer`]: identities, transports and the iroh-backed node
//! - [`sync`]: the coordinator, the watch adapter and the remote change reactor

pub mod event;
pub mod paths;
pub mod peer;
pub mod snapshot;
pub mod store;
pub mod sync;
pub mod wire;

pub mod prelude {
    pub use crate::event::{Event, EventError, Op};
    pub use crate::peer::{PeerId, PeerSet};
    pub use crate::snapshot::{diff, snapshot, Diff, Meta, Snap};
    pub use crate::store::{ReplicatedStore, SNAP_KEY};
    pub use crate::sync::{Coordinator, Reactor, SyncConfig, SyncContext, WatchAdapter};
}
