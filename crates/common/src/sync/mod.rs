//! The sync engine.
//!
//! [`WatchAdapter`] publishes local changes, [`Reactor`] receives peer snapshots and hands
//! them to the [`Coordinator`], which also answers file reads from peers.

mod activity;
mod config;
mod context;
mod coordinator;
mod quiesce;
mod reactor;
mod suppress;
mod watch;

pub use activity::{Activity, SyncEvent};
pub use config::{ConfigError, QuiescenceConfig, SyncConfig};
pub use context::SyncContext;
pub use coordinator::{Coordinator, PassOutcome, PassReport, SyncError};
pub use quiesce::{until_written, Quiescence};
pub use reactor::Reactor;
pub use suppress::{ExpiringSet, PathState, Suppression};
pub use watch::{ChangeKind, PublishOutcome, RawEvent, Verdict, WatchAdapter, WatchError};
