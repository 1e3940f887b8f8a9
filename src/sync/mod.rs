//! Disk-to-catalog synchronization.
//!
//! Two engines share one code path for "this item now reflects disk state
//! X" ([`apply::apply_item_folder`]): the startup [`reconcile::Reconciler`]
//! diffs the whole tree against the store, and the [`watch::WatchEngine`]
//! keeps the store current from filesystem notifications afterwards.

pub mod apply;
mod observer;
pub mod reconcile;
pub mod watch;

pub use apply::{apply_item_folder, ApplyError, ApplyOutcome};
pub use observer::{
    ChangeEvent, LogObserver, NullObserver, ProgressPhase, ProgressUpdate, SyncObserver,
};
pub use reconcile::{FailedItem, ReconcileError, Reconciler, SyncReport};
pub use watch::{WatchConfig, WatchEngine, WatchError};
