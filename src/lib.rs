//! Kinoteka Library
//!
//! A folder-based movie-library manager: scans data roots for NFO sidecar
//! descriptors, keeps a SQLite catalog in sync with the filesystem, and
//! watches for live changes after the startup reconciliation.

pub mod catalog;
pub mod config;
pub mod library;
pub mod nfo;
pub mod sqlite_persistence;
pub mod sync;

// Re-export the types the binary and integration tests reach for.
pub use catalog::{CatalogStore, FolderKey, Movie, MovieRecord, SqliteCatalogStore};
pub use config::{AppConfig, CliConfig, FileConfig};
pub use sync::{
    apply_item_folder, ChangeEvent, LogObserver, NullObserver, ProgressPhase, ProgressUpdate,
    Reconciler, SyncObserver, SyncReport, WatchConfig, WatchEngine,
};
