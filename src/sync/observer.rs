//! Fire-and-forget progress and change notifications.
//!
//! The sync engines emit through this trait and never wait on the consumer;
//! a presentation layer (or a test) subscribes by implementing it.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info};

/// Reconciliation pass phases, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    ScanDisk,
    ScanDb,
    Add,
    Remove,
    Done,
}

/// A progress notification from the reconciliation engine.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressUpdate {
    pub phase: ProgressPhase,
    pub current: usize,
    pub total: usize,
    pub message: String,
}

/// A change notification from the live watch engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    MovieAdded { path: PathBuf },
    MovieUpdated { path: PathBuf },
    FolderDeleted { path: PathBuf },
    ActorAdded { path: PathBuf },
}

pub trait SyncObserver: Send + Sync {
    fn progress(&self, _update: ProgressUpdate) {}
    fn change(&self, _event: ChangeEvent) {}
}

/// Default observer: everything goes to the log.
pub struct LogObserver;

impl SyncObserver for LogObserver {
    fn progress(&self, update: ProgressUpdate) {
        debug!(
            phase = ?update.phase,
            current = update.current,
            total = update.total,
            "{}",
            update.message
        );
    }

    fn change(&self, event: ChangeEvent) {
        let payload = serde_json::to_string(&event).unwrap_or_default();
        info!("library change: {}", payload);
    }
}

/// Observer that swallows everything; handy when no consumer is attached.
pub struct NullObserver;

impl SyncObserver for NullObserver {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_event_serialization() {
        let event = ChangeEvent::MovieAdded {
            path: PathBuf::from("/data/StudioA/ABC-001"),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"movie_added\""));
        assert!(json.contains("ABC-001"));
    }

    #[test]
    fn test_progress_phase_serialization() {
        assert_eq!(
            serde_json::to_string(&ProgressPhase::ScanDisk).unwrap(),
            "\"scan_disk\""
        );
    }
}
