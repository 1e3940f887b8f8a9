//! Startup reconciliation: full disk-vs-store diff and correction.
//!
//! Additions run before removals so a descriptor whose code already exists
//! under a different stored folder is matched and updated in place; only
//! keys still unaccounted for after the add pass are deleted. Work happens
//! in small batches with a cooperative yield between them, so a large
//! collection never blocks the runtime.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::catalog::{CatalogStore, FolderKey};
use crate::library;
use crate::sync::apply::apply_item_folder;
use crate::sync::observer::{ProgressPhase, ProgressUpdate, SyncObserver};

/// Removals per batch. Each removal is one transactional delete.
const REMOVE_BATCH_SIZE: usize = 80;

/// Additions per batch, smaller because every addition re-parses a
/// descriptor and runs several find-or-create lookups.
const ADD_BATCH_SIZE: usize = 15;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("no data roots configured")]
    NoRoots,

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

/// One per-item failure recorded during a pass.
#[derive(Debug, Clone, Serialize)]
pub struct FailedItem {
    pub path: String,
    pub reason: String,
}

/// Aggregate outcome of one reconciliation pass.
#[derive(Debug, Default, Serialize)]
pub struct SyncReport {
    pub added_count: usize,
    pub removed_count: usize,
    pub added: Vec<String>,
    pub duplicates: Vec<String>,
    pub failed: Vec<FailedItem>,
}

pub struct Reconciler {
    store: Arc<dyn CatalogStore>,
    observer: Arc<dyn SyncObserver>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn CatalogStore>, observer: Arc<dyn SyncObserver>) -> Self {
        Self { store, observer }
    }

    /// Run one full pass over the configured roots.
    ///
    /// Per-item failures land in the report; only an unusable configuration
    /// or an unreachable store propagate as errors.
    pub async fn run(&self, roots: &[PathBuf]) -> Result<SyncReport, ReconcileError> {
        if roots.is_empty() {
            return Err(ReconcileError::NoRoots);
        }

        let mut report = SyncReport::default();

        // Phase 1: walk the roots, one disk key per item folder.
        let disk = self.scan_disk(roots);

        // Phase 2: stored keys.
        let stored: BTreeSet<FolderKey> = self.store.list_folder_keys()?.into_iter().collect();
        self.progress(
            ProgressPhase::ScanDb,
            stored.len(),
            stored.len(),
            format!("{} items in store", stored.len()),
        );

        let disk_keys: BTreeSet<FolderKey> = disk.keys().cloned().collect();
        let to_add: Vec<&FolderKey> = disk_keys.difference(&stored).collect();

        // Phase 3: additions, batched. A code already stored under another
        // folder is an update-in-place and is reported as a duplicate.
        let add_total = to_add.len();
        let mut processed = 0usize;
        for batch in to_add.chunks(ADD_BATCH_SIZE) {
            for key in batch {
                let folder = &disk[*key];
                let root = &roots[key.root_index];
                match apply_item_folder(self.store.as_ref(), root, key.root_index, folder) {
                    Ok(outcome) if outcome.was_created => {
                        report.added.push(key.folder_path.clone());
                    }
                    Ok(_) => {
                        warn!(
                            folder = %key.folder_path,
                            "duplicate natural code, store row updated to this folder"
                        );
                        report.duplicates.push(key.folder_path.clone());
                    }
                    Err(e) => {
                        warn!(folder = %folder.display(), error = %e, "failed to add item");
                        report.failed.push(FailedItem {
                            path: key.folder_path.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
            processed += batch.len();
            self.progress(
                ProgressPhase::Add,
                processed,
                add_total,
                format!("added {}/{}", processed, add_total),
            );
            tokio::task::yield_now().await;
        }
        report.added_count = report.added.len();

        // Phase 4: removals, batched. Re-read stored keys so rows the add
        // pass already re-pointed at a new folder are not deleted.
        let stored_after: BTreeSet<FolderKey> =
            self.store.list_folder_keys()?.into_iter().collect();
        let to_remove: Vec<&FolderKey> = stored_after.difference(&disk_keys).collect();
        let remove_total = to_remove.len();
        let mut processed = 0usize;
        for batch in to_remove.chunks(REMOVE_BATCH_SIZE) {
            for key in batch {
                match self.store.delete_by_folder_key(key) {
                    Ok(n) => report.removed_count += n,
                    Err(e) => {
                        warn!(key = %key, error = %e, "failed to remove item");
                        report.failed.push(FailedItem {
                            path: key.folder_path.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
            processed += batch.len();
            self.progress(
                ProgressPhase::Remove,
                processed,
                remove_total,
                format!("removed {}/{}", processed, remove_total),
            );
            tokio::task::yield_now().await;
        }

        self.progress(
            ProgressPhase::Done,
            1,
            1,
            format!(
                "reconcile done: {} added, {} removed, {} duplicates, {} failed",
                report.added_count,
                report.removed_count,
                report.duplicates.len(),
                report.failed.len()
            ),
        );
        info!(
            added = report.added_count,
            removed = report.removed_count,
            duplicates = report.duplicates.len(),
            failed = report.failed.len(),
            "reconciliation pass complete"
        );

        Ok(report)
    }

    /// Collect every item folder on disk, keyed by `(root index, relative
    /// folder)` with separators normalized. Unreadable entries are logged
    /// and skipped.
    fn scan_disk(&self, roots: &[PathBuf]) -> BTreeMap<FolderKey, PathBuf> {
        let mut disk = BTreeMap::new();
        for (root_index, root) in roots.iter().enumerate() {
            let walker = WalkDir::new(root)
                .follow_links(false)
                .into_iter()
                .filter_entry(|e| e.depth() == 0 || !is_hidden_name(e.file_name()));
            for entry in walker {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!(root = %root.display(), error = %e, "walk error, entry skipped");
                        continue;
                    }
                };
                if !entry.file_type().is_file() || !library::is_nfo_file(entry.path()) {
                    continue;
                }
                let Some(folder) = entry.path().parent() else {
                    continue;
                };
                let Ok(relative) = folder.strip_prefix(root) else {
                    continue;
                };
                let key = FolderKey::new(root_index, &relative.to_string_lossy());
                disk.entry(key).or_insert_with(|| folder.to_path_buf());
            }
            self.progress(
                ProgressPhase::ScanDisk,
                root_index + 1,
                roots.len(),
                format!("scanned {}", root.display()),
            );
        }
        disk
    }

    fn progress(&self, phase: ProgressPhase, current: usize, total: usize, message: String) {
        self.observer.progress(ProgressUpdate {
            phase,
            current,
            total,
            message,
        });
    }
}

fn is_hidden_name(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}
