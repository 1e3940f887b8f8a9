//! Live filesystem watching.
//!
//! One [`WatchEngine`] instance owns everything that used to be ambient
//! state: the per-root notify subscriptions, the per-folder debounce map,
//! the pending delay timers, and the single handler task that serializes
//! every store mutation. Multiple roots feed one channel; the handler
//! drains it in arrival order, so no two events touch the store
//! concurrently for the same engine.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogStore, FolderKey};
use crate::library;
use crate::nfo::NFO_EXTENSION;
use crate::sync::apply::apply_item_folder;
use crate::sync::observer::{ChangeEvent, SyncObserver};

/// Burst of notifications for one new descriptor collapses into one apply.
const DEBOUNCE_WINDOW: Duration = Duration::from_millis(400);

/// A directory often appears before its contents finished copying; one
/// delayed re-check catches what the first look missed.
const RECHECK_DELAY: Duration = Duration::from_millis(2500);

/// Lifetime of a secondary watch layered on one folder after an edit.
const TEMP_WATCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Events deeper than this below a root are ignored.
const MAX_WATCH_DEPTH: usize = 3;

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub debounce_window: Duration,
    pub recheck_delay: Duration,
    pub temp_watch_timeout: Duration,
    pub max_depth: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_window: DEBOUNCE_WINDOW,
            recheck_delay: RECHECK_DELAY,
            temp_watch_timeout: TEMP_WATCH_TIMEOUT,
            max_depth: MAX_WATCH_DEPTH,
        }
    }
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("no data roots configured")]
    NoRoots,

    #[error("watcher error: {0}")]
    Notify(#[from] notify::Error),
}

/// Internal events after filtering/classification, processed in order by
/// the handler task.
#[derive(Debug)]
enum EngineEvent {
    DirAdded { root_index: usize, path: PathBuf },
    DirRemoved { root_index: usize, path: PathBuf },
    NfoAdded { root_index: usize, folder: PathBuf },
    DebouncedFolder { root_index: usize, folder: PathBuf },
    NfoChanged { root_index: usize, path: PathBuf },
    NfoRemoved { root_index: usize, path: PathBuf },
    RecheckDir { root_index: usize, path: PathBuf },
}

struct EngineState {
    roots: Vec<PathBuf>,
    // Held to keep the notify subscriptions alive; dropped on stop.
    _watchers: Vec<RecommendedWatcher>,
    handler: JoinHandle<()>,
    cancel: CancellationToken,
    tx: UnboundedSender<EngineEvent>,
}

/// Watches configured data roots and keeps the catalog in sync with live
/// filesystem changes. `start`/`stop` lifecycle, restartable.
pub struct WatchEngine {
    store: Arc<dyn CatalogStore>,
    observer: Arc<dyn SyncObserver>,
    config: WatchConfig,
    state: Mutex<Option<EngineState>>,
}

impl WatchEngine {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        observer: Arc<dyn SyncObserver>,
        config: WatchConfig,
    ) -> Self {
        Self {
            store,
            observer,
            config,
            state: Mutex::new(None),
        }
    }

    pub fn is_watching(&self) -> bool {
        self.state.lock().unwrap().is_some()
    }

    /// Subscribe to every root and start the handler task. An already
    /// running engine is stopped first.
    pub async fn start(&self, roots: Vec<PathBuf>) -> Result<(), WatchError> {
        if roots.is_empty() {
            return Err(WatchError::NoRoots);
        }
        self.stop().await;

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let mut watchers = Vec::with_capacity(roots.len());
        for (root_index, root) in roots.iter().enumerate() {
            let watcher = subscribe_root(root.clone(), root_index, self.config.max_depth, tx.clone())?;
            watchers.push(watcher);
            info!(root = %root.display(), "watching data root");
        }

        let handler = tokio::spawn(run_handler(
            self.store.clone(),
            self.observer.clone(),
            self.config.clone(),
            roots.clone(),
            rx,
            tx.clone(),
            cancel.clone(),
        ));

        let mut state = self.state.lock().unwrap();
        *state = Some(EngineState {
            roots,
            _watchers: watchers,
            handler,
            cancel,
            tx,
        });
        Ok(())
    }

    /// Tear down all subscriptions and cancel every pending debounce/delay
    /// timer. A stopped engine can be started again.
    pub async fn stop(&self) {
        let state = self.state.lock().unwrap().take();
        if let Some(state) = state {
            state.cancel.cancel();
            drop(state._watchers);
            if let Err(e) = state.handler.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "watch handler ended abnormally");
                }
            }
            info!("file watching stopped");
        }
    }

    /// Layer a short-lived watch on a single folder, catching a follow-up
    /// on-disk change after an external edit. Self-cancels after the
    /// configured timeout whether or not anything happened.
    pub fn watch_folder_temporarily(&self, folder: &Path) -> Result<(), WatchError> {
        let state = self.state.lock().unwrap();
        let Some(state) = state.as_ref() else {
            debug!("temporary watch requested while engine is stopped, ignoring");
            return Ok(());
        };

        let Some(root_index) = state
            .roots
            .iter()
            .position(|root| folder.starts_with(root))
        else {
            debug!(folder = %folder.display(), "folder outside all data roots, ignoring");
            return Ok(());
        };

        let cancel = state.cancel.clone();
        let timeout = self.config.temp_watch_timeout;
        let folder = folder.to_path_buf();

        let event_tx = state.tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let Ok(event) = res else { return };
            if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                return;
            }
            for path in event.paths {
                if library::is_nfo_file(&path) {
                    let _ = event_tx.send(EngineEvent::NfoChanged {
                        root_index,
                        path,
                    });
                }
            }
        })?;
        watcher.watch(&folder, RecursiveMode::NonRecursive)?;

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {}
            }
            drop(watcher);
            debug!(folder = %folder.display(), "temporary watch closed");
        });
        Ok(())
    }
}

/// Create the recursive notify subscription for one root. Classification
/// and filtering happen in the callback so the channel only ever carries
/// events the handler cares about.
fn subscribe_root(
    root: PathBuf,
    root_index: usize,
    max_depth: usize,
    tx: UnboundedSender<EngineEvent>,
) -> Result<RecommendedWatcher, WatchError> {
    let watch_root = root.clone();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "watcher error");
                return;
            }
        };
        for path in event.paths {
            if let Some(engine_event) = classify(&root, root_index, &event.kind, path, max_depth)
            {
                let _ = tx.send(engine_event);
            }
        }
    })?;
    watcher.watch(&watch_root, RecursiveMode::Recursive)?;
    Ok(watcher)
}

/// Map a raw notification to an engine event, applying the hard filters:
/// depth bound, hidden path components, and "any file extension other than
/// the descriptor's is ignored outright".
fn classify(
    root: &Path,
    root_index: usize,
    kind: &EventKind,
    path: PathBuf,
    max_depth: usize,
) -> Option<EngineEvent> {
    let relative = path.strip_prefix(root).ok()?;
    let components: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if components.is_empty() || components.len() > max_depth {
        return None;
    }
    if components.iter().any(|c| c.starts_with('.')) {
        return None;
    }

    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase());
    let is_nfo = extension.as_deref() == Some(NFO_EXTENSION);

    match kind {
        EventKind::Create(CreateKind::Folder) => {
            Some(EngineEvent::DirAdded { root_index, path })
        }
        EventKind::Create(CreateKind::File) => nfo_added(root_index, &path, is_nfo),
        EventKind::Create(_) => {
            if path.is_dir() {
                Some(EngineEvent::DirAdded { root_index, path })
            } else {
                nfo_added(root_index, &path, is_nfo)
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            departed(root_index, path, extension.as_deref())
        }
        EventKind::Modify(ModifyKind::Name(_)) => {
            if path.is_dir() {
                Some(EngineEvent::DirAdded { root_index, path })
            } else if path.is_file() {
                nfo_added(root_index, &path, is_nfo)
            } else {
                departed(root_index, path, extension.as_deref())
            }
        }
        EventKind::Modify(_) => {
            if is_nfo && path.is_file() {
                Some(EngineEvent::NfoChanged { root_index, path })
            } else {
                None
            }
        }
        EventKind::Remove(RemoveKind::Folder) => {
            Some(EngineEvent::DirRemoved { root_index, path })
        }
        EventKind::Remove(RemoveKind::File) => {
            is_nfo.then_some(EngineEvent::NfoRemoved { root_index, path })
        }
        EventKind::Remove(_) => departed(root_index, path, extension.as_deref()),
        _ => None,
    }
}

fn nfo_added(root_index: usize, path: &Path, is_nfo: bool) -> Option<EngineEvent> {
    if !is_nfo {
        return None;
    }
    let folder = path.parent()?.to_path_buf();
    Some(EngineEvent::NfoAdded { root_index, folder })
}

/// A path that no longer exists: the extension decides whether it was a
/// descriptor or (extensionless) a directory.
fn departed(root_index: usize, path: PathBuf, extension: Option<&str>) -> Option<EngineEvent> {
    match extension {
        Some(NFO_EXTENSION) => Some(EngineEvent::NfoRemoved { root_index, path }),
        Some(_) => None,
        None => Some(EngineEvent::DirRemoved { root_index, path }),
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_handler(
    store: Arc<dyn CatalogStore>,
    observer: Arc<dyn SyncObserver>,
    config: WatchConfig,
    roots: Vec<PathBuf>,
    mut rx: UnboundedReceiver<EngineEvent>,
    tx: UnboundedSender<EngineEvent>,
    cancel: CancellationToken,
) {
    let mut debounce: HashMap<(usize, PathBuf), JoinHandle<()>> = HashMap::new();

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        match event {
            EngineEvent::DirAdded { root_index, path } => {
                debug!(path = %path.display(), "directory added");
                handle_dir_added(&*store, &*observer, &roots, root_index, &path);

                // One delayed re-check of the same directory, in case its
                // contents were still being copied.
                let recheck_tx = tx.clone();
                let recheck_cancel = cancel.clone();
                let delay = config.recheck_delay;
                tokio::spawn(async move {
                    tokio::select! {
                        _ = recheck_cancel.cancelled() => {}
                        _ = tokio::time::sleep(delay) => {
                            let _ = recheck_tx.send(EngineEvent::RecheckDir { root_index, path });
                        }
                    }
                });
            }
            EngineEvent::RecheckDir { root_index, path } => {
                if path.is_dir() {
                    debug!(path = %path.display(), "re-checking directory");
                    handle_dir_added(&*store, &*observer, &roots, root_index, &path);
                }
            }
            EngineEvent::DirRemoved { root_index, path } => {
                debug!(path = %path.display(), "directory removed");
                handle_folder_gone(&*store, &*observer, &roots, root_index, &path);
            }
            EngineEvent::NfoAdded { root_index, folder } => {
                // Latest notification wins within the window.
                let key = (root_index, folder.clone());
                let debounce_tx = tx.clone();
                let debounce_cancel = cancel.clone();
                let window = config.debounce_window;
                let timer = tokio::spawn(async move {
                    tokio::select! {
                        _ = debounce_cancel.cancelled() => {}
                        _ = tokio::time::sleep(window) => {
                            let _ = debounce_tx.send(EngineEvent::DebouncedFolder {
                                root_index,
                                folder,
                            });
                        }
                    }
                });
                if let Some(previous) = debounce.insert(key, timer) {
                    previous.abort();
                }
            }
            EngineEvent::DebouncedFolder { root_index, folder } => {
                debounce.remove(&(root_index, folder.clone()));
                debug!(folder = %folder.display(), "descriptor added");
                apply_and_notify(&*store, &*observer, &roots, root_index, &folder);
            }
            EngineEvent::NfoChanged { root_index, path } => {
                let Some(folder) = path.parent().map(Path::to_path_buf) else {
                    continue;
                };
                // Part of a pending add burst for this folder: the debounced
                // call will pick the content up, applying here would double
                // process.
                if debounce.contains_key(&(root_index, folder.clone())) {
                    continue;
                }
                debug!(path = %path.display(), "descriptor changed");
                apply_and_notify(&*store, &*observer, &roots, root_index, &folder);
            }
            EngineEvent::NfoRemoved { root_index, path } => {
                debug!(path = %path.display(), "descriptor removed");
                if let Some(folder) = path.parent() {
                    handle_folder_gone(&*store, &*observer, &roots, root_index, folder);
                }
            }
        }
    }

    for (_, timer) in debounce {
        timer.abort();
    }
}

/// New directory: a leaf item is applied directly; a container has each of
/// its immediate child directories leaf-checked, which covers a whole
/// folder of items moved in at once.
fn handle_dir_added(
    store: &dyn CatalogStore,
    observer: &dyn SyncObserver,
    roots: &[PathBuf],
    root_index: usize,
    path: &Path,
) {
    if library::is_item_folder(path) {
        apply_and_notify(store, observer, roots, root_index, path);
        return;
    }

    let entries = match std::fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot enumerate new directory");
            return;
        }
    };
    let mut found_any = false;
    for entry in entries.flatten() {
        let child = entry.path();
        if child.is_dir() && library::is_item_folder(&child) {
            found_any = true;
            apply_and_notify(store, observer, roots, root_index, &child);
        }
    }
    if found_any {
        observer.change(ChangeEvent::ActorAdded {
            path: path.to_path_buf(),
        });
    }
}

/// Shared add/update path for the watch engine, with the change event
/// chosen by what the store actually did.
fn apply_and_notify(
    store: &dyn CatalogStore,
    observer: &dyn SyncObserver,
    roots: &[PathBuf],
    root_index: usize,
    folder: &Path,
) {
    let Some(root) = roots.get(root_index) else {
        return;
    };
    match apply_item_folder(store, root, root_index, folder) {
        Ok(outcome) => {
            let event = if outcome.was_created {
                ChangeEvent::MovieAdded {
                    path: folder.to_path_buf(),
                }
            } else {
                ChangeEvent::MovieUpdated {
                    path: folder.to_path_buf(),
                }
            };
            observer.change(event);
        }
        Err(e) => {
            warn!(folder = %folder.display(), error = %e, "failed to apply item folder");
        }
    }
}

/// A folder (or its descriptor) disappeared: drop matching rows. The stored
/// path is matched in both separator forms by the store.
fn handle_folder_gone(
    store: &dyn CatalogStore,
    observer: &dyn SyncObserver,
    roots: &[PathBuf],
    root_index: usize,
    path: &Path,
) {
    let Some(root) = roots.get(root_index) else {
        return;
    };
    let Ok(relative) = path.strip_prefix(root) else {
        return;
    };
    let key = FolderKey::new(root_index, &relative.to_string_lossy());
    match store.delete_by_folder_key(&key) {
        Ok(removed) => {
            if removed > 0 {
                debug!(key = %key, removed, "items removed from catalog");
            }
            observer.change(ChangeEvent::FolderDeleted {
                path: path.to_path_buf(),
            });
        }
        Err(e) => {
            warn!(key = %key, error = %e, "failed to delete items for folder");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify_at(root: &str, kind: EventKind, path: &str) -> Option<EngineEvent> {
        classify(Path::new(root), 0, &kind, PathBuf::from(path), MAX_WATCH_DEPTH)
    }

    #[test]
    fn test_hard_extension_filter() {
        // Recognized non-descriptor extensions are dropped outright.
        for name in ["cover.jpg", "clip.mp4", "notes.txt", "dump.log"] {
            let event = classify_at(
                "/data",
                EventKind::Create(CreateKind::File),
                &format!("/data/StudioA/ABC-001/{}", name),
            );
            assert!(event.is_none(), "{} should be ignored", name);
        }
    }

    #[test]
    fn test_nfo_create_maps_to_folder_add() {
        let event = classify_at(
            "/data",
            EventKind::Create(CreateKind::File),
            "/data/StudioA/ABC-001/movie.nfo",
        );
        match event {
            Some(EngineEvent::NfoAdded { folder, .. }) => {
                assert_eq!(folder, PathBuf::from("/data/StudioA/ABC-001"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_hidden_paths_filtered() {
        let event = classify_at(
            "/data",
            EventKind::Create(CreateKind::File),
            "/data/.trash/ABC-001/movie.nfo",
        );
        assert!(event.is_none());
    }

    #[test]
    fn test_depth_bound() {
        let event = classify_at(
            "/data",
            EventKind::Create(CreateKind::File),
            "/data/a/b/c/d/movie.nfo",
        );
        assert!(event.is_none());
    }

    #[test]
    fn test_events_outside_root_filtered() {
        let event = classify_at(
            "/data",
            EventKind::Create(CreateKind::Folder),
            "/elsewhere/ABC-001",
        );
        assert!(event.is_none());
    }

    #[test]
    fn test_remove_folder_maps_to_dir_removed() {
        let event = classify_at(
            "/data",
            EventKind::Remove(RemoveKind::Folder),
            "/data/StudioA/ABC-001",
        );
        assert!(matches!(event, Some(EngineEvent::DirRemoved { .. })));
    }

    #[test]
    fn test_remove_non_nfo_file_ignored() {
        let event = classify_at(
            "/data",
            EventKind::Remove(RemoveKind::File),
            "/data/StudioA/ABC-001/cover.jpg",
        );
        assert!(event.is_none());
    }

    #[test]
    fn test_nfo_modify_maps_to_changed_only_for_existing_file() {
        // Path does not exist, so a data-modify event for it is dropped.
        let event = classify_at(
            "/data",
            EventKind::Modify(ModifyKind::Data(notify::event::DataChange::Content)),
            "/data/StudioA/ABC-001/movie.nfo",
        );
        assert!(event.is_none());
    }
}
