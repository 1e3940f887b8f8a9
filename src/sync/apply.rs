//! The single "make the store reflect this folder" routine.
//!
//! Reconciliation adds, live directory/descriptor adds, and live descriptor
//! changes all funnel through [`apply_item_folder`], so create-vs-update
//! decisions and association replacement behave identically no matter how a
//! folder was discovered.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::catalog::models::normalize_separators;
use crate::catalog::{CatalogStore, MovieRecord};
use crate::library;
use crate::nfo::{read_movie_nfo, NfoError};

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("no descriptor file in {0}")]
    NoDescriptor(PathBuf),

    #[error("descriptor parse failed: {0}")]
    Parse(#[source] NfoError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[source] anyhow::Error),
}

/// What a successful apply did.
#[derive(Debug)]
pub struct ApplyOutcome {
    pub record: MovieRecord,
    pub movie_id: i64,
    pub was_created: bool,
}

/// Parse the folder's first descriptor, gather companion assets, and upsert
/// the result keyed by natural code.
///
/// `folder` must live under `root`; stored paths come out root-relative in
/// forward-slash form.
pub fn apply_item_folder(
    store: &dyn CatalogStore,
    root: &Path,
    root_index: usize,
    folder: &Path,
) -> Result<ApplyOutcome, ApplyError> {
    let nfo_files = library::nfo_files_in(folder)?;
    let nfo_path = nfo_files
        .first()
        .ok_or_else(|| ApplyError::NoDescriptor(folder.to_path_buf()))?;

    let nfo = read_movie_nfo(nfo_path).map_err(|e| match e {
        NfoError::Io(io) => ApplyError::Io(io),
        other => ApplyError::Parse(other),
    })?;

    let artwork = library::find_artwork(folder);
    let video = library::find_video(folder);
    let folder_updated_at = folder_mtime(folder);

    let record = MovieRecord {
        title: nfo.title,
        code: nfo.code,
        runtime: nfo.runtime,
        premiered: nfo.premiered,
        director: nfo.director,
        studio: nfo.studio,
        actors: nfo.actors,
        genres: nfo.genres,
        poster_path: artwork.poster.as_deref().map(|p| relative_to(root, p)),
        fanart_path: artwork.fanart.as_deref().map(|p| relative_to(root, p)),
        nfo_path: relative_to(root, nfo_path),
        folder_path: relative_to(root, folder),
        playable: video.is_some(),
        video_path: video.as_deref().map(|p| relative_to(root, p)),
        root_index,
        folder_updated_at,
    };

    let outcome = store.create_or_update(&record).map_err(ApplyError::Store)?;
    Ok(ApplyOutcome {
        record,
        movie_id: outcome.movie_id,
        was_created: outcome.was_created,
    })
}

/// Root-relative path in canonical forward-slash form.
fn relative_to(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    normalize_separators(&relative.to_string_lossy())
}

fn folder_mtime(folder: &Path) -> Option<i64> {
    let modified = std::fs::metadata(folder).and_then(|m| m.modified()).ok()?;
    Some(DateTime::<Utc>::from(modified).timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SqliteCatalogStore;
    use crate::nfo::{write_movie_nfo, MovieNfo};

    fn make_item(root: &Path, folder: &str, code: &str) -> PathBuf {
        let folder_path = root.join(folder);
        std::fs::create_dir_all(&folder_path).unwrap();
        let nfo = MovieNfo {
            title: format!("Title {}", code),
            code: code.to_string(),
            actors: vec!["Someone".to_string()],
            genres: vec!["Drama".to_string()],
            ..Default::default()
        };
        write_movie_nfo(&folder_path.join("movie.nfo"), &nfo).unwrap();
        folder_path
    }

    #[test]
    fn test_apply_creates_record_with_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let folder = make_item(root, "StudioA/CODE-001", "CODE-001");
        std::fs::write(folder.join("coverps.jpg"), b"img").unwrap();
        std::fs::write(folder.join("movie.mp4"), b"vid").unwrap();

        let store = SqliteCatalogStore::new(root.join("catalog.db")).unwrap();
        let outcome = apply_item_folder(&store, root, 0, &folder).unwrap();

        assert!(outcome.was_created);
        assert_eq!(outcome.record.folder_path, "StudioA/CODE-001");
        assert_eq!(outcome.record.nfo_path, "StudioA/CODE-001/movie.nfo");
        assert_eq!(
            outcome.record.poster_path.as_deref(),
            Some("StudioA/CODE-001/coverps.jpg")
        );
        assert!(outcome.record.playable);
        assert!(outcome.record.folder_updated_at.is_some());
    }

    #[test]
    fn test_apply_updates_existing_code() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let store = SqliteCatalogStore::new(root.join("catalog.db")).unwrap();

        let first = make_item(root, "X/CODE-001", "CODE-001");
        apply_item_folder(&store, root, 0, &first).unwrap();

        let second = make_item(root, "Y/CODE-001", "CODE-001");
        let outcome = apply_item_folder(&store, root, 0, &second).unwrap();
        assert!(!outcome.was_created);

        let movie = store.find_movie_by_code("CODE-001").unwrap().unwrap();
        assert_eq!(movie.folder_path.as_deref(), Some("Y/CODE-001"));
    }

    #[test]
    fn test_apply_without_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let folder = root.join("empty");
        std::fs::create_dir_all(&folder).unwrap();

        let store = SqliteCatalogStore::new(root.join("catalog.db")).unwrap();
        let err = apply_item_folder(&store, root, 0, &folder).unwrap_err();
        assert!(matches!(err, ApplyError::NoDescriptor(_)));
    }

    #[test]
    fn test_apply_with_malformed_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let folder = root.join("bad");
        std::fs::create_dir_all(&folder).unwrap();
        std::fs::write(folder.join("movie.nfo"), "<movie><title>broken").unwrap();

        let store = SqliteCatalogStore::new(root.join("catalog.db")).unwrap();
        let err = apply_item_folder(&store, root, 0, &folder).unwrap_err();
        assert!(matches!(err, ApplyError::Parse(_)));
    }
}
