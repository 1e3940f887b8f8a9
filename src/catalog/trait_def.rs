//! CatalogStore trait definition.
//!
//! The narrow seam between the sync engines and persistence. Both the
//! startup reconciliation and the live watch engine mutate the catalog
//! exclusively through this trait, so tests can substitute an
//! implementation and the engines never see connection details.

use anyhow::Result;

use super::models::{FolderKey, Movie, MovieRecord, UpsertOutcome};

pub trait CatalogStore: Send + Sync {
    /// Make the row for `record.code` reflect the record, creating it if the
    /// code is unseen. Association entities are resolved find-or-create and
    /// the movie's links are fully replaced, all in one transaction.
    fn create_or_update(&self, record: &MovieRecord) -> Result<UpsertOutcome>;

    /// Delete every movie stored under the folder key. The stored path is
    /// matched in both forward-slash and backslash form. Returns the number
    /// of movies removed; zero is not an error.
    fn delete_by_folder_key(&self, key: &FolderKey) -> Result<usize>;

    fn find_movie_by_code(&self, code: &str) -> Result<Option<Movie>>;

    fn find_movies_by_folder_key(&self, key: &FolderKey) -> Result<Vec<Movie>>;

    /// Folder keys of every stored movie, normalized to forward slashes.
    /// Rows without a folder path are skipped.
    fn list_folder_keys(&self) -> Result<Vec<FolderKey>>;

    /// Genre names linked to a movie, sorted.
    fn movie_genres(&self, movie_id: i64) -> Result<Vec<String>>;

    /// Actor names linked to a movie, sorted.
    fn movie_actors(&self, movie_id: i64) -> Result<Vec<String>>;

    fn movie_count(&self) -> Result<usize>;
}
