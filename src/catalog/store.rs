//! SQLite-backed catalog store implementation.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

use super::models::{normalize_separators, FolderKey, Movie, MovieRecord, UpsertOutcome};
use super::schema::CATALOG_VERSIONED_SCHEMAS;
use super::trait_def::CatalogStore;
use crate::nfo::is_empty_field;
use crate::sqlite_persistence::migrate_if_needed;

/// Bounded wait on a locked database; past this the statement fails rather
/// than stalling a reconciliation batch or a reader indefinitely.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

const PRAGMA_ATTEMPTS: usize = 3;

/// SQLite-backed movie catalog.
#[derive(Clone)]
pub struct SqliteCatalogStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCatalogStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let mut conn = Connection::open_with_flags(
            db_path.as_ref(),
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI
                | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open catalog database")?;

        conn.busy_timeout(BUSY_TIMEOUT)?;
        migrate_if_needed(&mut conn, CATALOG_VERSIONED_SCHEMAS)?;

        pragma_with_retry(&conn, "journal_mode", "WAL")?;
        pragma_with_retry(&conn, "foreign_keys", "ON")?;

        let movie_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM movies", [], |r| r.get(0))
            .unwrap_or(0);
        info!("Opened movie catalog: {} movies", movie_count);

        Ok(SqliteCatalogStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

/// Config/pragma statements are retried a bounded number of times; a busy
/// sibling connection is the usual transient cause.
fn pragma_with_retry(conn: &Connection, name: &str, value: &str) -> Result<()> {
    let mut last_err = None;
    for attempt in 1..=PRAGMA_ATTEMPTS {
        match conn.pragma_update(None, name, value) {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!(
                    "PRAGMA {} = {} failed (attempt {}/{}): {}",
                    name, value, attempt, PRAGMA_ATTEMPTS, e
                );
                last_err = Some(e);
            }
        }
    }
    Err(last_err.expect("at least one pragma attempt ran").into())
}

/// Resolve a named entity (director, studio, genre, actor) to its row id,
/// creating it when unseen. Names are deduplicated by the UNIQUE constraint.
fn find_or_create_named(tx: &Transaction<'_>, table: &str, name: &str) -> Result<i64> {
    tx.execute(
        &format!("INSERT OR IGNORE INTO {} (name) VALUES (?1)", table),
        params![name],
    )?;
    let id = tx.query_row(
        &format!("SELECT id FROM {} WHERE name = ?1", table),
        params![name],
        |r| r.get(0),
    )?;
    Ok(id)
}

/// A director/studio value that actually names someone: present, non-blank,
/// and not the explicit-empty sentinel.
fn meaningful(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !is_empty_field(v))
}

fn movie_from_row(row: &Row<'_>) -> rusqlite::Result<Movie> {
    Ok(Movie {
        id: row.get(0)?,
        title: row.get(1)?,
        code: row.get(2)?,
        runtime: row.get(3)?,
        premiered: row.get(4)?,
        director_id: row.get(5)?,
        studio_id: row.get(6)?,
        poster_path: row.get(7)?,
        fanart_path: row.get(8)?,
        nfo_path: row.get(9)?,
        folder_path: row.get(10)?,
        playable: row.get(11)?,
        video_path: row.get(12)?,
        root_index: row.get::<_, i64>(13)? as usize,
        folder_updated_at: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

const MOVIE_COLUMNS: &str = "id, title, code, runtime, premiered, director_id, studio_id, \
     poster_path, fanart_path, nfo_path, folder_path, playable, video_path, \
     root_index, folder_updated_at, created_at, updated_at";

impl CatalogStore for SqliteCatalogStore {
    fn create_or_update(&self, record: &MovieRecord) -> Result<UpsertOutcome> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let director_id = match meaningful(&record.director) {
            Some(name) => Some(find_or_create_named(&tx, "directors", name)?),
            None => None,
        };
        let studio_id = match meaningful(&record.studio) {
            Some(name) => Some(find_or_create_named(&tx, "studios", name)?),
            None => None,
        };

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM movies WHERE code = ?1",
                params![record.code],
                |r| r.get(0),
            )
            .optional()?;

        let (movie_id, was_created) = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE movies SET title = ?1, runtime = ?2, premiered = ?3, \
                     director_id = ?4, studio_id = ?5, poster_path = ?6, fanart_path = ?7, \
                     nfo_path = ?8, folder_path = ?9, playable = ?10, video_path = ?11, \
                     root_index = ?12, folder_updated_at = ?13, \
                     updated_at = cast(strftime('%s','now') as int) \
                     WHERE id = ?14",
                    params![
                        record.title,
                        record.runtime,
                        record.premiered,
                        director_id,
                        studio_id,
                        record.poster_path,
                        record.fanart_path,
                        record.nfo_path,
                        record.folder_path,
                        record.playable,
                        record.video_path,
                        record.root_index as i64,
                        record.folder_updated_at,
                        id,
                    ],
                )?;
                (id, false)
            }
            None => {
                tx.execute(
                    "INSERT INTO movies (title, code, runtime, premiered, director_id, \
                     studio_id, poster_path, fanart_path, nfo_path, folder_path, playable, \
                     video_path, root_index, folder_updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                    params![
                        record.title,
                        record.code,
                        record.runtime,
                        record.premiered,
                        director_id,
                        studio_id,
                        record.poster_path,
                        record.fanart_path,
                        record.nfo_path,
                        record.folder_path,
                        record.playable,
                        record.video_path,
                        record.root_index as i64,
                        record.folder_updated_at,
                    ],
                )?;
                (tx.last_insert_rowid(), true)
            }
        };

        // Links always mirror the descriptor: clear, then re-add.
        tx.execute(
            "DELETE FROM movie_genres WHERE movie_id = ?1",
            params![movie_id],
        )?;
        tx.execute(
            "DELETE FROM movie_actors WHERE movie_id = ?1",
            params![movie_id],
        )?;

        for genre in &record.genres {
            let genre = genre.trim();
            if genre.is_empty() {
                continue;
            }
            let genre_id = find_or_create_named(&tx, "genres", genre)?;
            tx.execute(
                "INSERT OR IGNORE INTO movie_genres (movie_id, genre_id) VALUES (?1, ?2)",
                params![movie_id, genre_id],
            )?;
        }
        for actor in &record.actors {
            let actor = actor.trim();
            if actor.is_empty() {
                continue;
            }
            let actor_id = find_or_create_named(&tx, "actors", actor)?;
            tx.execute(
                "INSERT OR IGNORE INTO movie_actors (movie_id, actor_id) VALUES (?1, ?2)",
                params![movie_id, actor_id],
            )?;
        }

        tx.commit()?;
        Ok(UpsertOutcome {
            movie_id,
            was_created,
        })
    }

    fn delete_by_folder_key(&self, key: &FolderKey) -> Result<usize> {
        let forward = normalize_separators(&key.folder_path);
        let backward = forward.replace('/', "\\");

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let ids: Vec<i64> = {
            let mut stmt = tx.prepare(
                "SELECT id FROM movies WHERE root_index = ?1 AND folder_path IN (?2, ?3)",
            )?;
            let ids = stmt
                .query_map(
                    params![key.root_index as i64, forward, backward],
                    |r| r.get(0),
                )?
                .collect::<std::result::Result<Vec<i64>, _>>()?;
            ids
        };

        for movie_id in &ids {
            tx.execute(
                "DELETE FROM movie_genres WHERE movie_id = ?1",
                params![movie_id],
            )?;
            tx.execute(
                "DELETE FROM movie_actors WHERE movie_id = ?1",
                params![movie_id],
            )?;
            tx.execute("DELETE FROM movies WHERE id = ?1", params![movie_id])?;
        }

        tx.commit()?;
        Ok(ids.len())
    }

    fn find_movie_by_code(&self, code: &str) -> Result<Option<Movie>> {
        let conn = self.conn.lock().unwrap();
        let movie = conn
            .query_row(
                &format!("SELECT {} FROM movies WHERE code = ?1", MOVIE_COLUMNS),
                params![code],
                movie_from_row,
            )
            .optional()?;
        Ok(movie)
    }

    fn find_movies_by_folder_key(&self, key: &FolderKey) -> Result<Vec<Movie>> {
        let forward = normalize_separators(&key.folder_path);
        let backward = forward.replace('/', "\\");

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM movies WHERE root_index = ?1 AND folder_path IN (?2, ?3)",
            MOVIE_COLUMNS
        ))?;
        let movies = stmt
            .query_map(
                params![key.root_index as i64, forward, backward],
                movie_from_row,
            )?
            .collect::<std::result::Result<Vec<Movie>, _>>()?;
        Ok(movies)
    }

    fn list_folder_keys(&self) -> Result<Vec<FolderKey>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT root_index, folder_path FROM movies WHERE folder_path IS NOT NULL",
        )?;
        let keys = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<(i64, String)>, _>>()?
            .into_iter()
            .map(|(root_index, path)| FolderKey::new(root_index as usize, &path))
            .collect();
        Ok(keys)
    }

    fn movie_genres(&self, movie_id: i64) -> Result<Vec<String>> {
        self.linked_names(movie_id, "genres", "movie_genres", "genre_id")
    }

    fn movie_actors(&self, movie_id: i64) -> Result<Vec<String>> {
        self.linked_names(movie_id, "actors", "movie_actors", "actor_id")
    }

    fn movie_count(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM movies", [], |r| r.get(0))?;
        Ok(count as usize)
    }
}

impl SqliteCatalogStore {
    fn linked_names(
        &self,
        movie_id: i64,
        entity_table: &str,
        join_table: &str,
        join_column: &str,
    ) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT e.name FROM {entity} e \
             JOIN {join} j ON j.{column} = e.id \
             WHERE j.movie_id = ?1 ORDER BY e.name",
            entity = entity_table,
            join = join_table,
            column = join_column,
        ))?;
        let names = stmt
            .query_map(params![movie_id], |r| r.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (tempfile::TempDir, SqliteCatalogStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteCatalogStore::new(dir.path().join("catalog.db")).unwrap();
        (dir, store)
    }

    fn sample_record(code: &str, folder: &str) -> MovieRecord {
        MovieRecord {
            title: format!("Title {}", code),
            code: code.to_string(),
            runtime: Some(100),
            premiered: Some("2022-02-02".to_string()),
            director: Some("Dir One".to_string()),
            studio: Some("Studio One".to_string()),
            actors: vec!["Actor A".to_string(), "Actor B".to_string()],
            genres: vec!["Drama".to_string()],
            poster_path: Some(format!("{}/folderps.jpg", folder)),
            fanart_path: None,
            nfo_path: format!("{}/movie.nfo", folder),
            folder_path: folder.to_string(),
            playable: false,
            video_path: None,
            root_index: 0,
            folder_updated_at: Some(1_700_000_000),
        }
    }

    #[test]
    fn test_create_then_update_by_code() {
        let (_dir, store) = test_store();

        let outcome = store.create_or_update(&sample_record("AAA-1", "X/AAA-1")).unwrap();
        assert!(outcome.was_created);

        let mut moved = sample_record("AAA-1", "Y/AAA-1");
        moved.playable = true;
        let outcome2 = store.create_or_update(&moved).unwrap();
        assert!(!outcome2.was_created);
        assert_eq!(outcome.movie_id, outcome2.movie_id);
        assert_eq!(store.movie_count().unwrap(), 1);

        let movie = store.find_movie_by_code("AAA-1").unwrap().unwrap();
        assert_eq!(movie.folder_path.as_deref(), Some("Y/AAA-1"));
        assert!(movie.playable);
    }

    #[test]
    fn test_association_links_are_replaced_not_accumulated() {
        let (_dir, store) = test_store();

        let record = sample_record("AAA-1", "X/AAA-1");
        let outcome = store.create_or_update(&record).unwrap();
        assert_eq!(
            store.movie_actors(outcome.movie_id).unwrap(),
            vec!["Actor A", "Actor B"]
        );

        let mut updated = record.clone();
        updated.actors = vec!["Actor C".to_string()];
        updated.genres = vec!["Action".to_string(), "Drama".to_string()];
        store.create_or_update(&updated).unwrap();

        assert_eq!(store.movie_actors(outcome.movie_id).unwrap(), vec!["Actor C"]);
        assert_eq!(
            store.movie_genres(outcome.movie_id).unwrap(),
            vec!["Action", "Drama"]
        );
    }

    #[test]
    fn test_entities_deduplicated_by_name_and_never_pruned() {
        let (_dir, store) = test_store();

        store.create_or_update(&sample_record("AAA-1", "X/AAA-1")).unwrap();
        store.create_or_update(&sample_record("BBB-2", "X/BBB-2")).unwrap();

        // Two movies share the same director/actor names; one row each.
        let conn = store.conn.lock().unwrap();
        let directors: i64 = conn
            .query_row("SELECT COUNT(*) FROM directors", [], |r| r.get(0))
            .unwrap();
        let actors: i64 = conn
            .query_row("SELECT COUNT(*) FROM actors", [], |r| r.get(0))
            .unwrap();
        drop(conn);
        assert_eq!(directors, 1);
        assert_eq!(actors, 2);

        // Deleting the last referencing movie leaves the entities behind.
        store
            .delete_by_folder_key(&FolderKey::new(0, "X/AAA-1"))
            .unwrap();
        store
            .delete_by_folder_key(&FolderKey::new(0, "X/BBB-2"))
            .unwrap();
        let conn = store.conn.lock().unwrap();
        let actors_after: i64 = conn
            .query_row("SELECT COUNT(*) FROM actors", [], |r| r.get(0))
            .unwrap();
        drop(conn);
        assert_eq!(actors_after, 2);
    }

    #[test]
    fn test_sentinel_director_creates_no_entity() {
        let (_dir, store) = test_store();

        let mut record = sample_record("AAA-1", "X/AAA-1");
        record.director = Some("----".to_string());
        record.studio = None;
        store.create_or_update(&record).unwrap();

        let movie = store.find_movie_by_code("AAA-1").unwrap().unwrap();
        assert_eq!(movie.director_id, None);
        assert_eq!(movie.studio_id, None);
    }

    #[test]
    fn test_delete_matches_both_separator_forms() {
        let (_dir, store) = test_store();

        // Simulate historical data stored with backslashes.
        store.create_or_update(&sample_record("AAA-1", "X/AAA-1")).unwrap();
        {
            let conn = store.conn.lock().unwrap();
            conn.execute(
                "UPDATE movies SET folder_path = 'X\\AAA-1' WHERE code = 'AAA-1'",
                [],
            )
            .unwrap();
        }

        let removed = store
            .delete_by_folder_key(&FolderKey::new(0, "X/AAA-1"))
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.movie_count().unwrap(), 0);
    }

    #[test]
    fn test_delete_respects_root_index() {
        let (_dir, store) = test_store();

        let mut record = sample_record("AAA-1", "X/AAA-1");
        record.root_index = 1;
        store.create_or_update(&record).unwrap();

        assert_eq!(
            store.delete_by_folder_key(&FolderKey::new(0, "X/AAA-1")).unwrap(),
            0
        );
        assert_eq!(
            store.delete_by_folder_key(&FolderKey::new(1, "X/AAA-1")).unwrap(),
            1
        );
    }

    #[test]
    fn test_list_folder_keys_normalizes() {
        let (_dir, store) = test_store();
        store.create_or_update(&sample_record("AAA-1", "X/AAA-1")).unwrap();
        {
            let conn = store.conn.lock().unwrap();
            conn.execute(
                "UPDATE movies SET folder_path = 'X\\AAA-1' WHERE code = 'AAA-1'",
                [],
            )
            .unwrap();
        }

        let keys = store.list_folder_keys().unwrap();
        assert_eq!(keys, vec![FolderKey::new(0, "X/AAA-1")]);
    }

    #[test]
    fn test_upsert_is_idempotent_under_retry() {
        let (_dir, store) = test_store();
        let record = sample_record("AAA-1", "X/AAA-1");
        store.create_or_update(&record).unwrap();
        let outcome = store.create_or_update(&record).unwrap();
        assert!(!outcome.was_created);
        assert_eq!(store.movie_count().unwrap(), 1);
        assert_eq!(store.movie_actors(outcome.movie_id).unwrap().len(), 2);
    }
}
