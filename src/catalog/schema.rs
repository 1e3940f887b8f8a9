//! Catalog table declarations.
//!
//! Version history starts at 0; future migrations append a new
//! `VersionedSchema` with a migration function and bump the tail.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    ForeignKey, OnDelete, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP,
};

const DIRECTOR_FK: ForeignKey = ForeignKey {
    foreign_table: "directors",
    foreign_column: "id",
    on_delete: OnDelete::NoAction,
};

const STUDIO_FK: ForeignKey = ForeignKey {
    foreign_table: "studios",
    foreign_column: "id",
    on_delete: OnDelete::NoAction,
};

const MOVIE_FK: ForeignKey = ForeignKey {
    foreign_table: "movies",
    foreign_column: "id",
    on_delete: OnDelete::Cascade,
};

const GENRE_FK: ForeignKey = ForeignKey {
    foreign_table: "genres",
    foreign_column: "id",
    on_delete: OnDelete::Cascade,
};

const ACTOR_FK: ForeignKey = ForeignKey {
    foreign_table: "actors",
    foreign_column: "id",
    on_delete: OnDelete::Cascade,
};

const MOVIES: Table = Table {
    name: "movies",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("code", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("runtime", &SqlType::Integer),
        sqlite_column!("premiered", &SqlType::Text),
        sqlite_column!("director_id", &SqlType::Integer, foreign_key = Some(&DIRECTOR_FK)),
        sqlite_column!("studio_id", &SqlType::Integer, foreign_key = Some(&STUDIO_FK)),
        sqlite_column!("poster_path", &SqlType::Text),
        sqlite_column!("fanart_path", &SqlType::Text),
        sqlite_column!("nfo_path", &SqlType::Text),
        sqlite_column!("folder_path", &SqlType::Text),
        sqlite_column!("playable", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("video_path", &SqlType::Text),
        sqlite_column!("root_index", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("folder_updated_at", &SqlType::Integer),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!(
            "updated_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[
        ("idx_movies_title", "title"),
        ("idx_movies_premiered", "premiered"),
        ("idx_movies_playable", "playable"),
        ("idx_movies_root_index", "root_index"),
        ("idx_movies_folder_path", "folder_path"),
        ("idx_movies_folder_updated_at", "folder_updated_at"),
    ],
    unique_constraints: &[],
};

const DIRECTORS: Table = Table {
    name: "directors",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true, is_unique = true),
    ],
    indices: &[],
    unique_constraints: &[],
};

const STUDIOS: Table = Table {
    name: "studios",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true, is_unique = true),
    ],
    indices: &[],
    unique_constraints: &[],
};

const GENRES: Table = Table {
    name: "genres",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true, is_unique = true),
    ],
    indices: &[],
    unique_constraints: &[],
};

const ACTORS: Table = Table {
    name: "actors",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true, is_unique = true),
    ],
    indices: &[],
    unique_constraints: &[],
};

const MOVIE_GENRES: Table = Table {
    name: "movie_genres",
    columns: &[
        sqlite_column!("movie_id", &SqlType::Integer, non_null = true, foreign_key = Some(&MOVIE_FK)),
        sqlite_column!("genre_id", &SqlType::Integer, non_null = true, foreign_key = Some(&GENRE_FK)),
    ],
    indices: &[("idx_movie_genres_genre", "genre_id")],
    unique_constraints: &[&["movie_id", "genre_id"]],
};

const MOVIE_ACTORS: Table = Table {
    name: "movie_actors",
    columns: &[
        sqlite_column!("movie_id", &SqlType::Integer, non_null = true, foreign_key = Some(&MOVIE_FK)),
        sqlite_column!("actor_id", &SqlType::Integer, non_null = true, foreign_key = Some(&ACTOR_FK)),
    ],
    indices: &[("idx_movie_actors_actor", "actor_id")],
    unique_constraints: &[&["movie_id", "actor_id"]],
};

pub const CATALOG_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[
        DIRECTORS,
        STUDIOS,
        GENRES,
        ACTORS,
        MOVIES,
        MOVIE_GENRES,
        MOVIE_ACTORS,
    ],
    migration: None,
}];

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_creates_and_validates() {
        let conn = Connection::open_in_memory().unwrap();
        let latest = CATALOG_VERSIONED_SCHEMAS.last().unwrap();
        latest.create(&conn).unwrap();
        latest.validate(&conn).unwrap();
    }
}
