//! The movie catalog: persistent store of every item discovered on disk.

pub mod models;
mod schema;
mod store;
mod trait_def;

pub use models::{FolderKey, Movie, MovieRecord, UpsertOutcome};
pub use schema::CATALOG_VERSIONED_SCHEMAS;
pub use store::SqliteCatalogStore;
pub use trait_def::CatalogStore;
