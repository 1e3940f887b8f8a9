//! NFO descriptor parsing and writing.
//!
//! Every item folder carries a sidecar `.nfo` file (loosely XML) describing
//! the movie. Files in the wild come in legacy encodings and with a handful
//! of recurring corruptions, so reading is a three-stage affair: detect and
//! decode the bytes, repair the markup, then parse.

mod encoding;
mod parser;
mod repair;
mod writer;

pub use parser::{parse_movie_nfo, read_movie_nfo};
pub use writer::{update_movie_nfo, write_movie_nfo};

use thiserror::Error;

/// The descriptor file extension, lower-case, without the dot.
pub const NFO_EXTENSION: &str = "nfo";

/// Sentinel meaning "explicitly empty" in director/studio fields, as opposed
/// to the tag being absent.
pub const EMPTY_FIELD: &str = "----";

/// Errors produced while reading or writing a descriptor. Callers are
/// expected to record these and move on; a bad descriptor never aborts a
/// scan.
#[derive(Debug, Error)]
pub enum NfoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed descriptor: {0}")]
    Malformed(String),

    #[error("descriptor has no natural code")]
    MissingCode,
}

/// Normalized record extracted from a descriptor file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovieNfo {
    pub title: String,
    pub code: String,
    pub runtime: Option<u32>,
    pub premiered: Option<String>,
    pub director: Option<String>,
    pub studio: Option<String>,
    pub actors: Vec<String>,
    pub genres: Vec<String>,
}

/// Sparse set of field changes for the partial-update path. `None` means
/// "leave the field alone"; the inner `Option` (where present) distinguishes
/// "set" from "clear".
#[derive(Debug, Clone, Default)]
pub struct NfoPatch {
    pub title: Option<String>,
    pub code: Option<String>,
    pub runtime: Option<Option<u32>>,
    pub premiered: Option<Option<String>>,
    pub director: Option<Option<String>>,
    pub studio: Option<Option<String>>,
    pub actors: Option<Vec<String>>,
    pub genres: Option<Vec<String>>,
}

/// True when a director/studio value carries no information: missing,
/// whitespace, or the `----` sentinel.
pub fn is_empty_field(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed == EMPTY_FIELD
}
