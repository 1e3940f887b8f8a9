//! Catalog data types.

/// Normalize path separators to forward slashes, the canonical stored form.
pub fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

/// Identifies an item folder independently of platform separators: the
/// configured data-root index plus the root-relative folder path in
/// forward-slash form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FolderKey {
    pub root_index: usize,
    pub folder_path: String,
}

impl FolderKey {
    pub fn new(root_index: usize, folder_path: &str) -> Self {
        Self {
            root_index,
            folder_path: normalize_separators(folder_path),
        }
    }
}

impl std::fmt::Display for FolderKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.root_index, self.folder_path)
    }
}

/// Everything the store needs to make a movie row reflect disk state.
///
/// All paths are relative to the data root at `root_index`, forward-slash
/// separated. Associations carry names only; the store resolves them to
/// rows with find-or-create semantics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovieRecord {
    pub title: String,
    pub code: String,
    pub runtime: Option<u32>,
    pub premiered: Option<String>,
    pub director: Option<String>,
    pub studio: Option<String>,
    pub actors: Vec<String>,
    pub genres: Vec<String>,
    pub poster_path: Option<String>,
    pub fanart_path: Option<String>,
    pub nfo_path: String,
    pub folder_path: String,
    pub playable: bool,
    pub video_path: Option<String>,
    pub root_index: usize,
    pub folder_updated_at: Option<i64>,
}

/// A stored movie row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Movie {
    pub id: i64,
    pub title: String,
    pub code: String,
    pub runtime: Option<u32>,
    pub premiered: Option<String>,
    pub director_id: Option<i64>,
    pub studio_id: Option<i64>,
    pub poster_path: Option<String>,
    pub fanart_path: Option<String>,
    pub nfo_path: Option<String>,
    pub folder_path: Option<String>,
    pub playable: bool,
    pub video_path: Option<String>,
    pub root_index: usize,
    pub folder_updated_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Movie {
    /// The stored folder key, separators normalized for comparison.
    pub fn folder_key(&self) -> Option<FolderKey> {
        self.folder_path
            .as_deref()
            .map(|path| FolderKey::new(self.root_index, path))
    }
}

/// Result of a create-or-update call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub movie_id: i64,
    pub was_created: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_key_normalizes_backslashes() {
        let key = FolderKey::new(0, "StudioA\\ABC-001");
        assert_eq!(key.folder_path, "StudioA/ABC-001");
        assert_eq!(key, FolderKey::new(0, "StudioA/ABC-001"));
    }

    #[test]
    fn test_folder_keys_differ_across_roots() {
        assert_ne!(FolderKey::new(0, "A/B"), FolderKey::new(1, "A/B"));
    }
}
