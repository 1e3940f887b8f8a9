//! Folder classification: which directories are catalog items, and which
//! companion files they carry.
//!
//! A "leaf item" folder directly contains at least one descriptor file.
//! Anything else (studio folders, grouping folders) is a container. Artwork
//! and video lookups never recurse; companions always sit next to the
//! descriptor.

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::nfo::NFO_EXTENSION;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];
const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "wmv", "flv", "webm", "m4v", "3gp", "ts", "mpg", "mpeg",
];

/// Companion artwork found next to a descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Artwork {
    pub poster: Option<PathBuf>,
    pub fanart: Option<PathBuf>,
}

/// Lower-case extension of a path, if any.
fn extension_of(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_lowercase())
}

/// True if the file name has the descriptor extension (any base name).
pub fn is_nfo_file(path: &Path) -> bool {
    extension_of(path).as_deref() == Some(NFO_EXTENSION)
}

/// All descriptor files directly inside `folder`, sorted by name so the
/// "first descriptor" choice is deterministic.
pub fn nfo_files_in(folder: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(folder)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_nfo_file(path))
        .collect();
    files.sort();
    Ok(files)
}

/// True iff the folder directly contains at least one descriptor file.
pub fn is_item_folder(folder: &Path) -> bool {
    match nfo_files_in(folder) {
        Ok(files) => !files.is_empty(),
        Err(_) => false,
    }
}

/// Locate poster and fanart images in an item folder.
///
/// Two-tier priority per kind: a basename ending in the short suffix (`ps`
/// for poster, `pl` for fanart) outranks a basename merely containing the
/// keyword, which covers scraper output like `ABC-123-C-poster.jpg`.
pub fn find_artwork(folder: &Path) -> Artwork {
    let entries = match std::fs::read_dir(folder) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(path = %folder.display(), error = %e, "cannot read item folder");
            return Artwork::default();
        }
    };

    let mut artwork = Artwork::default();
    let mut poster_rank = 0u8;
    let mut fanart_rank = 0u8;

    let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
    paths.sort();

    for path in paths {
        let Some(ext) = extension_of(&path) else {
            continue;
        };
        if !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            continue;
        }
        let stem = match path.file_stem() {
            Some(stem) => stem.to_string_lossy().to_lowercase(),
            None => continue,
        };

        if stem.ends_with("ps") {
            if poster_rank < 2 {
                poster_rank = 2;
                artwork.poster = Some(path.clone());
            }
        } else if stem.contains("poster") && poster_rank < 1 {
            poster_rank = 1;
            artwork.poster = Some(path.clone());
        }

        if stem.ends_with("pl") {
            if fanart_rank < 2 {
                fanart_rank = 2;
                artwork.fanart = Some(path.clone());
            }
        } else if stem.contains("fanart") && fanart_rank < 1 {
            fanart_rank = 1;
            artwork.fanart = Some(path);
        }
    }

    artwork
}

/// First playable video file in an item folder, verified readable.
pub fn find_video(folder: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(folder).ok()?;
    let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
    paths.sort();

    paths.into_iter().find(|path| {
        let Some(ext) = extension_of(path) else {
            return false;
        };
        VIDEO_EXTENSIONS.contains(&ext.as_str()) && File::open(path).is_ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_item_folder_detection() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_item_folder(dir.path()));

        touch(&dir.path().join("anything.nfo"));
        assert!(is_item_folder(dir.path()));
    }

    #[test]
    fn test_nfo_files_any_base_name() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b.nfo"));
        touch(&dir.path().join("a.NFO"));
        touch(&dir.path().join("cover.jpg"));

        let files = nfo_files_in(dir.path()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.NFO", "b.nfo"]);
    }

    #[test]
    fn test_missing_folder_is_not_item() {
        assert!(!is_item_folder(Path::new("/definitely/not/here")));
    }

    #[test]
    fn test_suffix_beats_keyword_for_poster() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("ABC-123-poster.jpg"));
        touch(&dir.path().join("ABC-123ps.jpg"));

        let artwork = find_artwork(dir.path());
        assert_eq!(
            artwork.poster.unwrap().file_name().unwrap(),
            "ABC-123ps.jpg"
        );
    }

    #[test]
    fn test_keyword_poster_found_without_suffix() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("MKMP-393-C-poster.jpg"));

        let artwork = find_artwork(dir.path());
        assert_eq!(
            artwork.poster.unwrap().file_name().unwrap(),
            "MKMP-393-C-poster.jpg"
        );
    }

    #[test]
    fn test_fanart_suffix_and_keyword() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("ABC-123-fanart.png"));
        touch(&dir.path().join("ABC-123pl.webp"));

        let artwork = find_artwork(dir.path());
        assert_eq!(artwork.fanart.unwrap().file_name().unwrap(), "ABC-123pl.webp");
    }

    #[test]
    fn test_non_image_extensions_ignored() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("ABC-123ps.txt"));
        touch(&dir.path().join("poster.gif"));

        let artwork = find_artwork(dir.path());
        assert!(artwork.poster.is_none());
        assert!(artwork.fanart.is_none());
    }

    #[test]
    fn test_find_video() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("sample.txt"));
        assert!(find_video(dir.path()).is_none());

        touch(&dir.path().join("movie.mp4"));
        assert_eq!(
            find_video(dir.path()).unwrap().file_name().unwrap(),
            "movie.mp4"
        );
    }
}
