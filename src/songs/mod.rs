use std::path::PathBuf;

use rand::seq::IndexedRandom;
use rand::Rng;

use crate::error::AppError;

/// Extension a library entry must end with to be playable.
pub const AUDIO_SUFFIX: &str = ".mp3";

/// Query value that asks for a random track instead of a search.
pub const RANDOM_QUERY: &str = "random";

/// How a track was picked, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionKind {
    Random,
    Matched,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub file_name: String,
    pub kind: SelectionKind,
}

/// A directory of audio files, re-read on every lookup.
#[derive(Debug, Clone)]
pub struct SongLibrary {
    dir: PathBuf,
}

impl SongLibrary {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// List playable file names, sorted so that search results do not depend
    /// on filesystem enumeration order.
    pub fn list(&self) -> Result<Vec<String>, AppError> {
        if !self.dir.is_dir() {
            tracing::error!("Songs folder not found at {}", self.dir.display());
            return Err(AppError::SongsDirNotFound(self.dir.clone()));
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;

            if entry.file_type()?.is_dir() {
                continue;
            }

            // Names that are not valid UTF-8 cannot be matched or served by name.
            if let Ok(name) = entry.file_name().into_string() {
                if name.ends_with(AUDIO_SUFFIX) {
                    files.push(name);
                }
            }
        }

        files.sort();
        Ok(files)
    }

    /// Pick a track for `query` and return its path alongside the selection.
    pub fn find<R: Rng + ?Sized>(
        &self,
        query: &str,
        rng: &mut R,
    ) -> Result<(Selection, PathBuf), AppError> {
        tracing::info!("Looking in folder: {}", self.dir.display());

        let files = self.list()?;
        tracing::debug!("Found files: {:?}", files);

        let selection = select(&files, query, rng).ok_or(AppError::EmptyLibrary)?;

        if selection.kind == SelectionKind::Fallback {
            tracing::warn!("Song '{}' not found, playing random track", query);
        }
        tracing::info!("Playing: {}", selection.file_name);

        let path = self.dir.join(&selection.file_name);
        Ok((selection, path))
    }
}

fn normalize_query(query: &str) -> String {
    query.to_lowercase().replace(' ', "")
}

fn normalize_file_name(name: &str) -> String {
    name.to_lowercase().replace('_', "")
}

/// Choose a file from `files` for `query`.
///
/// `"random"` picks uniformly. Any other query picks the first file whose
/// normalized name contains the normalized query, falling back to a uniform
/// pick when nothing matches. Returns `None` only for an empty library.
pub fn select<R: Rng + ?Sized>(files: &[String], query: &str, rng: &mut R) -> Option<Selection> {
    if query == RANDOM_QUERY {
        return files.choose(rng).map(|name| Selection {
            file_name: name.clone(),
            kind: SelectionKind::Random,
        });
    }

    let needle = normalize_query(query);
    if let Some(name) = files
        .iter()
        .find(|name| normalize_file_name(name).contains(&needle))
    {
        return Some(Selection {
            file_name: name.clone(),
            kind: SelectionKind::Matched,
        });
    }

    files.choose(rng).map(|name| Selection {
        file_name: name.clone(),
        kind: SelectionKind::Fallback,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::fs;
    use tempfile::TempDir;

    fn library(files: &[&str]) -> Vec<String> {
        files.iter().map(|f| f.to_string()).collect()
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn matches_with_spaces_and_underscores_normalized() {
        let files = library(&["Bohemian_Rhapsody.mp3", "Imagine.mp3"]);
        let selection = select(&files, "bohemian rhapsody", &mut rng()).unwrap();
        assert_eq!(selection.file_name, "Bohemian_Rhapsody.mp3");
        assert_eq!(selection.kind, SelectionKind::Matched);
    }

    #[test]
    fn match_is_case_insensitive() {
        let files = library(&["Bohemian_Rhapsody.mp3", "Imagine.mp3"]);
        let selection = select(&files, "IMAGINE", &mut rng()).unwrap();
        assert_eq!(selection.file_name, "Imagine.mp3");
    }

    #[test]
    fn first_match_wins() {
        let files = library(&["Love_Me_Do.mp3", "Love_Me_Tender.mp3"]);
        let selection = select(&files, "love me", &mut rng()).unwrap();
        assert_eq!(selection.file_name, "Love_Me_Do.mp3");
    }

    #[test]
    fn no_match_falls_back_to_random() {
        let files = library(&["Bohemian_Rhapsody.mp3", "Imagine.mp3"]);
        let selection = select(&files, "nonexistent song", &mut rng()).unwrap();
        assert!(files.contains(&selection.file_name));
        assert_eq!(selection.kind, SelectionKind::Fallback);
    }

    #[test]
    fn random_sentinel_skips_matching() {
        // "random" would match this file by substring; the sentinel must not search.
        let files = library(&["Random_Access.mp3", "Imagine.mp3"]);
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let selection = select(&files, "random", &mut rng).unwrap();
            assert_eq!(selection.kind, SelectionKind::Random);
            assert!(files.contains(&selection.file_name));
        }
    }

    #[test]
    fn random_sentinel_is_case_sensitive() {
        let files = library(&["Random_Access.mp3", "Imagine.mp3"]);
        let selection = select(&files, "Random", &mut rng()).unwrap();
        assert_eq!(selection.kind, SelectionKind::Matched);
        assert_eq!(selection.file_name, "Random_Access.mp3");
    }

    #[test]
    fn random_covers_whole_library() {
        let files = library(&["a.mp3", "b.mp3", "c.mp3"]);
        let mut rng = rng();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            seen.insert(select(&files, "random", &mut rng).unwrap().file_name);
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn empty_library_selects_nothing() {
        assert!(select(&[], "random", &mut rng()).is_none());
        assert!(select(&[], "imagine", &mut rng()).is_none());
    }

    #[test]
    fn query_underscores_are_not_stripped() {
        let files = library(&["Imagine.mp3"]);
        let selection = select(&files, "imag_ine", &mut rng()).unwrap();
        assert_eq!(selection.kind, SelectionKind::Fallback);
    }

    #[test]
    fn lists_only_audio_files_sorted() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b_song.mp3"), b"b").unwrap();
        fs::write(dir.path().join("a_song.mp3"), b"a").unwrap();
        fs::write(dir.path().join("cover.jpg"), b"c").unwrap();
        fs::write(dir.path().join("notes.MP3"), b"n").unwrap();
        fs::create_dir(dir.path().join("nested.mp3")).unwrap();

        let library = SongLibrary::new(dir.path().to_path_buf());
        assert_eq!(library.list().unwrap(), vec!["a_song.mp3", "b_song.mp3"]);
    }

    #[test]
    fn missing_directory_is_not_found() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("songs");
        let library = SongLibrary::new(missing.clone());

        match library.list() {
            Err(AppError::SongsDirNotFound(path)) => assert_eq!(path, missing),
            other => panic!("expected SongsDirNotFound, got {:?}", other),
        }
    }

    #[test]
    fn empty_directory_is_empty_library() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("readme.txt"), b"x").unwrap();
        let library = SongLibrary::new(dir.path().to_path_buf());

        assert!(matches!(
            library.find("random", &mut rng()),
            Err(AppError::EmptyLibrary)
        ));
    }

    #[test]
    fn find_returns_path_inside_library() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Imagine.mp3"), b"imagine").unwrap();
        let library = SongLibrary::new(dir.path().to_path_buf());

        let (selection, path) = library.find("imagine", &mut rng()).unwrap();
        assert_eq!(selection.file_name, "Imagine.mp3");
        assert_eq!(path, dir.path().join("Imagine.mp3"));
    }

    #[test]
    fn repeated_queries_are_deterministic() {
        let dir = TempDir::new().unwrap();
        for name in ["Love_Me_Tender.mp3", "Love_Me_Do.mp3", "Help.mp3"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        let library = SongLibrary::new(dir.path().to_path_buf());

        for seed in 0..5 {
            let mut rng = StdRng::seed_from_u64(seed);
            let (selection, _) = library.find("love me", &mut rng).unwrap();
            assert_eq!(selection.file_name, "Love_Me_Do.mp3");
        }
    }
}
