//! Read-only track catalog
//!
//! Built once at server startup from a music directory. Track ids are the
//! zero-based position in load order, and the catalog never changes after
//! that, so it is shared behind an `Arc` without locking.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::error::TrackError;

/// One catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Track {
    pub id: usize,
    pub path: PathBuf,
    pub name: String,
}

/// Ordered, immutable list of tracks
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tracks: Vec<Track>,
}

impl Catalog {
    /// Build a catalog from paths in the given order
    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let tracks = paths
            .into_iter()
            .enumerate()
            .map(|(id, path)| {
                let path = path.into();
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                Track { id, path, name }
            })
            .collect();

        Self { tracks }
    }

    /// Scan `dir` for `.wav` files, sorted by file name.
    ///
    /// An empty directory is not an error; the server still starts and
    /// serves an empty list.
    pub fn load_dir(dir: &Path) -> Result<Self, TrackError> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| TrackError::LibraryUnavailable(format!("{}: {}", dir.display(), e)))?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_wav(path))
            .collect();
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        let catalog = Self::from_paths(paths);
        if catalog.is_empty() {
            tracing::warn!("No .wav files found in {}", dir.display());
        } else {
            tracing::info!("Loaded {} tracks from {}", catalog.len(), dir.display());
            for track in &catalog.tracks {
                tracing::debug!("  [{}] {}", track.id, track.path.display());
            }
        }

        Ok(catalog)
    }

    pub fn get(&self, id: usize) -> Result<&Track, TrackError> {
        self.tracks.get(id).ok_or(TrackError::NotFound(id))
    }

    /// Display names in id order
    pub fn names(&self) -> Vec<String> {
        self.tracks.iter().map(|t| t.name.clone()).collect()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("wav"))
        .unwrap_or(false)
}
