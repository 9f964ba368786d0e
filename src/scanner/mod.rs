//! Music library scanner.
//!
//! Walks a library folder, reads tags from every supported audio file, fills
//! gaps from the filename, extracts album art and hands one
//! [`CatalogRecord`] per track to a [`CatalogStore`].
//!
//! Files whose stem contains [`ENHANCED_MARKER`] are not cataloged on their
//! own. They are linked to the standard file with the same stem.

pub mod artwork;
pub mod channel;
pub mod filename;
pub mod tags;

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use walkdir::WalkDir;

use crate::audio;
use crate::catalog::{CatalogRecord, CatalogStore};
use artwork::AlbumArtExtractor;

pub const ENHANCED_MARKER: &str = "_enhanced";
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";
const LYRICS_FILE: &str = "lyrics.lrc";

/// Counts reported at the end of a scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    /// Supported audio files found, enhanced variants included
    pub discovered: usize,
    pub enhanced_variants: usize,
    pub cataloged: usize,
    pub skipped: usize,
}

/// First 16 hex characters of the MD5 of `value`
pub fn generate_id(value: &str) -> String {
    let mut digest = format!("{:x}", md5::compute(value.as_bytes()));
    digest.truncate(16);
    digest
}

/// Key shared by a standard file and its enhanced variant
fn variant_key(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default()
        .replace(ENHANCED_MARKER, "");
    path.parent().unwrap_or(Path::new("")).join(stem)
}

fn is_enhanced(path: &Path) -> bool {
    path.file_stem()
        .map(|s| s.to_string_lossy().contains(ENHANCED_MARKER))
        .unwrap_or(false)
}

/// Supported files under `root`, split into standard files and enhanced
/// variants keyed by [`variant_key`]
fn discover(root: &Path) -> (Vec<PathBuf>, HashMap<PathBuf, PathBuf>) {
    let mut standard = Vec::new();
    let mut enhanced = HashMap::new();

    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_file() || !audio::is_supported(path) {
            continue;
        }

        if is_enhanced(path) {
            enhanced.insert(variant_key(path), path.to_path_buf());
        } else {
            standard.push(path.to_path_buf());
        }
    }

    (standard, enhanced)
}

fn read_sibling_lyrics(path: &Path) -> Option<String> {
    let lyrics_path = path.parent()?.join(LYRICS_FILE);
    if !lyrics_path.exists() {
        return None;
    }

    match std::fs::read_to_string(&lyrics_path) {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::warn!("Failed to read lyrics {}: {}", lyrics_path.display(), e);
            None
        }
    }
}

/// Build the catalog record for one file. Blocking.
fn build_record(path: &Path, artwork: &AlbumArtExtractor) -> Option<CatalogRecord> {
    let Some(tags) = tags::read_tags(path) else {
        tracing::warn!("No readable metadata, skipping {}", path.display());
        return None;
    };

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parsed = filename::parse_filename(&stem);

    let title = tags
        .get("title")
        .map(str::to_string)
        .or(parsed.title)
        .unwrap_or_else(|| stem.clone());
    let artist = channel::resolve_artist(tags.get("artist"), parsed.artist.as_deref())
        .unwrap_or_else(|| UNKNOWN_ARTIST.to_string());
    let album = tags.get("album").unwrap_or(UNKNOWN_ALBUM).to_string();

    let file_path = path.to_string_lossy().into_owned();
    let id = generate_id(&file_path);
    let artist_id = generate_id(&artist);
    let album_id = generate_id(&format!("{}-{}", artist, album));

    let cover_image_path = artwork.extract(path, &album_id);
    let lyrics = read_sibling_lyrics(path);

    Some(CatalogRecord {
        id,
        title,
        artist,
        artist_id,
        album,
        album_id,
        track_number: tags.track_number(),
        year: tags.year(),
        genre: tags.get("genre").map(str::to_string),
        duration_ms: tags.duration_ms(),
        file_path,
        cover_image_path,
        lyrics,
        has_enhanced_version: false,
        enhanced_file_path: None,
    })
}

pub struct MusicScanner {
    store: Arc<dyn CatalogStore>,
    artwork: AlbumArtExtractor,
    scan_lock: Mutex<()>,
}

impl MusicScanner {
    pub fn new(store: Arc<dyn CatalogStore>, covers_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            artwork: AlbumArtExtractor::new(covers_dir),
            scan_lock: Mutex::new(()),
        }
    }

    pub fn covers_dir(&self) -> &Path {
        self.artwork.covers_dir()
    }

    /// Scan `root` recursively and catalog every standard audio file.
    ///
    /// A missing root is created and yields an empty summary. Concurrent
    /// calls wait for the running scan to finish. Relative roots are resolved
    /// against the working directory so ids match those of absolute paths.
    pub async fn scan(&self, root: &Path) -> Result<ScanSummary> {
        let _guard = self.scan_lock.lock().await;
        let root = std::path::absolute(root)
            .with_context(|| format!("Failed to resolve library folder: {}", root.display()))?;
        let root = root.as_path();

        if !root.exists() {
            tokio::fs::create_dir_all(root)
                .await
                .with_context(|| format!("Failed to create library folder: {}", root.display()))?;
            tracing::info!("Created empty library folder {}", root.display());
            return Ok(ScanSummary::default());
        }

        tracing::info!("Scanning library at: {}", root.display());

        let walk_root = root.to_path_buf();
        let (standard, enhanced) = tokio::task::spawn_blocking(move || discover(&walk_root))
            .await
            .context("Library walk panicked")?;

        let mut summary = ScanSummary {
            discovered: standard.len() + enhanced.len(),
            enhanced_variants: enhanced.len(),
            ..ScanSummary::default()
        };
        tracing::info!(
            "Found {} audio files ({} enhanced variants)",
            summary.discovered,
            summary.enhanced_variants
        );

        for path in standard {
            let sibling = enhanced.get(&variant_key(&path));
            match self.process_file(&path, sibling.map(PathBuf::as_path)).await {
                Some(_) => summary.cataloged += 1,
                None => summary.skipped += 1,
            }
        }

        tracing::info!(
            "Scan complete: {} cataloged, {} skipped",
            summary.cataloged,
            summary.skipped
        );
        Ok(summary)
    }

    /// Catalog a single file, linking `enhanced` when it exists on disk.
    ///
    /// Returns the record written, or `None` when the file was skipped or the
    /// store rejected it.
    pub async fn process_file(&self, path: &Path, enhanced: Option<&Path>) -> Option<CatalogRecord> {
        let owned_path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        let artwork = self.artwork.clone();
        let record = match tokio::task::spawn_blocking(move || build_record(&owned_path, &artwork)).await {
            Ok(record) => record?,
            Err(e) => {
                tracing::error!("Error processing {}: {}", path.display(), e);
                return None;
            }
        };

        if let Err(e) = self.store.upsert_track(&record).await {
            tracing::error!("Failed to catalog {}: {:#}", path.display(), e);
            return None;
        }
        tracing::debug!("Cataloged '{}' by {} ({})", record.title, record.artist, record.id);

        let mut record = record;
        if let Some(enhanced) = enhanced.filter(|p| p.exists()) {
            let enhanced = std::path::absolute(enhanced).unwrap_or_else(|_| enhanced.to_path_buf());
            let enhanced_path = enhanced.to_string_lossy().into_owned();
            match self.store.update_enhanced_info(&record.id, &enhanced_path).await {
                Ok(()) => {
                    record.has_enhanced_version = true;
                    record.enhanced_file_path = Some(enhanced_path);
                }
                Err(e) => {
                    tracing::error!("Failed to link enhanced variant of {}: {:#}", path.display(), e)
                }
            }
        }

        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_md5_prefixes() {
        assert_eq!(generate_id("abc"), "900150983cd24fb0");
        assert_eq!(generate_id("abc").len(), 16);
        assert_ne!(generate_id("Artist-Album"), generate_id("Artist-Album2"));
    }

    #[test]
    fn enhanced_files_share_the_standard_key() {
        let standard = Path::new("/lib/a/track.mp3");
        let enhanced = Path::new("/lib/a/track_enhanced.mp3");
        assert!(!is_enhanced(standard));
        assert!(is_enhanced(enhanced));
        assert_eq!(variant_key(standard), variant_key(enhanced));
        assert_ne!(variant_key(standard), variant_key(Path::new("/lib/b/track.mp3")));
    }

    #[test]
    fn discovery_partitions_variants() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir_all(&nested).unwrap();
        for name in ["one.mp3", "one_enhanced.mp3", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::write(nested.join("two.FLAC"), b"x").unwrap();

        let (standard, enhanced) = discover(dir.path());

        assert_eq!(standard.len(), 2);
        assert_eq!(enhanced.len(), 1);
        assert_eq!(
            enhanced.get(&variant_key(&dir.path().join("one.mp3"))),
            Some(&dir.path().join("one_enhanced.mp3"))
        );
    }
}
