//! Album art extraction.
//!
//! Pulls the first embedded picture out of a track, shrinks it to fit
//! [`THUMBNAIL_BOUND`] and stores it as `<covers_dir>/<album_id>.jpg`.
//! The first track of an album to produce a cover wins; later tracks reuse
//! the file on disk.

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use std::path::{Path, PathBuf};

use crate::audio;

pub const THUMBNAIL_BOUND: u32 = 640;
pub const JPEG_QUALITY: u8 = 85;

#[derive(Debug, Clone)]
pub struct AlbumArtExtractor {
    covers_dir: PathBuf,
}

impl AlbumArtExtractor {
    pub fn new(covers_dir: impl Into<PathBuf>) -> Self {
        Self {
            covers_dir: covers_dir.into(),
        }
    }

    pub fn covers_dir(&self) -> &Path {
        &self.covers_dir
    }

    fn cover_path(&self, album_id: &str) -> PathBuf {
        self.covers_dir.join(format!("{}.jpg", album_id))
    }

    /// Cover URL for `album_id`, extracting it from `path` when needed.
    ///
    /// Returns `/covers/<album_id>.jpg`, or `None` when the track has no
    /// usable embedded picture.
    pub fn extract(&self, path: &Path, album_id: &str) -> Option<String> {
        let cover_path = self.cover_path(album_id);
        if cover_path.exists() {
            return Some(cover_url(album_id));
        }

        match self.try_extract(path, &cover_path) {
            Ok(true) => {
                tracing::debug!("Saved cover for album {} from {}", album_id, path.display());
                Some(cover_url(album_id))
            }
            Ok(false) => None,
            Err(e) => {
                tracing::warn!("Failed to extract album art from {}: {:#}", path.display(), e);
                None
            }
        }
    }

    fn try_extract(&self, path: &Path, cover_path: &Path) -> Result<bool> {
        let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
            return Ok(false);
        };
        let Some(handler) = audio::get_audio_file_handler(extension) else {
            return Ok(false);
        };
        let Some(picture) = handler.embedded_picture(path)? else {
            return Ok(false);
        };

        std::fs::create_dir_all(&self.covers_dir).with_context(|| {
            format!("Failed to create covers dir: {}", self.covers_dir.display())
        })?;
        save_thumbnail(&picture, cover_path)?;
        Ok(true)
    }
}

pub fn cover_url(album_id: &str) -> String {
    format!("/covers/{}.jpg", album_id)
}

/// Decode `image_data`, fit it inside the thumbnail bound and write a JPEG.
///
/// Images already inside the bound keep their size.
pub fn save_thumbnail(image_data: &[u8], output: &Path) -> Result<()> {
    let img = image::load_from_memory(image_data).context("Failed to decode embedded picture")?;

    let img = if img.width() > THUMBNAIL_BOUND || img.height() > THUMBNAIL_BOUND {
        img.resize(THUMBNAIL_BOUND, THUMBNAIL_BOUND, FilterType::Lanczos3)
    } else {
        img
    };

    let mut encoded = Vec::new();
    img.to_rgb8()
        .write_with_encoder(JpegEncoder::new_with_quality(&mut encoded, JPEG_QUALITY))
        .context("Failed to encode thumbnail")?;

    std::fs::write(output, encoded)
        .with_context(|| format!("Failed to write thumbnail: {}", output.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 40, 90]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn thumbnail_fits_bound_and_keeps_aspect() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("wide.jpg");

        save_thumbnail(&png_bytes(1000, 500), &output).unwrap();

        let thumb = image::open(&output).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (640, 320));
    }

    #[test]
    fn small_pictures_are_not_upscaled() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("small.jpg");

        save_thumbnail(&png_bytes(300, 200), &output).unwrap();

        let thumb = image::open(&output).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (300, 200));
    }

    #[test]
    fn garbage_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(save_thumbnail(b"not an image", &dir.path().join("x.jpg")).is_err());
    }

    #[test]
    fn existing_cover_is_reused_without_reading_track() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = AlbumArtExtractor::new(dir.path());
        std::fs::write(dir.path().join("abc123.jpg"), b"already here").unwrap();

        let url = extractor.extract(Path::new("/nowhere/track.mp3"), "abc123");

        assert_eq!(url.as_deref(), Some("/covers/abc123.jpg"));
        assert_eq!(std::fs::read(dir.path().join("abc123.jpg")).unwrap(), b"already here");
    }

    #[test]
    fn unreadable_track_gives_no_cover() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = AlbumArtExtractor::new(dir.path().join("covers"));
        assert_eq!(extractor.extract(Path::new("/nowhere/track.flac"), "id"), None);
        assert_eq!(extractor.extract(Path::new("/nowhere/track.wav"), "id"), None);
    }
}
