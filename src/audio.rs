use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use symphonia::core::meta::{MetadataRevision, StandardTagKey};

/// Extensions the library scanner picks up
pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["mp3", "flac", "m4a", "ogg", "wav"];

/// Raw tag data read from an audio container
#[derive(Debug, Clone, Default)]
pub struct RawTags {
    /// Normalized lowercase keys (`title`, `artist`, `album`, `tracknumber`, `date`, `genre`)
    pub tags: HashMap<String, String>,
    pub duration_secs: Option<f64>,
}

impl RawTags {
    fn absorb(&mut self, revision: &MetadataRevision) {
        for tag in revision.tags() {
            let key = match tag.std_key {
                Some(std_key) => normalized_std_key(std_key),
                None => normalized_raw_key(&tag.key),
            };
            let Some(key) = key else { continue };

            // RIFF INFO and some ID3v2.3 strings keep their NUL terminator
            let value = tag.value.to_string();
            let value = value.trim_matches(|c: char| c == '\0' || c.is_whitespace());
            if value.is_empty() {
                continue;
            }

            tracing::trace!("tag {} ({}) = {}", key, tag.key, value);
            self.tags.insert(key.to_string(), value.to_string());
        }
    }
}

fn normalized_std_key(std_key: StandardTagKey) -> Option<&'static str> {
    match std_key {
        StandardTagKey::TrackTitle => Some("title"),
        StandardTagKey::Artist => Some("artist"),
        StandardTagKey::Album => Some("album"),
        StandardTagKey::TrackNumber => Some("tracknumber"),
        StandardTagKey::Date | StandardTagKey::ReleaseDate => Some("date"),
        StandardTagKey::Genre => Some("genre"),
        _ => None,
    }
}

/// Fallback for tags symphonia does not map to a standard key
fn normalized_raw_key(key: &str) -> Option<&'static str> {
    match key.to_uppercase().as_str() {
        "TITLE" | "TIT2" | "©NAM" | "INAM" => Some("title"),
        "ARTIST" | "TPE1" | "©ART" | "IART" => Some("artist"),
        "ALBUM" | "TALB" | "©ALB" | "IPRD" => Some("album"),
        "TRACKNUMBER" | "TRCK" | "TRKN" | "ITRK" => Some("tracknumber"),
        "DATE" | "YEAR" | "TDRC" | "TYER" | "©DAY" | "ICRD" => Some("date"),
        "GENRE" | "TCON" | "©GEN" | "IGNR" => Some("genre"),
        _ => None,
    }
}

/// Probe a file with symphonia and collect its tags and duration.
fn probe_tags(path: &Path, extension: &str) -> Result<RawTags> {
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {} file", extension.to_uppercase()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    hint.with_extension(extension);

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &Default::default(), &MetadataOptions::default())
        .with_context(|| format!("Failed to probe {} file", extension.to_uppercase()))?;

    let mut format = probed.format;
    let mut probed_metadata = probed.metadata;

    let mut raw = RawTags::default();

    // Tags found ahead of the container (ID3v2 on mp3) come first, the
    // container's own revision wins on conflicts.
    if let Some(revision) = probed_metadata.get().and_then(|m| m.current().cloned()) {
        raw.absorb(&revision);
    }
    if let Some(revision) = format.metadata().current().cloned() {
        raw.absorb(&revision);
    }

    if let Some(track) = format.default_track() {
        if let (Some(time_base), Some(n_frames)) =
            (track.codec_params.time_base, track.codec_params.n_frames)
        {
            let time = time_base.calc_time(n_frames);
            raw.duration_secs = Some(time.seconds as f64 + time.frac);
        }
    }

    Ok(raw)
}

/// First embedded visual symphonia exposes for the file, if any.
fn probe_visual(path: &Path, extension: &str) -> Result<Option<Vec<u8>>> {
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {} file", extension.to_uppercase()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    hint.with_extension(extension);

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &Default::default(), &MetadataOptions::default())
        .with_context(|| format!("Failed to probe {} file", extension.to_uppercase()))?;

    let mut format = probed.format;
    let mut probed_metadata = probed.metadata;

    let revision = format
        .metadata()
        .current()
        .cloned()
        .or_else(|| probed_metadata.get().and_then(|m| m.current().cloned()));

    Ok(revision.and_then(|rev| rev.visuals().first().map(|visual| visual.data.to_vec())))
}

/// Trait representing read access to an audio container
pub trait AudioFile: Send + Sync {
    /// Get the file format name (e.g., "flac", "mp3")
    fn format_name(&self) -> &'static str;

    /// Read tags and duration from the file
    fn read_tags(&self, path: &Path) -> Result<RawTags> {
        probe_tags(path, self.format_name())
    }

    /// Get the first embedded picture from the file
    fn embedded_picture(&self, path: &Path) -> Result<Option<Vec<u8>>>;
}

/// FLAC audio file implementation
pub struct FlacFile;

impl AudioFile for FlacFile {
    fn format_name(&self) -> &'static str {
        "flac"
    }

    fn embedded_picture(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        let tag = metaflac::Tag::read_from_path(path).context("Failed to read FLAC tags")?;
        Ok(tag.pictures().next().map(|picture| picture.data.clone()))
    }
}

/// MP3 audio file implementation
pub struct Mp3File;

impl AudioFile for Mp3File {
    fn format_name(&self) -> &'static str {
        "mp3"
    }

    fn embedded_picture(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        let tag = match id3::Tag::read_from_path(path) {
            Ok(tag) => tag,
            Err(e) if matches!(e.kind, id3::ErrorKind::NoTag) => return Ok(None),
            Err(e) => return Err(e).context("Failed to read MP3 tags"),
        };
        Ok(tag.pictures().next().map(|picture| picture.data.to_vec()))
    }
}

/// OGG Vorbis audio file implementation
pub struct OggFile;

impl AudioFile for OggFile {
    fn format_name(&self) -> &'static str {
        "ogg"
    }

    fn embedded_picture(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        // METADATA_BLOCK_PICTURE comments surface as symphonia visuals
        probe_visual(path, "ogg")
    }
}

/// M4A (AAC) audio file implementation
pub struct M4aFile;

impl AudioFile for M4aFile {
    fn format_name(&self) -> &'static str {
        "m4a"
    }

    fn embedded_picture(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        let tag = mp4ameta::Tag::read_from_path(path).context("Failed to read M4A tags")?;
        Ok(tag.artworks().next().map(|artwork| artwork.data.to_vec()))
    }
}

/// WAV audio file implementation
pub struct WavFile;

impl AudioFile for WavFile {
    fn format_name(&self) -> &'static str {
        "wav"
    }

    fn embedded_picture(&self, _path: &Path) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

/// Factory function to create the appropriate AudioFile implementation based on file extension
pub fn get_audio_file_handler(extension: &str) -> Option<Box<dyn AudioFile>> {
    match extension.to_lowercase().as_str() {
        "flac" => Some(Box::new(FlacFile)),
        "mp3" => Some(Box::new(Mp3File)),
        "ogg" => Some(Box::new(OggFile)),
        "m4a" => Some(Box::new(M4aFile)),
        "wav" => Some(Box::new(WavFile)),
        _ => None,
    }
}

/// Whether the path carries one of the supported audio extensions
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// MIME type used when streaming a file with the given extension
pub fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
        .as_deref()
    {
        Some("flac") => "audio/flac",
        Some("mp3") => "audio/mpeg",
        Some("ogg") => "audio/ogg",
        Some("m4a") => "audio/mp4",
        Some("wav") => "audio/wav",
        _ => "application/octet-stream",
    }
}
