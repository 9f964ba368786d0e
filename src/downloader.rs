//! Audio downloads from YouTube through the `yt-dlp` binary.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Semaphore;

use crate::catalog::CatalogRecord;
use crate::lyrics::LyricsClient;
use crate::scanner::filename::parse_video_title;
use crate::scanner::{UNKNOWN_ARTIST, generate_id};

pub const DOWNLOAD_ALBUM: &str = "YouTube Downloads";
pub const DOWNLOAD_GENRE: &str = "YouTube";

const MAX_CONCURRENT_DOWNLOADS: usize = 3;
const VERSION_TIMEOUT: Duration = Duration::from_secs(5);
const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp3,
    Flac,
    M4a,
    Ogg,
    Wav,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Flac => "flac",
            AudioFormat::M4a => "m4a",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Wav => "wav",
        }
    }

    /// Value passed to `--audio-format`
    fn codec(&self) -> &'static str {
        match self {
            AudioFormat::Ogg => "vorbis",
            other => other.extension(),
        }
    }

    fn embeds_metadata(&self) -> bool {
        matches!(self, AudioFormat::Mp3 | AudioFormat::Flac | AudioFormat::M4a)
    }

    fn embeds_thumbnail(&self) -> bool {
        matches!(self, AudioFormat::Mp3 | AudioFormat::M4a)
    }
}

impl std::str::FromStr for AudioFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mp3" => Ok(AudioFormat::Mp3),
            "flac" => Ok(AudioFormat::Flac),
            "m4a" => Ok(AudioFormat::M4a),
            "ogg" => Ok(AudioFormat::Ogg),
            "wav" => Ok(AudioFormat::Wav),
            other => anyhow::bail!("Unsupported audio format: {}", other),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioQuality {
    #[default]
    #[serde(rename = "best")]
    Best,
    #[serde(rename = "320")]
    Kbps320,
    #[serde(rename = "256")]
    Kbps256,
    #[serde(rename = "192")]
    Kbps192,
    #[serde(rename = "128")]
    Kbps128,
}

impl AudioQuality {
    /// Value passed to `--audio-quality`
    fn yt_dlp_value(&self) -> &'static str {
        match self {
            AudioQuality::Best => "0",
            AudioQuality::Kbps320 => "320K",
            AudioQuality::Kbps256 => "256K",
            AudioQuality::Kbps192 => "192K",
            AudioQuality::Kbps128 => "128K",
        }
    }
}

impl std::str::FromStr for AudioQuality {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "best" => Ok(AudioQuality::Best),
            "320" => Ok(AudioQuality::Kbps320),
            "256" => Ok(AudioQuality::Kbps256),
            "192" => Ok(AudioQuality::Kbps192),
            "128" => Ok(AudioQuality::Kbps128),
            other => anyhow::bail!("Unsupported audio quality: {}", other),
        }
    }
}

/// Subset of `yt-dlp -J` output
#[derive(Debug, Default, Deserialize)]
struct YtDlpInfo {
    id: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
    thumbnail: Option<String>,
    description: Option<String>,
    upload_date: Option<String>,
    view_count: Option<u64>,
    entries: Option<Vec<YtDlpEntry>>,
}

#[derive(Debug, Deserialize)]
struct YtDlpEntry {
    id: Option<String>,
    url: Option<String>,
    title: Option<String>,
}

impl YtDlpEntry {
    fn video_url(&self) -> Option<String> {
        match (&self.url, &self.id) {
            (Some(url), _) if url.starts_with("http") => Some(url.clone()),
            (_, Some(id)) => Some(format!("https://www.youtube.com/watch?v={}", id)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoInfo {
    pub id: Option<String>,
    pub title: String,
    pub artist: String,
    pub duration: Option<f64>,
    pub uploader: Option<String>,
    pub thumbnail: Option<String>,
    pub description: String,
    pub lyrics: Option<String>,
    pub upload_date: Option<String>,
    pub view_count: u64,
}

impl VideoInfo {
    pub fn duration_ms(&self) -> Option<i64> {
        self.duration.map(|secs| (secs * 1000.0) as i64)
    }

    /// Catalog record for a finished download of this video
    pub fn catalog_record(&self, file_path: &Path) -> CatalogRecord {
        let file_path = file_path.to_string_lossy().into_owned();
        CatalogRecord {
            id: generate_id(&file_path),
            title: self.title.clone(),
            artist: self.artist.clone(),
            artist_id: generate_id(&self.artist),
            album: DOWNLOAD_ALBUM.to_string(),
            album_id: generate_id(&format!("{}-{}", self.artist, DOWNLOAD_ALBUM)),
            track_number: None,
            year: None,
            genre: Some(DOWNLOAD_GENRE.to_string()),
            duration_ms: self.duration_ms().unwrap_or(0).max(0) as u64,
            file_path,
            cover_image_path: None,
            lyrics: self.lyrics.clone(),
            has_enhanced_version: false,
            enhanced_file_path: None,
        }
    }
}

fn video_info_from(info: YtDlpInfo) -> VideoInfo {
    let video_title = info.title.unwrap_or_default();
    let parsed = parse_video_title(&video_title);

    VideoInfo {
        id: info.id,
        title: parsed.title.unwrap_or_else(|| video_title.clone()),
        artist: parsed
            .artist
            .or_else(|| info.uploader.clone())
            .unwrap_or_else(|| UNKNOWN_ARTIST.to_string()),
        duration: info.duration,
        uploader: info.uploader,
        thumbnail: info.thumbnail,
        description: info.description.unwrap_or_default(),
        lyrics: None,
        upload_date: info.upload_date,
        view_count: info.view_count.unwrap_or(0),
    }
}

#[derive(Clone)]
pub struct YouTubeDownloader {
    yt_dlp: PathBuf,
    output_dir: PathBuf,
    lyrics: LyricsClient,
    permits: Arc<Semaphore>,
}

impl YouTubeDownloader {
    pub fn new(yt_dlp: impl Into<PathBuf>, output_dir: impl Into<PathBuf>, lyrics: LyricsClient) -> Self {
        Self {
            yt_dlp: yt_dlp.into(),
            output_dir: output_dir.into(),
            lyrics,
            permits: Arc::new(Semaphore::new(MAX_CONCURRENT_DOWNLOADS)),
        }
    }

    /// Whether the `yt-dlp` binary answers `--version`
    pub async fn is_available(&self) -> bool {
        let status = Command::new(&self.yt_dlp)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        match tokio::time::timeout(VERSION_TIMEOUT, status).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                tracing::warn!("yt-dlp not found: {}", e);
                false
            }
            Err(_) => false,
        }
    }

    async fn run(&self, args: Vec<OsString>) -> Result<Vec<u8>> {
        tracing::debug!("Running yt-dlp {:?}", args);

        let output = Command::new(&self.yt_dlp)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .context("Failed to spawn yt-dlp")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!("yt-dlp stderr: {}", stderr.trim());
            anyhow::bail!("yt-dlp exited with {}", output.status);
        }

        Ok(output.stdout)
    }

    /// Video metadata with artist/title split out of the video title, plus
    /// lyrics when both parts could be found
    pub async fn get_video_info(&self, url: &str) -> Result<VideoInfo> {
        let stdout = self
            .run(vec!["-J".into(), "--no-playlist".into(), "--no-warnings".into(), "--".into(), url.into()])
            .await?;
        let raw: YtDlpInfo = serde_json::from_slice(&stdout).context("Failed to parse yt-dlp JSON")?;

        let has_parsed_artist = raw
            .title
            .as_deref()
            .map(|t| parse_video_title(t).artist.is_some())
            .unwrap_or(false);

        let mut info = video_info_from(raw);
        if has_parsed_artist {
            info.lyrics = self.lyrics.fetch(&info.artist, &info.title).await;
        }

        Ok(info)
    }

    /// Download one video as audio and return the final file path
    pub async fn download_audio(&self, url: &str, format: AudioFormat, quality: AudioQuality) -> Result<PathBuf> {
        let _permit = self
            .permits
            .acquire()
            .await
            .context("Download queue closed")?;

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.output_dir.display()))?;

        let output_dir = std::path::absolute(&self.output_dir).unwrap_or_else(|_| self.output_dir.clone());
        let args = download_args(url, &output_dir, format, quality);

        tracing::info!("Downloading {} as {}", url, format.extension());
        let stdout = self.run(args).await?;

        let path = String::from_utf8_lossy(&stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .last()
            .map(PathBuf::from)
            .context("yt-dlp did not report an output file")?;

        if !path.exists() {
            anyhow::bail!("Downloaded file missing: {}", path.display());
        }

        tracing::info!("Download complete: {}", path.display());
        Ok(path)
    }

    /// Download every entry of a playlist, returning the files that succeeded
    pub async fn download_playlist(
        &self,
        url: &str,
        format: AudioFormat,
        quality: AudioQuality,
    ) -> Result<Vec<PathBuf>> {
        let stdout = self
            .run(vec!["--flat-playlist".into(), "-J".into(), "--no-warnings".into(), "--".into(), url.into()])
            .await?;
        let listing: YtDlpInfo =
            serde_json::from_slice(&stdout).context("Failed to parse yt-dlp playlist JSON")?;

        let entries = listing.entries.unwrap_or_default();
        let total = entries.len();
        let mut downloaded = Vec::new();

        for (index, entry) in entries.iter().enumerate() {
            let Some(video_url) = entry.video_url() else {
                continue;
            };
            tracing::info!(
                "Playlist item {}/{}: {}",
                index + 1,
                total,
                entry.title.as_deref().unwrap_or(&video_url)
            );

            match self.download_audio(&video_url, format, quality).await {
                Ok(path) => downloaded.push(path),
                Err(e) => tracing::warn!("Skipping {}: {:#}", video_url, e),
            }
        }

        Ok(downloaded)
    }
}

fn download_args(url: &str, output_dir: &Path, format: AudioFormat, quality: AudioQuality) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-f".into(),
        "bestaudio/best".into(),
        "--no-playlist".into(),
        "--no-warnings".into(),
        "-x".into(),
        "--audio-format".into(),
        format.codec().into(),
        "--audio-quality".into(),
        quality.yt_dlp_value().into(),
        "--postprocessor-args".into(),
        "ffmpeg:-ar 48000".into(),
    ];

    if format.embeds_metadata() {
        args.push("--embed-metadata".into());
    }
    if format.embeds_thumbnail() {
        args.push("--embed-thumbnail".into());
    }

    args.extend([
        "--print".into(),
        "after_move:filepath".into(),
        "-P".into(),
        output_dir.as_os_str().to_owned(),
        "-o".into(),
        OUTPUT_TEMPLATE.into(),
        "--".into(),
        url.into(),
    ]);
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_flag(args: &[OsString], flag: &str) -> bool {
        args.iter().any(|a| a == flag)
    }

    #[test]
    fn thumbnails_only_for_mp3_and_m4a() {
        let dir = Path::new("/out");
        let mp3 = download_args("u", dir, AudioFormat::Mp3, AudioQuality::Best);
        assert!(has_flag(&mp3, "--embed-metadata"));
        assert!(has_flag(&mp3, "--embed-thumbnail"));

        let flac = download_args("u", dir, AudioFormat::Flac, AudioQuality::Best);
        assert!(has_flag(&flac, "--embed-metadata"));
        assert!(!has_flag(&flac, "--embed-thumbnail"));

        let wav = download_args("u", dir, AudioFormat::Wav, AudioQuality::Best);
        assert!(!has_flag(&wav, "--embed-metadata"));
    }

    #[test]
    fn output_dir_is_passed_as_download_path() {
        let args = download_args("https://youtu.be/x", Path::new("/library"), AudioFormat::Mp3, AudioQuality::Best);
        let at = args.iter().position(|a| a == "-P").unwrap();
        assert_eq!(args[at + 1], "/library");
        assert_eq!(args.last().unwrap(), "https://youtu.be/x");
    }

    #[test]
    fn quality_and_codec_mapping() {
        let args = download_args("u", Path::new("/out"), AudioFormat::Ogg, AudioQuality::Kbps192);
        assert!(has_flag(&args, "vorbis"));
        assert!(has_flag(&args, "192K"));
        assert!(has_flag(&args, "ffmpeg:-ar 48000"));
        assert_eq!(args.last().map(|a| a.as_os_str()), Some(std::ffi::OsStr::new("u")));
        assert!(has_flag(&download_args("u", Path::new("/out"), AudioFormat::Mp3, AudioQuality::Best), "0"));
    }

    #[test]
    fn query_values_deserialize() {
        let format: AudioFormat = serde_json::from_str("\"m4a\"").unwrap();
        let quality: AudioQuality = serde_json::from_str("\"256\"").unwrap();
        assert_eq!(format, AudioFormat::M4a);
        assert_eq!(quality, AudioQuality::Kbps256);
        assert!(serde_json::from_str::<AudioFormat>("\"aiff\"").is_err());

        assert_eq!("flac".parse::<AudioFormat>().unwrap(), AudioFormat::Flac);
        assert_eq!("best".parse::<AudioQuality>().unwrap(), AudioQuality::Best);
        assert!("64".parse::<AudioQuality>().is_err());
    }

    #[test]
    fn video_info_falls_back_to_uploader() {
        let info = video_info_from(YtDlpInfo {
            title: Some("Relaxing Piano".to_string()),
            uploader: Some("Piano Channel".to_string()),
            duration: Some(61.5),
            ..YtDlpInfo::default()
        });
        assert_eq!(info.artist, "Piano Channel");
        assert_eq!(info.title, "Relaxing Piano");
        assert_eq!(info.duration_ms(), Some(61_500));

        let parsed = video_info_from(YtDlpInfo {
            title: Some("Daft Punk - Around the World".to_string()),
            ..YtDlpInfo::default()
        });
        assert_eq!(parsed.artist, "Daft Punk");
        assert_eq!(parsed.title, "Around the World");
    }

    #[test]
    fn downloads_catalog_under_youtube_album() {
        let info = video_info_from(YtDlpInfo {
            title: Some("Muse - Uprising".to_string()),
            duration: Some(300.0),
            ..YtDlpInfo::default()
        });
        let record = info.catalog_record(Path::new("/music/Muse - Uprising.mp3"));

        assert_eq!(record.album, DOWNLOAD_ALBUM);
        assert_eq!(record.genre.as_deref(), Some(DOWNLOAD_GENRE));
        assert_eq!(record.duration_ms, 300_000);
        assert_eq!(record.id, generate_id("/music/Muse - Uprising.mp3"));
        assert_eq!(record.album_id, generate_id("Muse-YouTube Downloads"));
    }

    #[test]
    fn playlist_entries_resolve_urls() {
        let by_id = YtDlpEntry {
            id: Some("abc".to_string()),
            url: Some("abc".to_string()),
            title: None,
        };
        assert_eq!(by_id.video_url().as_deref(), Some("https://www.youtube.com/watch?v=abc"));

        let by_url = YtDlpEntry {
            id: None,
            url: Some("https://youtu.be/xyz".to_string()),
            title: None,
        };
        assert_eq!(by_url.video_url().as_deref(), Some("https://youtu.be/xyz"));
    }
}
