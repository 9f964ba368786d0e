//! Offline audio enhancement through ffmpeg filter chains.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::scanner::ENHANCED_MARKER;

const ENHANCE_TIMEOUT: Duration = Duration::from_secs(300);
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const VERSION_TIMEOUT: Duration = Duration::from_secs(5);

/// ffmpeg runs roughly this many times faster than real time
const REALTIME_FACTOR: f64 = 15.0;
const DEFAULT_ESTIMATE_SECS: f64 = 10.0;

pub const DEFAULT_BITRATE: &str = "320k";
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnhancementPreset {
    /// Wide soundstage with extra bass and clear highs
    #[default]
    Atmos,
    BassBoost,
    Clarity,
    Balanced,
    Custom,
}

impl EnhancementPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnhancementPreset::Atmos => "atmos",
            EnhancementPreset::BassBoost => "bass_boost",
            EnhancementPreset::Clarity => "clarity",
            EnhancementPreset::Balanced => "balanced",
            EnhancementPreset::Custom => "custom",
        }
    }

    /// The `-af` filter chain for this preset
    pub fn filter_chain(&self) -> &'static str {
        match self {
            EnhancementPreset::Atmos => concat!(
                "bass=g=6:f=100:w=0.5,",
                "equalizer=f=250:width_type=h:width=200:g=3,",
                "equalizer=f=2500:width_type=h:width=1000:g=4,",
                "treble=g=3:f=8000,",
                "extrastereo=m=2.5,",
                "asubboost=cutoff=60:slope=1:delay=10,",
                "compand=attacks=0.3:decays=0.8:points=-80/-80|-45/-45|-27/-25|0/-7|20/-7,",
                "loudnorm=I=-16:TP=-1.5:LRA=11",
            ),
            EnhancementPreset::BassBoost => concat!(
                "bass=g=8:f=80:w=0.6,",
                "asubboost=cutoff=50:slope=1.5:delay=15,",
                "equalizer=f=150:width_type=h:width=100:g=5,",
                "compand=attacks=0.2:decays=0.6:points=-80/-80|-45/-45|-20/-15|0/-5|20/-5,",
                "loudnorm=I=-14:TP=-1:LRA=7",
            ),
            EnhancementPreset::Clarity => concat!(
                "equalizer=f=200:width_type=h:width=150:g=-2,",
                "equalizer=f=1000:width_type=h:width=800:g=3,",
                "equalizer=f=3000:width_type=h:width=1500:g=5,",
                "equalizer=f=8000:width_type=h:width=3000:g=2,",
                "compand=attacks=0.4:decays=1.0:points=-80/-80|-45/-45|-30/-28|0/-8|20/-8,",
                "loudnorm=I=-16:TP=-1.5:LRA=12",
            ),
            EnhancementPreset::Balanced => concat!(
                "bass=g=4:f=100,",
                "equalizer=f=2500:width_type=h:width=1000:g=2,",
                "treble=g=2:f=8000,",
                "extrastereo=m=1.5,",
                "compand=attacks=0.5:decays=1.0:points=-80/-80|-45/-45|-30/-27|0/-10|20/-10,",
                "loudnorm=I=-16:TP=-1.5:LRA=13",
            ),
            EnhancementPreset::Custom => concat!(
                "bass=g=5:f=100,",
                "treble=g=2:f=8000,",
                "extrastereo=m=2,",
                "loudnorm=I=-16:TP=-1.5:LRA=11",
            ),
        }
    }
}

impl std::fmt::Display for EnhancementPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EnhancementPreset {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "atmos" => Ok(EnhancementPreset::Atmos),
            "bass_boost" => Ok(EnhancementPreset::BassBoost),
            "clarity" => Ok(EnhancementPreset::Clarity),
            "balanced" => Ok(EnhancementPreset::Balanced),
            "custom" => Ok(EnhancementPreset::Custom),
            other => anyhow::bail!("Unknown enhancement preset: {}", other),
        }
    }
}

/// Where the enhanced variant of `original` is written.
///
/// The name carries the scanner's enhanced marker, so a rescan links it back
/// to the original.
pub fn enhanced_path_for(original: &Path) -> PathBuf {
    let stem = original
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match original.extension() {
        Some(ext) => format!("{}{}.{}", stem, ENHANCED_MARKER, ext.to_string_lossy()),
        None => format!("{}{}", stem, ENHANCED_MARKER),
    };
    original.with_file_name(file_name)
}

#[derive(Debug, Clone)]
pub struct AudioEnhancer {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl AudioEnhancer {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Whether `ffmpeg -version` runs successfully
    pub async fn verify_ffmpeg(&self) -> bool {
        let status = Command::new(&self.ffmpeg)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        match tokio::time::timeout(VERSION_TIMEOUT, status).await {
            Ok(Ok(status)) if status.success() => {
                tracing::info!("FFmpeg is available");
                true
            }
            Ok(Ok(status)) => {
                tracing::error!("FFmpeg check exited with {}", status);
                false
            }
            Ok(Err(e)) => {
                tracing::error!("FFmpeg not found: {}", e);
                false
            }
            Err(_) => {
                tracing::error!("FFmpeg check timed out");
                false
            }
        }
    }

    /// Render `input` through the preset's filter chain into `output`
    pub async fn enhance(
        &self,
        input: &Path,
        output: &Path,
        preset: EnhancementPreset,
        bitrate: &str,
        sample_rate: u32,
    ) -> Result<()> {
        if !input.exists() {
            anyhow::bail!("Input file not found: {}", input.display());
        }

        tracing::info!(
            "Enhancing audio: {} -> {} (preset: {})",
            input.display(),
            output.display(),
            preset
        );

        let run = Command::new(&self.ffmpeg)
            .arg("-i")
            .arg(input)
            .args(["-af", preset.filter_chain()])
            .args(["-ar", &sample_rate.to_string()])
            .args(["-b:a", bitrate])
            .arg("-y")
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let result = tokio::time::timeout(ENHANCE_TIMEOUT, run)
            .await
            .map_err(|_| anyhow::anyhow!("Enhancement timed out for {}", input.display()))?
            .context("Failed to run ffmpeg")?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            tracing::error!("FFmpeg failed: {}", stderr);
            anyhow::bail!("ffmpeg exited with {}", result.status);
        }

        tracing::info!("Enhancement successful: {}", output.display());
        Ok(())
    }

    /// ffprobe's JSON description of a media file
    pub async fn probe(&self, path: &Path) -> Result<serde_json::Value> {
        let run = Command::new(&self.ffprobe)
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(PROBE_TIMEOUT, run)
            .await
            .map_err(|_| anyhow::anyhow!("ffprobe timed out for {}", path.display()))?
            .context("Failed to run ffprobe")?;

        if !output.status.success() {
            anyhow::bail!("ffprobe exited with {}", output.status);
        }

        serde_json::from_slice(&output.stdout).context("Failed to parse ffprobe output")
    }

    /// Rough processing time in seconds for enhancing `path`
    pub async fn estimate_processing_time(&self, path: &Path) -> f64 {
        match self.probe(path).await {
            Ok(info) => estimate_from_probe(&info),
            Err(e) => {
                tracing::debug!("Probe failed for {}: {:#}", path.display(), e);
                DEFAULT_ESTIMATE_SECS
            }
        }
    }
}

fn estimate_from_probe(info: &serde_json::Value) -> f64 {
    info.get("format")
        .and_then(|format| format.get("duration"))
        .and_then(|duration| match duration {
            serde_json::Value::String(s) => s.parse::<f64>().ok(),
            other => other.as_f64(),
        })
        .map(|secs| secs / REALTIME_FACTOR)
        .unwrap_or(DEFAULT_ESTIMATE_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn preset_names_round_trip() {
        for preset in [
            EnhancementPreset::Atmos,
            EnhancementPreset::BassBoost,
            EnhancementPreset::Clarity,
            EnhancementPreset::Balanced,
            EnhancementPreset::Custom,
        ] {
            assert_eq!(preset.as_str().parse::<EnhancementPreset>().unwrap(), preset);
            assert!(preset.filter_chain().contains("loudnorm"));
        }
        assert!("dolby".parse::<EnhancementPreset>().is_err());
    }

    #[test]
    fn enhanced_file_sits_next_to_original() {
        assert_eq!(
            enhanced_path_for(Path::new("/music/a/song.flac")),
            PathBuf::from("/music/a/song_enhanced.flac")
        );
        assert_eq!(
            enhanced_path_for(Path::new("/music/raw")),
            PathBuf::from("/music/raw_enhanced")
        );
    }

    #[test]
    fn estimate_uses_probe_duration() {
        assert_eq!(estimate_from_probe(&json!({"format": {"duration": "150.0"}})), 10.0);
        assert_eq!(estimate_from_probe(&json!({"format": {"duration": 30.0}})), 2.0);
        assert_eq!(estimate_from_probe(&json!({"format": {}})), DEFAULT_ESTIMATE_SECS);
    }

    #[tokio::test]
    async fn missing_binary_fails_verification() {
        let enhancer = AudioEnhancer::new("/nonexistent/ffmpeg", "/nonexistent/ffprobe");
        assert!(!enhancer.verify_ffmpeg().await);
        assert_eq!(
            enhancer.estimate_processing_time(Path::new("/nonexistent/a.mp3")).await,
            DEFAULT_ESTIMATE_SECS
        );
    }

    #[tokio::test]
    async fn missing_input_is_rejected() {
        let enhancer = AudioEnhancer::new("ffmpeg", "ffprobe");
        let err = enhancer
            .enhance(
                Path::new("/nonexistent/in.mp3"),
                Path::new("/nonexistent/out.mp3"),
                EnhancementPreset::Balanced,
                DEFAULT_BITRATE,
                DEFAULT_SAMPLE_RATE,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Input file not found"));
    }
}
