//! Plain-text lyrics lookup through lyrics.ovh.

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;

pub const LYRICS_OVH_URL: &str = "https://api.lyrics.ovh/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

static PARENTHESIZED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\(.*?\)\s*").expect("valid regex"));
static BRACKETED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\[.*?\]\s*").expect("valid regex"));
static STRUCTURAL_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\[(Verse|Chorus|Bridge|Intro|Outro|Pre-Chorus|Hook|Interlude|Break|Breakdown|Fade|Refrain|Coda|Instrumental|Rap|Ad-Lib)",
    )
    .expect("valid regex")
});
static TIMESTAMP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[\d{2}:\d{2}").expect("valid regex"));

#[derive(Debug, Deserialize)]
struct LyricsOvhResponse {
    lyrics: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LyricsClient {
    client: reqwest::Client,
    base_url: String,
}

impl LyricsClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(LYRICS_OVH_URL)
    }

    /// Client against a different lyrics.ovh-compatible endpoint
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Look up lyrics for a track, with structural section tags removed.
    ///
    /// Any network or decoding failure is logged and reported as `None`.
    pub async fn fetch(&self, artist: &str, title: &str) -> Option<String> {
        let artist = clean_query_part(artist, false);
        let title = clean_query_part(title, true);
        if artist.is_empty() || title.is_empty() {
            return None;
        }

        match self.request(&artist, &title).await {
            Ok(Some(lyrics)) if !lyrics.trim().is_empty() => Some(clean_structural_tags(&lyrics)),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!("Lyrics lookup failed for {} - {}: {:#}", artist, title, e);
                None
            }
        }
    }

    async fn request(&self, artist: &str, title: &str) -> Result<Option<String>> {
        let mut url = reqwest::Url::parse(&self.base_url).context("Invalid lyrics base URL")?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Lyrics base URL cannot take a path"))?
            .push(artist)
            .push(title);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Lyrics request failed")?;

        if !response.status().is_success() {
            tracing::debug!("No lyrics for {} - {} ({})", artist, title, response.status());
            return Ok(None);
        }

        let body: LyricsOvhResponse = response
            .json()
            .await
            .context("Failed to decode lyrics response")?;
        Ok(body.lyrics)
    }
}

/// Drop `(...)` groups, and `[...]` groups when `brackets` is set
fn clean_query_part(value: &str, brackets: bool) -> String {
    let mut cleaned = PARENTHESIZED.replace_all(value, " ").into_owned();
    if brackets {
        cleaned = BRACKETED.replace_all(&cleaned, " ").into_owned();
    }
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Remove section markers such as `[Verse 1]` or `[Chorus]`.
///
/// Timestamped lines (`[00:12.34] ...`) are kept, and runs of blank lines
/// collapse into one.
pub fn clean_structural_tags(lyrics: &str) -> String {
    let mut result: Vec<&str> = Vec::new();
    let mut previous_blank = false;

    for line in lyrics.split('\n') {
        let stripped = line.trim();

        if stripped.is_empty() {
            if !previous_blank {
                result.push("");
            }
            previous_blank = true;
            continue;
        }

        if STRUCTURAL_TAG.is_match(stripped) && !TIMESTAMP.is_match(stripped) {
            tracing::trace!("Dropping structural tag: {}", stripped);
            continue;
        }

        result.push(line);
        previous_blank = false;
    }

    result.join("\n")
}
