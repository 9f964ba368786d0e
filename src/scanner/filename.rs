//! Artist/title guessing from filenames and video titles.

use regex::Regex;
use std::sync::LazyLock;

/// Noise commonly appended to downloaded track names
const NOISE_PHRASES: [&str; 11] = [
    "(Official Video)",
    "(Official Music Video)",
    "(Lyrics)",
    "(Official Audio)",
    "(Audio)",
    "[Official Video]",
    "[Lyrics]",
    "(Lyric Video)",
    "(Music Video)",
    "Official Video",
    "Lyrics",
];

/// Most artist names are one to three words
const MAX_ARTIST_WORDS: usize = 3;

static NOISE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    NOISE_PHRASES
        .iter()
        .map(|phrase| Regex::new(&format!("(?i){}", regex::escape(phrase))).expect("valid regex"))
        .collect()
});

static VIDEO_TITLE_PATTERNS: LazyLock<[Regex; 4]> = LazyLock::new(|| {
    [
        Regex::new(r"(?i)^(.+?)\s*-\s*(.+)$").expect("valid regex"),
        Regex::new(r"(?i)^(.+?)\s*:\s*(.+)$").expect("valid regex"),
        Regex::new(r"(?i)^(.+?)\s*\|\s*(.+)$").expect("valid regex"),
        Regex::new(r"(?i)^(.+)\s+by\s+(.+)$").expect("valid regex"),
    ]
});

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedName {
    pub artist: Option<String>,
    pub title: Option<String>,
}

/// Strip the known noise phrases from a filename stem.
pub fn strip_noise(stem: &str) -> String {
    let mut clean = stem.to_string();
    for pattern in NOISE_PATTERNS.iter() {
        clean = pattern.replacen(&clean, 1, "").into_owned();
    }
    clean.trim().to_string()
}

/// Guess `{artist, title}` from a filename stem of the form `Artist - Title`.
pub fn parse_filename(stem: &str) -> ParsedName {
    let clean = strip_noise(stem);

    let Some((left, right)) = clean.split_once(" - ") else {
        return ParsedName::default();
    };
    let (left, right) = (left.trim(), right.trim());

    let left_words = left.split_whitespace().count();
    let right_words = right.split_whitespace().count();
    if left_words <= MAX_ARTIST_WORDS && left_words < right_words {
        tracing::trace!("'{}' reads as a short artist name", left);
    }

    // Both word-count outcomes resolve to the conventional "Artist - Title"
    ParsedName {
        artist: Some(left.to_string()),
        title: Some(right.to_string()),
    }
}

/// Guess `{artist, title}` from a video title.
///
/// Accepts `Artist - Title`, `Artist: Title`, `Artist | Title` and
/// `Title by Artist`.
pub fn parse_video_title(video_title: &str) -> ParsedName {
    for (i, pattern) in VIDEO_TITLE_PATTERNS.iter().enumerate() {
        if let Some(caps) = pattern.captures(video_title) {
            let first = caps[1].trim().to_string();
            let second = caps[2].trim().to_string();
            return if i == 3 {
                ParsedName {
                    artist: Some(second),
                    title: Some(first),
                }
            } else {
                ParsedName {
                    artist: Some(first),
                    title: Some(second),
                }
            };
        }
    }

    ParsedName {
        artist: None,
        title: Some(video_title.trim().to_string()),
    }
}
