//! Tag reading for the scanner.
//!
//! Wraps the per-format handlers from [`crate::audio`] so that unreadable or
//! unsupported files come back as `None` instead of an error.

use std::collections::HashMap;
use std::path::Path;

use crate::audio;

/// Tags and duration read from a single audio file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagReading {
    pub tags: HashMap<String, String>,
    pub duration_secs: Option<f64>,
}

impl TagReading {
    /// Tag value for a normalized key, `None` when absent or blank
    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_secs
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(|secs| (secs * 1000.0) as u64)
            .unwrap_or(0)
    }

    /// Track number from the `tracknumber` tag, handling the `N/M` form
    pub fn track_number(&self) -> Option<u32> {
        self.get("tracknumber").and_then(parse_track_number)
    }

    /// Year from the first four characters of the `date` tag
    pub fn year(&self) -> Option<i32> {
        self.get("date").and_then(parse_year)
    }
}

/// Read tags from `path`.
///
/// Returns `None` when the extension is unsupported or the container cannot
/// be opened or probed.
pub fn read_tags(path: &Path) -> Option<TagReading> {
    let extension = path.extension()?.to_str()?;
    let handler = audio::get_audio_file_handler(extension)?;

    match handler.read_tags(path) {
        Ok(raw) => Some(TagReading {
            tags: raw.tags,
            duration_secs: raw.duration_secs,
        }),
        Err(e) => {
            tracing::debug!("No metadata for {}: {:#}", path.display(), e);
            None
        }
    }
}

pub fn parse_track_number(value: &str) -> Option<u32> {
    value.split('/').next()?.trim().parse().ok()
}

pub fn parse_year(value: &str) -> Option<i32> {
    let head: String = value.trim().chars().take(4).collect();
    head.parse().ok()
}
