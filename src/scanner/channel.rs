/// Substrings that mark an uploader or label rather than a performer
pub const CHANNEL_KEYWORDS: [&str; 9] = [
    "music",
    "official",
    "vevo",
    "records",
    "entertainment",
    "media",
    "channel",
    "video",
    "lyrics",
];

/// Whether a tag-derived artist looks like a channel name.
pub fn looks_like_channel_name(artist: &str) -> bool {
    let artist = artist.trim();
    if artist.is_empty() {
        return false;
    }

    let lowered = artist.to_lowercase();
    CHANNEL_KEYWORDS
        .iter()
        .any(|keyword| lowered.contains(keyword))
}

/// Pick the artist for a track given its tag and filename guesses.
///
/// A channel-like tag artist gives way to the filename artist when there is
/// one; otherwise the tag artist is kept.
pub fn resolve_artist(tag_artist: Option<&str>, filename_artist: Option<&str>) -> Option<String> {
    match (tag_artist, filename_artist) {
        (Some(tag), Some(parsed)) if looks_like_channel_name(tag) => {
            tracing::info!("Using filename artist '{}' over channel name '{}'", parsed, tag);
            Some(parsed.to_string())
        }
        (Some(tag), _) => Some(tag.to_string()),
        (None, parsed) => parsed.map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_match_anywhere_ignoring_case() {
        assert!(looks_like_channel_name("Some Channel Music"));
        assert!(looks_like_channel_name("ArtistVEVO"));
        assert!(looks_like_channel_name("Big Beat Records"));
        assert!(!looks_like_channel_name("Radiohead"));
        assert!(!looks_like_channel_name("   "));
    }

    #[test]
    fn channel_artist_is_overridden_by_filename() {
        assert_eq!(
            resolve_artist(Some("Some Channel Music"), Some("Some Channel Music")).as_deref(),
            Some("Some Channel Music")
        );
        assert_eq!(
            resolve_artist(Some("LabelVEVO"), Some("Real Artist")).as_deref(),
            Some("Real Artist")
        );
    }

    #[test]
    fn channel_artist_kept_without_filename_guess() {
        assert_eq!(
            resolve_artist(Some("Official Uploads"), None).as_deref(),
            Some("Official Uploads")
        );
    }

    #[test]
    fn filename_fills_missing_tag() {
        assert_eq!(resolve_artist(None, Some("Band")).as_deref(), Some("Band"));
        assert_eq!(resolve_artist(None, None), None);
        assert_eq!(resolve_artist(Some("Band"), Some("Other")).as_deref(), Some("Band"));
    }
}
