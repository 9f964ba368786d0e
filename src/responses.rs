//! Spotify-shaped JSON views over catalog rows.

use serde::Serialize;

use crate::catalog::{Album, Artist, Track};
use crate::playlist::Playlist;

pub const IMAGE_SIZE: u32 = 640;
pub const PLAYLIST_PLACEHOLDER: &str = "/images/playlist.png";
pub const ARTIST_PLACEHOLDER: &str = "/images/artist.png";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Image {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtistRef {
    pub id: String,
    pub name: String,
    pub uri: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlbumRef {
    pub id: String,
    pub name: String,
    pub images: Vec<Image>,
    pub uri: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackResponse {
    pub id: String,
    pub name: String,
    pub duration_ms: i64,
    pub track_number: Option<i64>,
    pub artists: Vec<ArtistRef>,
    pub album: AlbumRef,
    pub is_saved: bool,
    pub uri: String,
    pub file_path: String,
    pub lyrics: Option<String>,
    pub has_enhanced_version: bool,
    pub enhanced_file_path: Option<String>,
    pub enhancement_preset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub animated_cover_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlbumResponse {
    pub id: String,
    pub name: String,
    pub artists: Vec<ArtistRef>,
    pub release_date: Option<String>,
    pub total_tracks: i64,
    pub images: Vec<Image>,
    pub is_saved: bool,
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracks: Option<Vec<TrackResponse>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Followers {
    pub total: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtistResponse {
    pub id: String,
    pub name: String,
    pub images: Vec<Image>,
    pub followers: Followers,
    pub genres: Vec<String>,
    pub uri: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Owner {
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaylistItem {
    pub track: TrackResponse,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaylistTracks {
    pub total: usize,
    pub items: Vec<PlaylistItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaylistResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub images: Vec<Image>,
    pub owner: Owner,
    pub public: bool,
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracks: Option<PlaylistTracks>,
}

/// Builds response bodies with absolute image URLs
#[derive(Debug, Clone)]
pub struct Presenter {
    public_url: String,
}

impl Presenter {
    pub fn new(public_url: impl Into<String>) -> Self {
        Self {
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn public_url(&self) -> &str {
        &self.public_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.public_url, path)
    }

    fn square_image(&self, path: Option<&str>, placeholder: &str) -> Vec<Image> {
        vec![Image {
            url: self.url(path.unwrap_or(placeholder)),
            height: Some(IMAGE_SIZE),
            width: Some(IMAGE_SIZE),
        }]
    }

    fn artist_ref(id: &str, name: &str) -> ArtistRef {
        ArtistRef {
            id: id.to_string(),
            name: name.to_string(),
            uri: format!("local:artist:{}", id),
        }
    }

    pub fn track(&self, track: &Track) -> TrackResponse {
        TrackResponse {
            id: track.id.clone(),
            name: track.title.clone(),
            duration_ms: track.duration_ms,
            track_number: track.track_number,
            artists: vec![Self::artist_ref(&track.artist_id, &track.artist)],
            album: AlbumRef {
                id: track.album_id.clone(),
                name: track.album.clone(),
                images: self.square_image(track.image_path.as_deref(), PLAYLIST_PLACEHOLDER),
                uri: format!("local:album:{}", track.album_id),
            },
            is_saved: track.is_saved,
            uri: format!("local:track:{}", track.id),
            file_path: track.file_path.clone(),
            lyrics: track.lyrics.clone(),
            has_enhanced_version: track.has_enhanced_version,
            enhanced_file_path: track.enhanced_file_path.clone(),
            enhancement_preset: track.enhancement_preset.clone(),
            cover_url: None,
            animated_cover_url: None,
        }
    }

    pub fn tracks(&self, tracks: &[Track]) -> Vec<TrackResponse> {
        tracks.iter().map(|t| self.track(t)).collect()
    }

    pub fn album(&self, album: &Album, tracks: Option<&[Track]>) -> AlbumResponse {
        AlbumResponse {
            id: album.id.clone(),
            name: album.name.clone(),
            artists: vec![Self::artist_ref(&album.artist_id, &album.artist)],
            release_date: album.year.map(|y| y.to_string()),
            total_tracks: album.total_tracks,
            images: self.square_image(album.image_path.as_deref(), PLAYLIST_PLACEHOLDER),
            is_saved: album.is_saved,
            uri: format!("local:album:{}", album.id),
            tracks: tracks.map(|t| self.tracks(t)),
        }
    }

    pub fn albums(&self, albums: &[Album]) -> Vec<AlbumResponse> {
        albums.iter().map(|a| self.album(a, None)).collect()
    }

    pub fn artist(&self, artist: &Artist) -> ArtistResponse {
        ArtistResponse {
            id: artist.id.clone(),
            name: artist.name.clone(),
            images: self.square_image(artist.image_path.as_deref(), ARTIST_PLACEHOLDER),
            followers: Followers { total: 0 },
            genres: Vec::new(),
            uri: format!("local:artist:{}", artist.id),
        }
    }

    pub fn artists(&self, artists: &[Artist]) -> Vec<ArtistResponse> {
        artists.iter().map(|a| self.artist(a)).collect()
    }

    /// Playlist body, with its resolved tracks when given
    pub fn playlist(&self, playlist: &Playlist, tracks: Option<&[Track]>) -> PlaylistResponse {
        PlaylistResponse {
            id: playlist.id.clone(),
            name: playlist.name.clone(),
            description: playlist.description.clone(),
            images: vec![Image {
                url: self.url(PLAYLIST_PLACEHOLDER),
                height: None,
                width: None,
            }],
            owner: Owner {
                display_name: "You".to_string(),
            },
            public: true,
            uri: format!("local:playlist:{}", playlist.id),
            tracks: tracks.map(|tracks| self.playlist_tracks(tracks)),
        }
    }

    pub fn playlist_tracks(&self, tracks: &[Track]) -> PlaylistTracks {
        PlaylistTracks {
            total: tracks.len(),
            items: tracks
                .iter()
                .map(|t| PlaylistItem { track: self.track(t) })
                .collect(),
        }
    }
}
