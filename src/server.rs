use axum::{
    Json, Router,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::audio;
use crate::catalog::{Album, CatalogDatabase, CatalogStore, LibraryStats, Track};
use crate::downloader::{AudioFormat, AudioQuality, YouTubeDownloader};
use crate::enhancer::{
    AudioEnhancer, DEFAULT_BITRATE, DEFAULT_SAMPLE_RATE, EnhancementPreset, enhanced_path_for,
};
use crate::playlist::{PlaylistCreate, PlaylistDatabase, PlaylistUpdate};
use crate::responses::{
    AlbumResponse, ArtistResponse, PlaylistResponse, PlaylistTracks, Presenter, TrackResponse,
};
use crate::scanner::MusicScanner;

const COVER_FILE: &str = "cover.jpg";
const ANIMATED_COVER_FILE: &str = "animated_cover.mp4";
const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

#[derive(Clone)]
pub struct AppState {
    pub catalog: CatalogDatabase,
    pub playlists: PlaylistDatabase,
    pub scanner: Arc<MusicScanner>,
    pub enhancer: AudioEnhancer,
    pub downloader: YouTubeDownloader,
    pub presenter: Presenter,
    pub library_root: PathBuf,
}

/// Error body returned by every handler: `{"detail": "..."}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, detail)
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    /// Log `err` and hide it behind a generic 500
    pub fn internal(detail: &str, err: anyhow::Error) -> Self {
        tracing::error!("{}: {:#}", detail, err);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, detail)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub fn create_router(state: AppState, images_dir: Option<&FsPath>) -> Router {
    let covers = ServeDir::new(state.scanner.covers_dir());

    let mut router = Router::new()
        .route("/", get(root))
        // Tracks
        .route("/tracks", get(list_tracks))
        .route("/tracks/:id", get(get_track))
        .route("/tracks/:id/stream", get(stream_track))
        .route("/tracks/:id/stream/enhanced", get(stream_enhanced_track))
        .route("/tracks/:id/cover", get(get_track_cover))
        .route("/tracks/:id/animated-cover", get(get_animated_cover))
        .route("/tracks/:id/lyrics", put(update_lyrics))
        .route("/tracks/:id/play", post(record_play))
        // Enhancement
        .route("/tracks/:id/enhance", post(enhance_track))
        .route("/tracks/:id/enhanced", delete(delete_enhanced))
        .route("/tracks/:id/versions", get(get_versions))
        .route("/enhance-batch", post(enhance_batch))
        // Albums and artists
        .route("/albums", get(list_albums))
        .route("/albums/:id", get(get_album))
        .route("/albums/:id/tracks", get(get_album_tracks))
        .route("/artists", get(list_artists))
        .route("/artists/:id", get(get_artist))
        .route("/artists/:id/albums", get(get_artist_albums))
        .route("/artists/:id/tracks", get(get_artist_tracks))
        // Playlists
        .route("/playlists", get(list_playlists).post(create_playlist))
        .route(
            "/playlists/:id",
            get(get_playlist).put(update_playlist).delete(delete_playlist),
        )
        .route(
            "/playlists/:id/tracks",
            get(get_playlist_tracks).post(add_track_to_playlist),
        )
        .route(
            "/playlists/:id/tracks/:track_id",
            delete(remove_track_from_playlist),
        )
        .route("/search", get(search))
        // Library
        .route("/library/tracks", get(list_saved_tracks))
        .route("/library/tracks/:id", put(save_track).delete(unsave_track))
        .route("/library/albums", get(list_saved_albums))
        .route("/library/albums/:id", put(save_album).delete(unsave_album))
        .route(
            "/me/tracks",
            get(my_tracks).put(save_my_tracks).delete(remove_my_tracks),
        )
        .route("/me/tracks/contains", get(contains_my_tracks))
        .route(
            "/me/albums",
            get(my_albums).put(save_my_albums).delete(remove_my_albums),
        )
        .route("/me/playlists", get(my_playlists))
        .route("/me/top/tracks", get(top_tracks))
        .route("/me/top/artists", get(top_artists))
        .route("/browse/new-releases", get(new_releases))
        .route("/browse/featured-playlists", get(featured_playlists))
        // Other
        .route("/recommendations", get(recommendations))
        .route("/admin/rescan", post(rescan_library))
        .route("/admin/stats", get(get_stats))
        .route("/download/youtube/info", post(youtube_info))
        .route("/download/youtube", post(download_youtube))
        .route("/download/youtube/playlist", post(download_youtube_playlist))
        .nest_service("/covers", covers);

    if let Some(images_dir) = images_dir {
        router = router.nest_service("/images", ServeDir::new(images_dir));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "Personal Music Player API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn message(text: impl Into<String>) -> Json<Value> {
    Json(json!({ "message": text.into() }))
}

#[derive(Debug, Deserialize)]
struct PageParams {
    limit: Option<i64>,
    offset: Option<i64>,
    search: Option<String>,
}

impl PageParams {
    fn validate(&self) -> ApiResult<(i64, i64)> {
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(ApiError::bad_request(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        let offset = self.offset.unwrap_or(0);
        if offset < 0 {
            return Err(ApiError::bad_request("offset must be non-negative"));
        }
        Ok((limit, offset))
    }
}

#[derive(Debug, Deserialize)]
struct LimitParams {
    limit: Option<i64>,
}

impl LimitParams {
    fn or(&self, default: i64) -> i64 {
        self.limit.unwrap_or(default).clamp(1, MAX_PAGE_SIZE)
    }
}

async fn require_track(state: &AppState, id: &str) -> ApiResult<Track> {
    state
        .catalog
        .get_track(id)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch track", e))?
        .ok_or_else(|| ApiError::not_found("Track not found"))
}

// ========== TRACK ENDPOINTS ==========

async fn list_tracks(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> ApiResult<Json<Vec<TrackResponse>>> {
    let (limit, offset) = params.validate()?;
    let tracks = state
        .catalog
        .get_tracks(limit, offset, params.search.as_deref(), true)
        .await
        .map_err(|e| ApiError::internal("Failed to list tracks", e))?;
    Ok(Json(state.presenter.tracks(&tracks)))
}

async fn get_track(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TrackResponse>> {
    let track = require_track(&state, &id).await?;
    let mut body = state.presenter.track(&track);

    let file_path = FsPath::new(&track.file_path);
    if let Some(folder) = file_path.parent().filter(|_| file_path.exists()) {
        if folder.join(COVER_FILE).exists() {
            body.cover_url = Some(state.presenter.url(&format!("/tracks/{}/cover", id)));
        }
        if folder.join(ANIMATED_COVER_FILE).exists() {
            body.animated_cover_url =
                Some(state.presenter.url(&format!("/tracks/{}/animated-cover", id)));
        }
    }

    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
struct StreamParams {
    quality: Option<String>,
}

async fn stream_track(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<StreamParams>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let enhanced = match params.quality.as_deref().unwrap_or("standard") {
        "standard" => false,
        "enhanced" => true,
        other => {
            return Err(ApiError::bad_request(format!(
                "Invalid quality '{}', expected standard or enhanced",
                other
            )));
        }
    };
    stream_version(&state, &id, enhanced, &headers).await
}

async fn stream_enhanced_track(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    stream_version(&state, &id, true, &headers).await
}

async fn stream_version(
    state: &AppState,
    id: &str,
    enhanced: bool,
    headers: &HeaderMap,
) -> ApiResult<Response> {
    let track = require_track(state, id).await?;

    let path = if enhanced {
        match track.enhanced_file_path.as_deref() {
            Some(path) if track.has_enhanced_version => PathBuf::from(path),
            _ => return Err(ApiError::not_found("Enhanced version not available")),
        }
    } else {
        PathBuf::from(&track.file_path)
    };

    if !path.exists() {
        return Err(ApiError::not_found("Audio file not found"));
    }

    serve_audio(&path, headers, &track.id).await
}

/// Stream an audio file, honoring a single `Range` header
async fn serve_audio(path: &FsPath, headers: &HeaderMap, fallback_name: &str) -> ApiResult<Response> {
    let file_size = tokio::fs::metadata(path)
        .await
        .map_err(|e| ApiError::internal("Failed to read audio file", e.into()))?
        .len();
    let content_type = audio::content_type_for(path);

    if let Some((start, end)) = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok())
        .and_then(|range| parse_range(range, file_size))
    {
        return stream_range(path, start, end, file_size, content_type).await;
    }

    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| ApiError::internal("Failed to open audio file", e.into()))?;

    tracing::debug!("Streaming {} ({} bytes)", path.display(), file_size);

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_LENGTH, file_size.to_string()),
            (header::ACCEPT_RANGES, "bytes".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", safe_filename(path, fallback_name)),
            ),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

/// ASCII-only file name for `Content-Disposition`
fn safe_filename(path: &FsPath, fallback: &str) -> String {
    let stem: String = path
        .file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_control() && *c != '"' && *c != '\\')
        .collect();
    let stem = match stem.trim() {
        "" => fallback,
        trimmed => trimmed,
    };

    match path.extension() {
        Some(ext) => format!("{}.{}", stem, ext.to_string_lossy()),
        None => stem.to_string(),
    }
}

/// Parse a `Range` header into an inclusive byte span within `file_size`
fn parse_range(range_str: &str, file_size: u64) -> Option<(u64, u64)> {
    let range_part = range_str.strip_prefix("bytes=")?;
    let (start_str, end_str) = range_part.split_once('-')?;
    let (start_str, end_str) = (start_str.trim(), end_str.trim());

    match (start_str.is_empty(), end_str.is_empty()) {
        (false, false) => {
            let start = start_str.parse::<u64>().ok()?;
            let end = end_str.parse::<u64>().ok()?;
            if start > end || start >= file_size {
                return None;
            }
            Some((start, end.min(file_size - 1)))
        }
        (false, true) => {
            let start = start_str.parse::<u64>().ok()?;
            if start >= file_size {
                return None;
            }
            Some((start, file_size - 1))
        }
        (true, false) => {
            // Last N bytes
            let suffix_length = end_str.parse::<u64>().ok()?;
            if suffix_length == 0 || file_size == 0 {
                return None;
            }
            Some((file_size - suffix_length.min(file_size), file_size - 1))
        }
        (true, true) => None,
    }
}

async fn stream_range(
    path: &FsPath,
    start: u64,
    end: u64,
    total_size: u64,
    content_type: &str,
) -> ApiResult<Response> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| ApiError::internal("Failed to open audio file", e.into()))?;

    file.seek(std::io::SeekFrom::Start(start))
        .await
        .map_err(|e| ApiError::internal("Failed to seek audio file", e.into()))?;

    let range_length = end - start + 1;
    tracing::debug!(
        "Streaming range {}-{}/{} ({} bytes)",
        start,
        end,
        total_size,
        range_length
    );

    Ok((
        StatusCode::PARTIAL_CONTENT,
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_LENGTH, range_length.to_string()),
            (header::ACCEPT_RANGES, "bytes".to_string()),
            (
                header::CONTENT_RANGE,
                format!("bytes {}-{}/{}", start, end, total_size),
            ),
        ],
        Body::from_stream(ReaderStream::new(file.take(range_length))),
    )
        .into_response())
}

async fn serve_file(path: &FsPath, content_type: &str) -> ApiResult<Response> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| ApiError::internal("Failed to read file", e.into()))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CACHE_CONTROL, "public, max-age=31536000".to_string()),
        ],
        data,
    )
        .into_response())
}

/// Folder `cover.jpg` first, then the extracted album cover
async fn get_track_cover(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let track = require_track(&state, &id).await?;

    let folder_cover = FsPath::new(&track.file_path)
        .parent()
        .map(|folder| folder.join(COVER_FILE))
        .filter(|path| path.exists());

    let cover = folder_cover
        .or_else(|| {
            track
                .image_path
                .as_deref()
                .and_then(|url| url.rsplit('/').next())
                .map(|name| state.scanner.covers_dir().join(name))
                .filter(|path| path.exists())
        })
        .ok_or_else(|| ApiError::not_found("Cover image not found"))?;

    serve_file(&cover, "image/jpeg").await
}

async fn get_animated_cover(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let track = require_track(&state, &id).await?;

    let animated = FsPath::new(&track.file_path)
        .parent()
        .map(|folder| folder.join(ANIMATED_COVER_FILE))
        .filter(|path| path.exists())
        .ok_or_else(|| ApiError::not_found("Animated cover not found"))?;

    serve_file(&animated, "video/mp4").await
}

#[derive(Debug, Deserialize)]
struct LyricsBody {
    #[serde(default)]
    lyrics: String,
}

async fn update_lyrics(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<LyricsBody>,
) -> ApiResult<Json<Value>> {
    let updated = state
        .catalog
        .update_lyrics(&id, &body.lyrics)
        .await
        .map_err(|e| ApiError::internal("Failed to update lyrics", e))?;

    if !updated {
        return Err(ApiError::not_found("Track not found"));
    }
    Ok(message("Lyrics updated successfully"))
}

async fn record_play(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let play_count = state
        .catalog
        .increment_play_count(&id)
        .await
        .map_err(|e| ApiError::internal("Failed to record play", e))?
        .ok_or_else(|| ApiError::not_found("Track not found"))?;

    Ok(Json(json!({ "message": "Play recorded", "play_count": play_count })))
}

// ========== ENHANCEMENT ENDPOINTS ==========

#[derive(Debug, Deserialize)]
struct PresetParams {
    preset: Option<String>,
}

impl PresetParams {
    fn preset(&self) -> ApiResult<EnhancementPreset> {
        match self.preset.as_deref() {
            None => Ok(EnhancementPreset::default()),
            Some(name) => name
                .parse()
                .map_err(|e: anyhow::Error| ApiError::bad_request(e.to_string())),
        }
    }
}

async fn enhance_one(state: &AppState, id: &str, preset: EnhancementPreset) -> ApiResult<Value> {
    let track = require_track(state, id).await?;
    let original = PathBuf::from(&track.file_path);
    if !original.exists() {
        return Err(ApiError::not_found("Audio file not found"));
    }

    if let Some(existing) = track.enhanced_file_path.as_deref() {
        if track.enhancement_preset.as_deref() == Some(preset.as_str())
            && FsPath::new(existing).exists()
        {
            return Ok(json!({
                "message": "Enhanced version already exists",
                "preset": preset,
                "enhanced_file_path": existing,
                "original_file_path": track.file_path,
                "already_exists": true,
            }));
        }
    }

    let output = enhanced_path_for(&original);
    let estimate = state.enhancer.estimate_processing_time(&original).await;
    tracing::info!(
        "Enhancing '{}' with {} (about {:.1}s)",
        track.title,
        preset,
        estimate
    );

    state
        .enhancer
        .enhance(&original, &output, preset, DEFAULT_BITRATE, DEFAULT_SAMPLE_RATE)
        .await
        .map_err(|e| ApiError::internal("Audio enhancement failed", e))?;

    let output_str = output.to_string_lossy().into_owned();
    state
        .catalog
        .set_enhancement(id, &output_str, preset.as_str())
        .await
        .map_err(|e| ApiError::internal("Failed to record enhancement", e))?;

    Ok(json!({
        "message": "Track enhanced successfully",
        "preset": preset,
        "enhanced_file_path": output_str,
        "original_file_path": track.file_path,
        "already_exists": false,
        "estimated_seconds": estimate,
    }))
}

async fn enhance_track(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<PresetParams>,
) -> ApiResult<Json<Value>> {
    let preset = params.preset()?;
    enhance_one(&state, &id, preset).await.map(Json)
}

async fn enhance_batch(
    State(state): State<AppState>,
    Query(params): Query<PresetParams>,
    Json(track_ids): Json<Vec<String>>,
) -> ApiResult<Json<Value>> {
    let preset = params.preset()?;

    let mut results = Vec::with_capacity(track_ids.len());
    let mut successful = 0;
    for track_id in &track_ids {
        match enhance_one(&state, track_id, preset).await {
            Ok(result) => {
                successful += 1;
                results.push(json!({ "track_id": track_id, "success": true, "result": result }));
            }
            Err(e) => {
                results.push(json!({ "track_id": track_id, "success": false, "error": e.detail }));
            }
        }
    }

    Ok(Json(json!({
        "total": track_ids.len(),
        "successful": successful,
        "failed": track_ids.len() - successful,
        "results": results,
    })))
}

async fn delete_enhanced(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let track = require_track(&state, &id).await?;
    let enhanced = track
        .enhanced_file_path
        .ok_or_else(|| ApiError::not_found("No enhanced version found"))?;

    if let Err(e) = tokio::fs::remove_file(&enhanced).await {
        tracing::warn!("Failed to delete enhanced file {}: {}", enhanced, e);
    }

    state
        .catalog
        .clear_enhancement(&id)
        .await
        .map_err(|e| ApiError::internal("Failed to clear enhancement", e))?;

    Ok(message("Enhanced version deleted"))
}

async fn get_versions(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let track = require_track(&state, &id).await?;

    let mut body = json!({
        "original": {
            "file_path": track.file_path,
            "exists": FsPath::new(&track.file_path).exists(),
        }
    });

    if let (true, Some(enhanced)) = (track.has_enhanced_version, track.enhanced_file_path.as_deref()) {
        body["enhanced"] = json!({
            "file_path": enhanced,
            "exists": FsPath::new(enhanced).exists(),
            "preset": track.enhancement_preset,
            "created_at": track.enhanced_at,
        });
    }

    Ok(Json(body))
}

// ========== ALBUM / ARTIST ENDPOINTS ==========

async fn list_albums(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> ApiResult<Json<Vec<AlbumResponse>>> {
    let (limit, offset) = params.validate()?;
    let albums = state
        .catalog
        .get_albums(limit, offset, params.search.as_deref())
        .await
        .map_err(|e| ApiError::internal("Failed to list albums", e))?;
    Ok(Json(state.presenter.albums(&albums)))
}

async fn get_album(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<AlbumResponse>> {
    let album = state
        .catalog
        .get_album(&id)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch album", e))?
        .ok_or_else(|| ApiError::not_found("Album not found"))?;

    let tracks = state
        .catalog
        .get_album_tracks(&id)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch album tracks", e))?;

    Ok(Json(state.presenter.album(&album, Some(&tracks))))
}

async fn get_album_tracks(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<TrackResponse>>> {
    let tracks = state
        .catalog
        .get_album_tracks(&id)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch album tracks", e))?;
    Ok(Json(state.presenter.tracks(&tracks)))
}

async fn list_artists(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> ApiResult<Json<Vec<ArtistResponse>>> {
    let (limit, offset) = params.validate()?;
    let artists = state
        .catalog
        .get_artists(limit, offset, params.search.as_deref())
        .await
        .map_err(|e| ApiError::internal("Failed to list artists", e))?;
    Ok(Json(state.presenter.artists(&artists)))
}

async fn get_artist(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<ArtistResponse>> {
    let artist = state
        .catalog
        .get_artist(&id)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch artist", e))?
        .ok_or_else(|| ApiError::not_found("Artist not found"))?;
    Ok(Json(state.presenter.artist(&artist)))
}

async fn get_artist_albums(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<AlbumResponse>>> {
    let albums = state
        .catalog
        .get_artist_albums(&id)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch artist albums", e))?;
    Ok(Json(state.presenter.albums(&albums)))
}

async fn get_artist_tracks(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<LimitParams>,
) -> ApiResult<Json<Vec<TrackResponse>>> {
    let tracks = state
        .catalog
        .get_artist_tracks(&id, params.or(10))
        .await
        .map_err(|e| ApiError::internal("Failed to fetch artist tracks", e))?;
    Ok(Json(state.presenter.tracks(&tracks)))
}

// ========== PLAYLIST ENDPOINTS ==========

/// Resolve playlist track ids, dropping tracks no longer in the catalog
async fn resolve_tracks(state: &AppState, ids: &[String]) -> ApiResult<Vec<Track>> {
    let mut tracks = Vec::with_capacity(ids.len());
    for id in ids {
        let track = state
            .catalog
            .get_track(id)
            .await
            .map_err(|e| ApiError::internal("Failed to resolve playlist tracks", e))?;
        tracks.extend(track);
    }
    Ok(tracks)
}

async fn all_playlists(state: &AppState) -> ApiResult<Vec<PlaylistResponse>> {
    let playlists = state
        .playlists
        .get_playlists()
        .await
        .map_err(|e| ApiError::internal("Failed to list playlists", e))?;
    Ok(playlists
        .iter()
        .map(|playlist| state.presenter.playlist(playlist, None))
        .collect())
}

async fn list_playlists(State(state): State<AppState>) -> ApiResult<Json<Vec<PlaylistResponse>>> {
    all_playlists(&state).await.map(Json)
}

async fn playlist_with_tracks(state: &AppState, id: &str) -> ApiResult<PlaylistResponse> {
    let playlist = state
        .playlists
        .get_playlist(id)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch playlist", e))?
        .ok_or_else(|| ApiError::not_found("Playlist not found"))?;
    let tracks = resolve_tracks(state, &playlist.tracks).await?;
    Ok(state.presenter.playlist(&playlist, Some(&tracks)))
}

async fn get_playlist(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<PlaylistResponse>> {
    playlist_with_tracks(&state, &id).await.map(Json)
}

async fn create_playlist(
    State(state): State<AppState>,
    Query(create): Query<PlaylistCreate>,
) -> ApiResult<(StatusCode, Json<PlaylistResponse>)> {
    if create.name.trim().is_empty() {
        return Err(ApiError::bad_request("Playlist name must not be empty"));
    }

    let playlist = state
        .playlists
        .create_playlist(create)
        .await
        .map_err(|e| ApiError::internal("Failed to create playlist", e))?;

    Ok((
        StatusCode::CREATED,
        Json(state.presenter.playlist(&playlist, Some(&[]))),
    ))
}

async fn update_playlist(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(update): Query<PlaylistUpdate>,
) -> ApiResult<Json<Value>> {
    state
        .playlists
        .update_playlist(&id, update)
        .await
        .map_err(|e| ApiError::internal("Failed to update playlist", e))?
        .ok_or_else(|| ApiError::not_found("Playlist not found"))?;
    Ok(message("Playlist updated"))
}

async fn delete_playlist(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let deleted = state
        .playlists
        .delete_playlist(&id)
        .await
        .map_err(|e| ApiError::internal("Failed to delete playlist", e))?;

    if !deleted {
        return Err(ApiError::not_found("Playlist not found"));
    }
    Ok(message("Playlist deleted"))
}

async fn get_playlist_tracks(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<PlaylistTracks>> {
    let playlist = playlist_with_tracks(&state, &id).await?;
    Ok(Json(playlist.tracks.unwrap_or(PlaylistTracks {
        total: 0,
        items: Vec::new(),
    })))
}

#[derive(Debug, Deserialize)]
struct TrackIdParams {
    track_id: Option<String>,
}

async fn add_track_to_playlist(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<TrackIdParams>,
) -> ApiResult<Json<Value>> {
    let track_id = params
        .track_id
        .ok_or_else(|| ApiError::bad_request("track_id is required"))?;
    require_track(&state, &track_id)
        .await
        .map_err(|e| match e.status {
            StatusCode::NOT_FOUND => ApiError::not_found("Playlist or track not found"),
            _ => e,
        })?;

    state
        .playlists
        .add_track_to_playlist(&id, &track_id)
        .await
        .map_err(|e| ApiError::internal("Failed to add track to playlist", e))?
        .ok_or_else(|| ApiError::not_found("Playlist or track not found"))?;

    Ok(message("Track added to playlist"))
}

async fn remove_track_from_playlist(
    State(state): State<AppState>,
    Path((id, track_id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    state
        .playlists
        .remove_track_from_playlist(&id, &track_id)
        .await
        .map_err(|e| ApiError::internal("Failed to remove track from playlist", e))?
        .ok_or_else(|| ApiError::not_found("Playlist or track not found"))?;

    Ok(message("Track removed from playlist"))
}

// ========== SEARCH ==========

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: Option<String>,
    limit: Option<i64>,
}

async fn search(State(state): State<AppState>, Query(params): Query<SearchParams>) -> ApiResult<Json<Value>> {
    let query = params.q.as_deref().map(str::trim).unwrap_or_default();
    if query.chars().count() < 2 {
        return Err(ApiError::bad_request("Search query too short"));
    }
    let limit = params.limit.unwrap_or(20).clamp(1, MAX_PAGE_SIZE);

    let tracks = state
        .catalog
        .get_tracks(limit, 0, Some(query), true)
        .await
        .map_err(|e| ApiError::internal("Search failed", e))?;
    let albums = state
        .catalog
        .get_albums(limit, 0, Some(query))
        .await
        .map_err(|e| ApiError::internal("Search failed", e))?;
    let artists = state
        .catalog
        .get_artists(limit, 0, Some(query))
        .await
        .map_err(|e| ApiError::internal("Search failed", e))?;

    Ok(Json(json!({
        "tracks": state.presenter.tracks(&tracks),
        "albums": state.presenter.albums(&albums),
        "artists": state.presenter.artists(&artists),
    })))
}

// ========== LIBRARY ENDPOINTS ==========

async fn saved_tracks(state: &AppState) -> ApiResult<Vec<Track>> {
    state
        .catalog
        .get_saved_tracks()
        .await
        .map_err(|e| ApiError::internal("Failed to fetch saved tracks", e))
}

async fn list_saved_tracks(State(state): State<AppState>) -> ApiResult<Json<Vec<TrackResponse>>> {
    let tracks = saved_tracks(&state).await?;
    Ok(Json(state.presenter.tracks(&tracks)))
}

async fn save_track(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    if !set_track_saved(&state, &id, true).await? {
        return Err(ApiError::not_found("Track not found"));
    }
    Ok(message("Track saved to library"))
}

async fn unsave_track(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    if !set_track_saved(&state, &id, false).await? {
        return Err(ApiError::not_found("Track not found"));
    }
    Ok(message("Track removed from library"))
}

async fn set_track_saved(state: &AppState, id: &str, saved: bool) -> ApiResult<bool> {
    let result = if saved {
        state.catalog.save_track(id).await
    } else {
        state.catalog.unsave_track(id).await
    };
    result.map_err(|e| ApiError::internal("Failed to update saved track", e))
}

async fn set_album_saved(state: &AppState, id: &str, saved: bool) -> ApiResult<bool> {
    let result = if saved {
        state.catalog.save_album(id).await
    } else {
        state.catalog.unsave_album(id).await
    };
    result.map_err(|e| ApiError::internal("Failed to update saved album", e))
}

async fn saved_albums(state: &AppState) -> ApiResult<Vec<Album>> {
    state
        .catalog
        .get_saved_albums()
        .await
        .map_err(|e| ApiError::internal("Failed to fetch saved albums", e))
}

async fn list_saved_albums(State(state): State<AppState>) -> ApiResult<Json<Vec<AlbumResponse>>> {
    let albums = saved_albums(&state).await?;
    Ok(Json(state.presenter.albums(&albums)))
}

async fn save_album(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    if !set_album_saved(&state, &id, true).await? {
        return Err(ApiError::not_found("Album not found"));
    }
    Ok(message("Album saved to library"))
}

async fn unsave_album(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    if !set_album_saved(&state, &id, false).await? {
        return Err(ApiError::not_found("Album not found"));
    }
    Ok(message("Album removed from library"))
}

#[derive(Debug, Default, Deserialize)]
struct IdsBody {
    #[serde(default)]
    ids: Vec<String>,
}

async fn my_tracks(State(state): State<AppState>, Query(params): Query<LimitParams>) -> ApiResult<Json<Value>> {
    let tracks = saved_tracks(&state).await?;
    let items: Vec<Value> = tracks
        .iter()
        .take(params.or(DEFAULT_PAGE_SIZE) as usize)
        .map(|track| json!({ "track": state.presenter.track(track) }))
        .collect();
    Ok(Json(json!({ "items": items })))
}

async fn save_my_tracks(State(state): State<AppState>, Json(body): Json<IdsBody>) -> ApiResult<Json<Value>> {
    for id in &body.ids {
        set_track_saved(&state, id, true).await?;
    }
    Ok(message("Tracks saved"))
}

async fn remove_my_tracks(State(state): State<AppState>, Json(body): Json<IdsBody>) -> ApiResult<Json<Value>> {
    for id in &body.ids {
        set_track_saved(&state, id, false).await?;
    }
    Ok(message("Tracks removed"))
}

#[derive(Debug, Deserialize)]
struct IdsParams {
    ids: Option<String>,
}

async fn contains_my_tracks(
    State(state): State<AppState>,
    Query(params): Query<IdsParams>,
) -> ApiResult<Json<Vec<bool>>> {
    let ids = params.ids.unwrap_or_default();
    let mut saved = Vec::new();
    for id in ids.split(',').map(str::trim).filter(|id| !id.is_empty()) {
        let is_saved = state
            .catalog
            .is_track_saved(id)
            .await
            .map_err(|e| ApiError::internal("Failed to check saved tracks", e))?;
        saved.push(is_saved);
    }
    Ok(Json(saved))
}

async fn my_albums(State(state): State<AppState>, Query(params): Query<LimitParams>) -> ApiResult<Json<Value>> {
    let albums = saved_albums(&state).await?;
    let items: Vec<Value> = albums
        .iter()
        .take(params.or(DEFAULT_PAGE_SIZE) as usize)
        .map(|album| json!({ "album": state.presenter.album(album, None) }))
        .collect();
    Ok(Json(json!({ "items": items })))
}

async fn save_my_albums(State(state): State<AppState>, Json(body): Json<IdsBody>) -> ApiResult<Json<Value>> {
    for id in &body.ids {
        set_album_saved(&state, id, true).await?;
    }
    Ok(message("Albums saved"))
}

async fn remove_my_albums(State(state): State<AppState>, Json(body): Json<IdsBody>) -> ApiResult<Json<Value>> {
    for id in &body.ids {
        set_album_saved(&state, id, false).await?;
    }
    Ok(message("Albums removed"))
}

async fn my_playlists(State(state): State<AppState>, Query(params): Query<LimitParams>) -> ApiResult<Json<Value>> {
    let mut playlists = all_playlists(&state).await?;
    playlists.truncate(params.or(DEFAULT_PAGE_SIZE) as usize);
    Ok(Json(json!({ "items": playlists })))
}

async fn top_tracks(State(state): State<AppState>, Query(params): Query<LimitParams>) -> ApiResult<Json<Value>> {
    let tracks = state
        .catalog
        .get_tracks(params.or(8), 0, None, true)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch top tracks", e))?;
    Ok(Json(json!({ "items": state.presenter.tracks(&tracks) })))
}

async fn top_artists(State(state): State<AppState>, Query(params): Query<LimitParams>) -> ApiResult<Json<Value>> {
    let artists = state
        .catalog
        .get_artists(params.or(8), 0, None)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch top artists", e))?;
    Ok(Json(json!({ "items": state.presenter.artists(&artists) })))
}

async fn new_releases(State(state): State<AppState>, Query(params): Query<LimitParams>) -> ApiResult<Json<Value>> {
    let albums = state
        .catalog
        .get_albums(params.or(10), 0, None)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch albums", e))?;
    Ok(Json(json!({ "albums": { "items": state.presenter.albums(&albums) } })))
}

async fn featured_playlists(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> ApiResult<Json<Value>> {
    let mut playlists = all_playlists(&state).await?;
    playlists.truncate(params.or(10) as usize);
    Ok(Json(json!({ "playlists": { "items": playlists } })))
}

// ========== OTHER ENDPOINTS ==========

#[derive(Debug, Deserialize)]
struct RecommendationParams {
    seed_track: Option<String>,
    seed_artist: Option<String>,
    limit: Option<i64>,
}

async fn recommendations(
    State(state): State<AppState>,
    Query(params): Query<RecommendationParams>,
) -> ApiResult<Json<Value>> {
    let tracks = state
        .catalog
        .get_recommendations(
            params.seed_track.as_deref(),
            params.seed_artist.as_deref(),
            params.limit.unwrap_or(20).clamp(1, MAX_PAGE_SIZE),
        )
        .await
        .map_err(|e| ApiError::internal("Failed to build recommendations", e))?;
    Ok(Json(json!({ "tracks": state.presenter.tracks(&tracks) })))
}

async fn rescan_library(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let summary = state
        .scanner
        .scan(&state.library_root)
        .await
        .map_err(|e| ApiError::internal("Library rescan failed", e))?;
    Ok(Json(json!({ "message": "Library rescan complete", "summary": summary })))
}

async fn get_stats(State(state): State<AppState>) -> ApiResult<Json<LibraryStats>> {
    state
        .catalog
        .get_stats()
        .await
        .map(Json)
        .map_err(|e| ApiError::internal("Failed to compute library stats", e))
}

// ========== DOWNLOAD ENDPOINTS ==========

#[derive(Debug, Deserialize)]
struct DownloadParams {
    url: Option<String>,
    format: Option<String>,
    quality: Option<String>,
}

impl DownloadParams {
    fn url(&self) -> ApiResult<&str> {
        self.url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ApiError::bad_request("url is required"))
    }

    fn format(&self) -> ApiResult<AudioFormat> {
        match self.format.as_deref() {
            None => Ok(AudioFormat::default()),
            Some(name) => name
                .parse()
                .map_err(|e: anyhow::Error| ApiError::bad_request(e.to_string())),
        }
    }

    fn quality(&self) -> ApiResult<AudioQuality> {
        match self.quality.as_deref() {
            None => Ok(AudioQuality::default()),
            Some(name) => name
                .parse()
                .map_err(|e: anyhow::Error| ApiError::bad_request(e.to_string())),
        }
    }
}

async fn youtube_info(
    State(state): State<AppState>,
    Query(params): Query<DownloadParams>,
) -> ApiResult<Json<Value>> {
    let url = params.url()?;
    let info = state.downloader.get_video_info(url).await.map_err(|e| {
        tracing::warn!("Video info lookup failed for {}: {:#}", url, e);
        ApiError::bad_request("Invalid YouTube URL or video unavailable")
    })?;
    Ok(Json(json!(info)))
}

async fn download_youtube(
    State(state): State<AppState>,
    Query(params): Query<DownloadParams>,
) -> ApiResult<Json<Value>> {
    let url = params.url()?;
    let format = params.format()?;
    let quality = params.quality()?;

    let info = state.downloader.get_video_info(url).await.map_err(|e| {
        tracing::warn!("Video info lookup failed for {}: {:#}", url, e);
        ApiError::bad_request("Invalid YouTube URL or video unavailable")
    })?;

    let duplicate = state
        .catalog
        .find_duplicate(&info.title, &info.artist, info.duration_ms())
        .await
        .map_err(|e| ApiError::internal("Failed to check for duplicates", e))?;
    if let Some(existing) = duplicate {
        tracing::info!("Skipping download of '{}', already cataloged as {}", info.title, existing.id);
        return Ok(Json(json!({
            "message": "Song already exists in library",
            "title": info.title,
            "artist": info.artist,
            "duplicate": true,
            "track_id": existing.id,
        })));
    }

    let path = state
        .downloader
        .download_audio(url, format, quality)
        .await
        .map_err(|e| ApiError::internal("Download failed", e))?;

    let record = info.catalog_record(&path);
    state
        .catalog
        .upsert_track(&record)
        .await
        .map_err(|e| ApiError::internal("Failed to catalog download", e))?;

    Ok(Json(json!({
        "message": "Download complete",
        "title": info.title,
        "artist": info.artist,
        "filepath": record.file_path,
        "format": format,
        "lyrics_found": info.lyrics.is_some(),
        "duplicate": false,
        "track_id": record.id,
    })))
}

async fn download_youtube_playlist(
    State(state): State<AppState>,
    Query(params): Query<DownloadParams>,
) -> ApiResult<Json<Value>> {
    let url = params.url()?;
    let format = params.format()?;
    let quality = params.quality()?;

    let paths = state
        .downloader
        .download_playlist(url, format, quality)
        .await
        .map_err(|e| ApiError::internal("Playlist download failed", e))?;

    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        if state.scanner.process_file(path, None).await.is_none() {
            tracing::warn!("Downloaded file was not cataloged: {}", path.display());
        }
        files.push(path.to_string_lossy().into_owned());
    }

    Ok(Json(json!({
        "message": format!("Downloaded {} tracks", files.len()),
        "downloaded": files.len(),
        "files": files,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_range_is_clamped() {
        assert_eq!(parse_range("bytes=0-99", 1000), Some((0, 99)));
        assert_eq!(parse_range("bytes=900-5000", 1000), Some((900, 999)));
        assert_eq!(parse_range("bytes=1000-1001", 1000), None);
        assert_eq!(parse_range("bytes=50-10", 1000), None);
    }

    #[test]
    fn open_and_suffix_ranges() {
        assert_eq!(parse_range("bytes=100-", 1000), Some((100, 999)));
        assert_eq!(parse_range("bytes=-100", 1000), Some((900, 999)));
        assert_eq!(parse_range("bytes=-5000", 1000), Some((0, 999)));
        assert_eq!(parse_range("bytes=-0", 1000), None);
    }

    #[test]
    fn malformed_ranges_are_ignored() {
        assert_eq!(parse_range("items=0-10", 1000), None);
        assert_eq!(parse_range("bytes=-", 1000), None);
        assert_eq!(parse_range("bytes=a-b", 1000), None);
        assert_eq!(parse_range("bytes=0-1,5-6", 1000), None);
    }

    #[test]
    fn disposition_name_is_ascii() {
        assert_eq!(safe_filename(FsPath::new("/m/Song \"x\".mp3"), "id"), "Song x.mp3");
        assert_eq!(safe_filename(FsPath::new("/m/日本.flac"), "abc"), "abc.flac");
    }
}
