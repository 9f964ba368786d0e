use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Duration window used when matching downloads against existing tracks
const DUPLICATE_WINDOW_MS: i64 = 5000;

/// One scanned track, as produced by the scanner and written to the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub artist_id: String,
    pub album: String,
    pub album_id: String,
    pub track_number: Option<u32>,
    pub year: Option<i32>,
    pub genre: Option<String>,
    pub duration_ms: u64,
    pub file_path: String,
    pub cover_image_path: Option<String>,
    pub lyrics: Option<String>,
    pub has_enhanced_version: bool,
    pub enhanced_file_path: Option<String>,
}

/// Write side of the catalog used by the scanner
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert or overwrite the catalog fields of a track, keyed by id
    async fn upsert_track(&self, record: &CatalogRecord) -> Result<()>;

    /// Link an enhanced variant to an existing track
    async fn update_enhanced_info(&self, track_id: &str, enhanced_path: &str) -> Result<()>;
}

/// A track row with its user state
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub artist_id: String,
    pub album: String,
    pub album_id: String,
    pub duration_ms: i64,
    pub track_number: Option<i64>,
    pub year: Option<i64>,
    pub genre: Option<String>,
    pub file_path: String,
    pub image_path: Option<String>,
    pub lyrics: Option<String>,
    pub is_saved: bool,
    pub play_count: i64,
    pub created_at: String,
    pub has_enhanced_version: bool,
    pub enhanced_file_path: Option<String>,
    pub enhancement_preset: Option<String>,
    pub enhanced_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Album {
    pub id: String,
    pub name: String,
    pub artist: String,
    pub artist_id: String,
    pub year: Option<i64>,
    pub total_tracks: i64,
    pub image_path: Option<String>,
    pub is_saved: bool,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Artist {
    pub id: String,
    pub name: String,
    pub total_albums: i64,
    pub total_tracks: i64,
    pub image_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LibraryStats {
    pub total_tracks: i64,
    pub total_albums: i64,
    pub total_artists: i64,
    pub total_playlists: i64,
    pub total_duration_hours: f64,
}

const TRACK_COLUMNS: &str = "id, title, artist, artist_id, album, album_id, duration_ms, \
    track_number, year, genre, file_path, image_path, lyrics, is_saved, play_count, \
    created_at, has_enhanced_version, enhanced_file_path, enhancement_preset, enhanced_at";

const ALBUM_COLUMNS: &str =
    "id, name, artist, artist_id, year, total_tracks, image_path, is_saved";

const ARTIST_COLUMNS: &str = "id, name, total_albums, total_tracks, image_path";

#[derive(Clone)]
pub struct CatalogDatabase {
    pool: SqlitePool,
}

impl CatalogDatabase {
    /// Open (or create) the catalog database at `db_path`
    pub async fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
            .context("Invalid database path")?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to catalog database at: {}", db_path.display()))?;

        let db = Self { pool };
        db.create_schema().await?;

        tracing::info!("Catalog database initialized: {}", db_path.display());
        Ok(db)
    }

    /// Shared pool, used by the playlist store
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tracks (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                artist TEXT NOT NULL,
                artist_id TEXT NOT NULL,
                album TEXT NOT NULL,
                album_id TEXT NOT NULL,
                duration_ms INTEGER NOT NULL DEFAULT 0,
                track_number INTEGER,
                year INTEGER,
                genre TEXT,
                file_path TEXT UNIQUE NOT NULL,
                image_path TEXT,
                lyrics TEXT,
                is_saved BOOLEAN NOT NULL DEFAULT 0,
                play_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                has_enhanced_version BOOLEAN NOT NULL DEFAULT 0,
                enhanced_file_path TEXT,
                enhancement_preset TEXT,
                enhanced_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create tracks table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS albums (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                artist TEXT NOT NULL,
                artist_id TEXT NOT NULL,
                year INTEGER,
                total_tracks INTEGER NOT NULL DEFAULT 0,
                image_path TEXT,
                is_saved BOOLEAN NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create albums table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS artists (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                total_albums INTEGER NOT NULL DEFAULT 0,
                total_tracks INTEGER NOT NULL DEFAULT 0,
                image_path TEXT,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create artists table")?;

        for (name, statement) in [
            ("idx_tracks_artist", "CREATE INDEX IF NOT EXISTS idx_tracks_artist ON tracks(artist_id)"),
            ("idx_tracks_album", "CREATE INDEX IF NOT EXISTS idx_tracks_album ON tracks(album_id)"),
            ("idx_albums_artist", "CREATE INDEX IF NOT EXISTS idx_albums_artist ON albums(artist_id)"),
            ("idx_tracks_title", "CREATE INDEX IF NOT EXISTS idx_tracks_title ON tracks(title)"),
        ] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to create index {}", name))?;
        }

        Ok(())
    }

    // ========== TRACKS ==========

    /// List tracks ordered by title, optionally filtered by a search term
    pub async fn get_tracks(
        &self,
        limit: i64,
        offset: i64,
        search: Option<&str>,
        only_available: bool,
    ) -> Result<Vec<Track>> {
        let tracks = match search.filter(|s| !s.trim().is_empty()) {
            Some(term) => {
                let pattern = format!("%{}%", term);
                sqlx::query_as::<_, Track>(&format!(
                    "SELECT {TRACK_COLUMNS} FROM tracks \
                     WHERE title LIKE ? OR artist LIKE ? OR album LIKE ? \
                     ORDER BY title LIMIT ? OFFSET ?"
                ))
                .bind(&pattern)
                .bind(&pattern)
                .bind(&pattern)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, Track>(&format!(
                    "SELECT {TRACK_COLUMNS} FROM tracks ORDER BY title LIMIT ? OFFSET ?"
                ))
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
            }
        }
        .context("Failed to fetch tracks")?;

        if only_available {
            Ok(tracks
                .into_iter()
                .filter(|t| Path::new(&t.file_path).exists())
                .collect())
        } else {
            Ok(tracks)
        }
    }

    pub async fn get_track(&self, id: &str) -> Result<Option<Track>> {
        sqlx::query_as::<_, Track>(&format!("SELECT {TRACK_COLUMNS} FROM tracks WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch track")
    }

    /// Replace the lyrics of a track. Returns false when the track is unknown.
    pub async fn update_lyrics(&self, id: &str, lyrics: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE tracks SET lyrics = ? WHERE id = ?")
            .bind(lyrics)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update lyrics")?;
        Ok(result.rows_affected() > 0)
    }

    /// Increment play count for a track, returning the new count
    pub async fn increment_play_count(&self, id: &str) -> Result<Option<i64>> {
        sqlx::query_scalar::<_, i64>(
            "UPDATE tracks SET play_count = play_count + 1 WHERE id = ? RETURNING play_count",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to increment play count")
    }

    /// Record an enhancement produced for a track
    pub async fn set_enhancement(&self, id: &str, enhanced_path: &str, preset: &str) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            UPDATE tracks
            SET has_enhanced_version = 1,
                enhanced_file_path = ?,
                enhancement_preset = ?,
                enhanced_at = ?
            WHERE id = ?
            "#,
        )
        .bind(enhanced_path)
        .bind(preset)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to record enhancement")?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn clear_enhancement(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE tracks
            SET has_enhanced_version = 0,
                enhanced_file_path = NULL,
                enhancement_preset = NULL,
                enhanced_at = NULL
            WHERE id = ?
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to clear enhancement")?;
        Ok(result.rows_affected() > 0)
    }

    /// Look for an existing track with the same title and artist.
    ///
    /// Matching ignores case and surrounding whitespace. When `duration_ms`
    /// is given, a title/artist match with a duration within five seconds is
    /// preferred over any other match.
    pub async fn find_duplicate(
        &self,
        title: &str,
        artist: &str,
        duration_ms: Option<i64>,
    ) -> Result<Option<Track>> {
        let candidates = sqlx::query_as::<_, Track>(&format!(
            "SELECT {TRACK_COLUMNS} FROM tracks \
             WHERE LOWER(title) = LOWER(?) AND LOWER(artist) = LOWER(?) \
             ORDER BY created_at"
        ))
        .bind(title.trim())
        .bind(artist.trim())
        .fetch_all(&self.pool)
        .await
        .context("Failed to check for duplicate track")?;

        if let Some(duration) = duration_ms {
            if let Some(close) = candidates
                .iter()
                .find(|t| (t.duration_ms - duration).abs() < DUPLICATE_WINDOW_MS)
            {
                return Ok(Some(close.clone()));
            }
        }

        Ok(candidates.into_iter().next())
    }

    /// Tracks related to a seed track or artist, most played first when no
    /// track seed is given
    pub async fn get_recommendations(
        &self,
        seed_track: Option<&str>,
        seed_artist: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Track>> {
        if let Some(track_id) = seed_track {
            let Some(seed) = self.get_track(track_id).await? else {
                return Ok(Vec::new());
            };
            return sqlx::query_as::<_, Track>(&format!(
                "SELECT {TRACK_COLUMNS} FROM tracks \
                 WHERE id != ? AND (artist_id = ? OR genre = ? OR album_id = ?) \
                 ORDER BY RANDOM() LIMIT ?"
            ))
            .bind(&seed.id)
            .bind(&seed.artist_id)
            .bind(&seed.genre)
            .bind(&seed.album_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch recommendations");
        }

        match seed_artist {
            Some(artist_id) => sqlx::query_as::<_, Track>(&format!(
                "SELECT {TRACK_COLUMNS} FROM tracks WHERE artist_id = ? \
                 ORDER BY play_count DESC, RANDOM() LIMIT ?"
            ))
            .bind(artist_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await,
            None => sqlx::query_as::<_, Track>(&format!(
                "SELECT {TRACK_COLUMNS} FROM tracks ORDER BY play_count DESC, RANDOM() LIMIT ?"
            ))
            .bind(limit)
            .fetch_all(&self.pool)
            .await,
        }
        .context("Failed to fetch recommendations")
    }

    // ========== ALBUMS ==========

    pub async fn get_albums(&self, limit: i64, offset: i64, search: Option<&str>) -> Result<Vec<Album>> {
        match search.filter(|s| !s.trim().is_empty()) {
            Some(term) => {
                let pattern = format!("%{}%", term);
                sqlx::query_as::<_, Album>(&format!(
                    "SELECT {ALBUM_COLUMNS} FROM albums WHERE name LIKE ? OR artist LIKE ? \
                     ORDER BY name LIMIT ? OFFSET ?"
                ))
                .bind(&pattern)
                .bind(&pattern)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, Album>(&format!(
                    "SELECT {ALBUM_COLUMNS} FROM albums ORDER BY name LIMIT ? OFFSET ?"
                ))
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
            }
        }
        .context("Failed to fetch albums")
    }

    pub async fn get_album(&self, id: &str) -> Result<Option<Album>> {
        sqlx::query_as::<_, Album>(&format!("SELECT {ALBUM_COLUMNS} FROM albums WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch album")
    }

    /// Tracks of an album in disc order
    pub async fn get_album_tracks(&self, album_id: &str) -> Result<Vec<Track>> {
        sqlx::query_as::<_, Track>(&format!(
            "SELECT {TRACK_COLUMNS} FROM tracks WHERE album_id = ? ORDER BY track_number, title"
        ))
        .bind(album_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch album tracks")
    }

    // ========== ARTISTS ==========

    pub async fn get_artists(&self, limit: i64, offset: i64, search: Option<&str>) -> Result<Vec<Artist>> {
        match search.filter(|s| !s.trim().is_empty()) {
            Some(term) => {
                sqlx::query_as::<_, Artist>(&format!(
                    "SELECT {ARTIST_COLUMNS} FROM artists WHERE name LIKE ? \
                     ORDER BY name LIMIT ? OFFSET ?"
                ))
                .bind(format!("%{}%", term))
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, Artist>(&format!(
                    "SELECT {ARTIST_COLUMNS} FROM artists ORDER BY name LIMIT ? OFFSET ?"
                ))
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
            }
        }
        .context("Failed to fetch artists")
    }

    pub async fn get_artist(&self, id: &str) -> Result<Option<Artist>> {
        sqlx::query_as::<_, Artist>(&format!("SELECT {ARTIST_COLUMNS} FROM artists WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch artist")
    }

    /// Albums of an artist, newest first
    pub async fn get_artist_albums(&self, artist_id: &str) -> Result<Vec<Album>> {
        sqlx::query_as::<_, Album>(&format!(
            "SELECT {ALBUM_COLUMNS} FROM albums WHERE artist_id = ? ORDER BY year DESC, name"
        ))
        .bind(artist_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch artist albums")
    }

    /// Most played tracks of an artist
    pub async fn get_artist_tracks(&self, artist_id: &str, limit: i64) -> Result<Vec<Track>> {
        sqlx::query_as::<_, Track>(&format!(
            "SELECT {TRACK_COLUMNS} FROM tracks WHERE artist_id = ? \
             ORDER BY play_count DESC, title LIMIT ?"
        ))
        .bind(artist_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch artist tracks")
    }

    // ========== LIBRARY ==========

    pub async fn save_track(&self, id: &str) -> Result<bool> {
        self.set_flag("tracks", id, true).await
    }

    pub async fn unsave_track(&self, id: &str) -> Result<bool> {
        self.set_flag("tracks", id, false).await
    }

    pub async fn save_album(&self, id: &str) -> Result<bool> {
        self.set_flag("albums", id, true).await
    }

    pub async fn unsave_album(&self, id: &str) -> Result<bool> {
        self.set_flag("albums", id, false).await
    }

    async fn set_flag(&self, table: &'static str, id: &str, saved: bool) -> Result<bool> {
        let result = sqlx::query(&format!("UPDATE {table} SET is_saved = ? WHERE id = ?"))
            .bind(saved)
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to update saved flag in {}", table))?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn is_track_saved(&self, id: &str) -> Result<bool> {
        let saved = sqlx::query_scalar::<_, bool>("SELECT is_saved FROM tracks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to check saved track")?;
        Ok(saved.unwrap_or(false))
    }

    pub async fn get_saved_tracks(&self) -> Result<Vec<Track>> {
        sqlx::query_as::<_, Track>(&format!(
            "SELECT {TRACK_COLUMNS} FROM tracks WHERE is_saved = 1 ORDER BY title"
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch saved tracks")
    }

    pub async fn get_saved_albums(&self) -> Result<Vec<Album>> {
        sqlx::query_as::<_, Album>(&format!(
            "SELECT {ALBUM_COLUMNS} FROM albums WHERE is_saved = 1 ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch saved albums")
    }

    /// Library totals for the admin endpoint
    pub async fn get_stats(&self) -> Result<LibraryStats> {
        let (total_tracks, total_duration_ms) = sqlx::query_as::<_, (i64, Option<i64>)>(
            "SELECT COUNT(*), SUM(duration_ms) FROM tracks",
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to count tracks")?;

        let total_albums = self.count("albums").await?;
        let total_artists = self.count("artists").await?;
        let total_playlists = self.count("playlists").await.unwrap_or(0);

        let hours = total_duration_ms.unwrap_or(0) as f64 / 3_600_000.0;

        Ok(LibraryStats {
            total_tracks,
            total_albums,
            total_artists,
            total_playlists,
            total_duration_hours: (hours * 100.0).round() / 100.0,
        })
    }

    async fn count(&self, table: &'static str) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to count {}", table))
    }
}

#[async_trait]
impl CatalogStore for CatalogDatabase {
    async fn upsert_track(&self, record: &CatalogRecord) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        // Lyrics set through the API survive a rescan that finds no lyrics file
        sqlx::query(
            r#"
            INSERT INTO tracks (
                id, title, artist, artist_id, album, album_id, duration_ms,
                track_number, year, genre, file_path, image_path, lyrics,
                has_enhanced_version, enhanced_file_path
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                artist = excluded.artist,
                artist_id = excluded.artist_id,
                album = excluded.album,
                album_id = excluded.album_id,
                duration_ms = excluded.duration_ms,
                track_number = excluded.track_number,
                year = excluded.year,
                genre = excluded.genre,
                file_path = excluded.file_path,
                image_path = excluded.image_path,
                lyrics = COALESCE(excluded.lyrics, tracks.lyrics),
                has_enhanced_version = excluded.has_enhanced_version,
                enhanced_file_path = excluded.enhanced_file_path
            "#,
        )
        .bind(&record.id)
        .bind(&record.title)
        .bind(&record.artist)
        .bind(&record.artist_id)
        .bind(&record.album)
        .bind(&record.album_id)
        .bind(record.duration_ms as i64)
        .bind(record.track_number.map(i64::from))
        .bind(record.year.map(i64::from))
        .bind(&record.genre)
        .bind(&record.file_path)
        .bind(&record.cover_image_path)
        .bind(&record.lyrics)
        .bind(record.has_enhanced_version)
        .bind(&record.enhanced_file_path)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to upsert track {}", record.file_path))?;

        sqlx::query("INSERT OR IGNORE INTO artists (id, name, image_path) VALUES (?, ?, ?)")
            .bind(&record.artist_id)
            .bind(&record.artist)
            .bind(&record.cover_image_path)
            .execute(&mut *tx)
            .await
            .context("Failed to insert artist")?;

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO albums (id, name, artist, artist_id, year, image_path)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.album_id)
        .bind(&record.album)
        .bind(&record.artist)
        .bind(&record.artist_id)
        .bind(record.year.map(i64::from))
        .bind(&record.cover_image_path)
        .execute(&mut *tx)
        .await
        .context("Failed to insert album")?;

        sqlx::query(
            r#"
            UPDATE albums SET
                total_tracks = (SELECT COUNT(*) FROM tracks WHERE album_id = ?),
                image_path = COALESCE(image_path, ?)
            WHERE id = ?
            "#,
        )
        .bind(&record.album_id)
        .bind(&record.cover_image_path)
        .bind(&record.album_id)
        .execute(&mut *tx)
        .await
        .context("Failed to update album counts")?;

        sqlx::query(
            r#"
            UPDATE artists SET
                total_tracks = (SELECT COUNT(*) FROM tracks WHERE artist_id = ?),
                total_albums = (SELECT COUNT(DISTINCT album_id) FROM tracks WHERE artist_id = ?)
            WHERE id = ?
            "#,
        )
        .bind(&record.artist_id)
        .bind(&record.artist_id)
        .bind(&record.artist_id)
        .execute(&mut *tx)
        .await
        .context("Failed to update artist counts")?;

        tx.commit().await.context("Failed to commit track upsert")?;
        Ok(())
    }

    async fn update_enhanced_info(&self, track_id: &str, enhanced_path: &str) -> Result<()> {
        sqlx::query(
            "UPDATE tracks SET has_enhanced_version = 1, enhanced_file_path = ? WHERE id = ?",
        )
        .bind(enhanced_path)
        .bind(track_id)
        .execute(&self.pool)
        .await
        .context("Failed to update enhanced version info")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, title: &str, album: &str, duration_ms: u64) -> CatalogRecord {
        CatalogRecord {
            id: id.to_string(),
            title: title.to_string(),
            artist: "Artist".to_string(),
            artist_id: "artist-1".to_string(),
            album: album.to_string(),
            album_id: format!("album-{}", album),
            track_number: Some(1),
            year: Some(2020),
            genre: Some("Rock".to_string()),
            duration_ms,
            file_path: format!("/music/{}.mp3", id),
            cover_image_path: None,
            lyrics: None,
            has_enhanced_version: false,
            enhanced_file_path: None,
        }
    }

    async fn open() -> (tempfile::TempDir, CatalogDatabase) {
        let dir = tempfile::tempdir().unwrap();
        let db = CatalogDatabase::new(&dir.path().join("catalog.db")).await.unwrap();
        (dir, db)
    }

    #[tokio::test]
    async fn upsert_keeps_user_state() {
        let (_dir, db) = open().await;
        db.upsert_track(&record("t1", "Song", "A", 1000)).await.unwrap();
        db.save_track("t1").await.unwrap();
        db.increment_play_count("t1").await.unwrap();
        db.update_lyrics("t1", "la la").await.unwrap();

        let mut rescanned = record("t1", "Song (Remaster)", "A", 1000);
        rescanned.genre = None;
        db.upsert_track(&rescanned).await.unwrap();

        let track = db.get_track("t1").await.unwrap().unwrap();
        assert_eq!(track.title, "Song (Remaster)");
        assert_eq!(track.genre, None);
        assert!(track.is_saved);
        assert_eq!(track.play_count, 1);
        assert_eq!(track.lyrics.as_deref(), Some("la la"));
    }

    #[tokio::test]
    async fn counts_follow_upserts() {
        let (_dir, db) = open().await;
        db.upsert_track(&record("t1", "One", "A", 1000)).await.unwrap();
        db.upsert_track(&record("t2", "Two", "A", 1000)).await.unwrap();
        db.upsert_track(&record("t3", "Three", "B", 1000)).await.unwrap();
        db.upsert_track(&record("t3", "Three", "B", 1000)).await.unwrap();

        let album = db.get_album("album-A").await.unwrap().unwrap();
        assert_eq!(album.total_tracks, 2);

        let artist = db.get_artist("artist-1").await.unwrap().unwrap();
        assert_eq!(artist.total_tracks, 3);
        assert_eq!(artist.total_albums, 2);

        let stats = db.get_stats().await.unwrap();
        assert_eq!(stats.total_tracks, 3);
        assert_eq!(stats.total_albums, 2);
        assert_eq!(stats.total_artists, 1);
    }

    #[tokio::test]
    async fn duplicate_lookup_ignores_case() {
        let (_dir, db) = open().await;
        db.upsert_track(&record("t1", "Hello", "A", 200_000)).await.unwrap();

        let hit = db.find_duplicate(" hello ", "ARTIST", Some(203_000)).await.unwrap();
        assert_eq!(hit.map(|t| t.id).as_deref(), Some("t1"));

        let miss = db.find_duplicate("Goodbye", "Artist", None).await.unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn enhancement_round_trip() {
        let (_dir, db) = open().await;
        db.upsert_track(&record("t1", "Song", "A", 1000)).await.unwrap();

        assert!(db.set_enhancement("t1", "/music/t1_enhanced.mp3", "atmos").await.unwrap());
        let track = db.get_track("t1").await.unwrap().unwrap();
        assert!(track.has_enhanced_version);
        assert_eq!(track.enhancement_preset.as_deref(), Some("atmos"));
        assert!(track.enhanced_at.is_some());

        assert!(db.clear_enhancement("t1").await.unwrap());
        let track = db.get_track("t1").await.unwrap().unwrap();
        assert!(!track.has_enhanced_version);
        assert_eq!(track.enhanced_file_path, None);
    }

    #[tokio::test]
    async fn unknown_ids_report_false() {
        let (_dir, db) = open().await;
        assert!(!db.save_track("nope").await.unwrap());
        assert!(!db.update_lyrics("nope", "x").await.unwrap());
        assert_eq!(db.increment_play_count("nope").await.unwrap(), None);
        assert!(!db.is_track_saved("nope").await.unwrap());
    }
}
