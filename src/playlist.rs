use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub tracks: Vec<String>, // Track IDs in play order
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct PlaylistCreate {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlaylistUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Clone)]
pub struct PlaylistDatabase {
    pool: SqlitePool,
}

impl PlaylistDatabase {
    /// Create the playlist tables on a pool shared with the catalog
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS playlists (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .context("Failed to create playlists table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS playlist_tracks (
                playlist_id TEXT NOT NULL,
                track_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                added_at TEXT NOT NULL,
                PRIMARY KEY (playlist_id, track_id),
                FOREIGN KEY (playlist_id) REFERENCES playlists(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&pool)
        .await
        .context("Failed to create playlist_tracks table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_playlist_tracks_playlist_id
            ON playlist_tracks(playlist_id)
            "#,
        )
        .execute(&pool)
        .await
        .context("Failed to create index")?;

        tracing::debug!("Playlist tables ready");

        Ok(Self { pool })
    }

    /// Create a new playlist
    pub async fn create_playlist(&self, create: PlaylistCreate) -> Result<Playlist> {
        let id = new_playlist_id();
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO playlists (id, name, description, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&create.name)
        .bind(&create.description)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .context("Failed to insert playlist")?;

        tracing::info!("Created playlist '{}' ({})", create.name, id);

        Ok(Playlist {
            id,
            name: create.name,
            description: create.description,
            tracks: Vec::new(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Get all playlists, newest first
    pub async fn get_playlists(&self) -> Result<Vec<Playlist>> {
        let playlists = sqlx::query_as::<_, (String, String, Option<String>, String, String)>(
            r#"
            SELECT id, name, description, created_at, updated_at
            FROM playlists
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch playlists")?;

        let mut result = Vec::new();
        for (id, name, description, created_at, updated_at) in playlists {
            let tracks = self.get_playlist_tracks(&id).await?;
            result.push(Playlist {
                id,
                name,
                description,
                tracks,
                created_at,
                updated_at,
            });
        }

        Ok(result)
    }

    /// Get a specific playlist by ID
    pub async fn get_playlist(&self, id: &str) -> Result<Option<Playlist>> {
        let row = sqlx::query_as::<_, (String, String, Option<String>, String, String)>(
            r#"
            SELECT id, name, description, created_at, updated_at
            FROM playlists
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch playlist")?;

        let Some((id, name, description, created_at, updated_at)) = row else {
            return Ok(None);
        };

        let tracks = self.get_playlist_tracks(&id).await?;
        Ok(Some(Playlist {
            id,
            name,
            description,
            tracks,
            created_at,
            updated_at,
        }))
    }

    /// Get track IDs for a playlist
    async fn get_playlist_tracks(&self, playlist_id: &str) -> Result<Vec<String>> {
        let tracks = sqlx::query_as::<_, (String,)>(
            r#"
            SELECT track_id
            FROM playlist_tracks
            WHERE playlist_id = ?
            ORDER BY position
            "#,
        )
        .bind(playlist_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch playlist tracks")?;

        Ok(tracks.into_iter().map(|(track_id,)| track_id).collect())
    }

    /// Rename a playlist and/or change its description.
    ///
    /// An empty name leaves the name unchanged.
    pub async fn update_playlist(&self, id: &str, update: PlaylistUpdate) -> Result<Option<Playlist>> {
        let Some(current) = self.get_playlist(id).await? else {
            return Ok(None);
        };

        let name = update
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(current.name);
        let description = update.description.or(current.description);
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            UPDATE playlists
            SET name = ?, description = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&name)
        .bind(&description)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to update playlist")?;

        self.get_playlist(id).await
    }

    /// Delete a playlist
    pub async fn delete_playlist(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM playlists WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete playlist")?;

        Ok(result.rows_affected() > 0)
    }

    /// Append a track to a playlist.
    ///
    /// Returns `None` when the playlist does not exist or already holds the track.
    pub async fn add_track_to_playlist(
        &self,
        playlist_id: &str,
        track_id: &str,
    ) -> Result<Option<Playlist>> {
        let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM playlists WHERE id = ?")
            .bind(playlist_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to check playlist existence")?;

        if exists == 0 {
            return Ok(None);
        }

        let max_position = sqlx::query_scalar::<_, Option<i64>>(
            "SELECT MAX(position) FROM playlist_tracks WHERE playlist_id = ?",
        )
        .bind(playlist_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to get max position")?
        .unwrap_or(-1);

        let now = chrono::Utc::now().to_rfc3339();

        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO playlist_tracks (playlist_id, track_id, position, added_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(playlist_id)
        .bind(track_id)
        .bind(max_position + 1)
        .bind(&now)
        .execute(&self.pool)
        .await
        .context("Failed to add track to playlist")?;

        if inserted.rows_affected() == 0 {
            tracing::debug!("Track {} already in playlist {}", track_id, playlist_id);
            return Ok(None);
        }

        self.touch(playlist_id, &now).await?;
        self.get_playlist(playlist_id).await
    }

    /// Remove a track from a playlist
    pub async fn remove_track_from_playlist(
        &self,
        playlist_id: &str,
        track_id: &str,
    ) -> Result<Option<Playlist>> {
        let result =
            sqlx::query("DELETE FROM playlist_tracks WHERE playlist_id = ? AND track_id = ?")
                .bind(playlist_id)
                .bind(track_id)
                .execute(&self.pool)
                .await
                .context("Failed to remove track from playlist")?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        // Compact positions
        let tracks = self.get_playlist_tracks(playlist_id).await?;
        for (position, track_id) in tracks.iter().enumerate() {
            sqlx::query(
                "UPDATE playlist_tracks SET position = ? WHERE playlist_id = ? AND track_id = ?",
            )
            .bind(position as i64)
            .bind(playlist_id)
            .bind(track_id)
            .execute(&self.pool)
            .await
            .context("Failed to update track position")?;
        }

        let now = chrono::Utc::now().to_rfc3339();
        self.touch(playlist_id, &now).await?;
        self.get_playlist(playlist_id).await
    }

    async fn touch(&self, playlist_id: &str, now: &str) -> Result<()> {
        sqlx::query("UPDATE playlists SET updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(playlist_id)
            .execute(&self.pool)
            .await
            .context("Failed to update playlist timestamp")?;
        Ok(())
    }
}

/// Short playlist id taken from a v4 UUID
fn new_playlist_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(16);
    id
}
