mod common;

use music_vault::catalog::{CatalogDatabase, CatalogStore};
use music_vault::playlist::{PlaylistCreate, PlaylistDatabase};
use music_vault::scanner::MusicScanner;
use std::sync::Arc;

use common::write_wav;

async fn setup() -> (tempfile::TempDir, CatalogDatabase, MusicScanner) {
    let dir = tempfile::tempdir().unwrap();
    let catalog = CatalogDatabase::new(&dir.path().join("db/catalog.db")).await.unwrap();
    let store: Arc<dyn CatalogStore> = Arc::new(catalog.clone());
    let scanner = MusicScanner::new(store, dir.path().join("covers"));
    (dir, catalog, scanner)
}

#[tokio::test]
async fn scan_fills_tracks_albums_and_artists() {
    let (dir, catalog, scanner) = setup().await;
    let library = dir.path().join("library");
    write_wav(&library.join("Band - One.wav"), 1000);
    write_wav(&library.join("Band - Two.wav"), 2000);
    write_wav(&library.join("Other - Three.wav"), 500);

    scanner.scan(&library).await.unwrap();

    let tracks = catalog.get_tracks(50, 0, None, true).await.unwrap();
    let titles: Vec<_> = tracks.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["One", "Three", "Two"]);

    let artists = catalog.get_artists(50, 0, None).await.unwrap();
    assert_eq!(artists.len(), 2);
    let band = artists.iter().find(|a| a.name == "Band").unwrap();
    assert_eq!(band.total_tracks, 2);
    assert_eq!(band.total_albums, 1);

    let albums = catalog.get_artist_albums(&band.id).await.unwrap();
    assert_eq!(albums.len(), 1);
    assert_eq!(albums[0].total_tracks, 2);

    let stats = catalog.get_stats().await.unwrap();
    assert_eq!(stats.total_tracks, 3);
    assert_eq!(stats.total_artists, 2);
    assert_eq!(stats.total_playlists, 0);
}

#[tokio::test]
async fn rescan_keeps_user_state() {
    let (dir, catalog, scanner) = setup().await;
    let library = dir.path().join("library");
    write_wav(&library.join("Band - One.wav"), 1000);

    scanner.scan(&library).await.unwrap();
    let track = catalog.get_tracks(1, 0, None, true).await.unwrap().remove(0);

    assert!(catalog.save_track(&track.id).await.unwrap());
    assert_eq!(catalog.increment_play_count(&track.id).await.unwrap(), Some(1));
    assert!(catalog.update_lyrics(&track.id, "hand written").await.unwrap());

    scanner.scan(&library).await.unwrap();

    let after = catalog.get_track(&track.id).await.unwrap().unwrap();
    assert!(after.is_saved);
    assert_eq!(after.play_count, 1);
    assert_eq!(after.lyrics.as_deref(), Some("hand written"));
    assert_eq!(after.created_at, track.created_at);
    assert_eq!(catalog.get_tracks(50, 0, None, true).await.unwrap().len(), 1);
}

#[tokio::test]
async fn deleted_files_are_hidden_from_listings() {
    let (dir, catalog, scanner) = setup().await;
    let library = dir.path().join("library");
    let gone = write_wav(&library.join("Band - Gone.wav"), 1000);
    write_wav(&library.join("Band - Kept.wav"), 1000);

    scanner.scan(&library).await.unwrap();
    std::fs::remove_file(&gone).unwrap();

    let available = catalog.get_tracks(50, 0, None, true).await.unwrap();
    assert_eq!(available.len(), 1);
    assert_eq!(available[0].title, "Kept");
    assert_eq!(catalog.get_tracks(50, 0, None, false).await.unwrap().len(), 2);
}

#[tokio::test]
async fn rescan_links_enhanced_file_written_later() {
    let (dir, catalog, scanner) = setup().await;
    let library = dir.path().join("library");
    write_wav(&library.join("Band - One.wav"), 1000);

    scanner.scan(&library).await.unwrap();
    let id = catalog.get_tracks(1, 0, None, true).await.unwrap()[0].id.clone();
    assert!(!catalog.get_track(&id).await.unwrap().unwrap().has_enhanced_version);

    let enhanced = write_wav(&library.join("Band - One_enhanced.wav"), 1000);
    scanner.scan(&library).await.unwrap();

    let track = catalog.get_track(&id).await.unwrap().unwrap();
    assert!(track.has_enhanced_version);
    assert_eq!(
        track.enhanced_file_path.as_deref(),
        Some(enhanced.to_string_lossy().as_ref())
    );
}

#[tokio::test]
async fn playlists_share_the_catalog_pool() {
    let (dir, catalog, scanner) = setup().await;
    let library = dir.path().join("library");
    write_wav(&library.join("Band - One.wav"), 1000);
    scanner.scan(&library).await.unwrap();

    let playlists = PlaylistDatabase::new(catalog.pool().clone()).await.unwrap();
    let playlist = playlists
        .create_playlist(PlaylistCreate {
            name: "Mix".to_string(),
            description: None,
        })
        .await
        .unwrap();

    let track = &catalog.get_tracks(1, 0, None, true).await.unwrap()[0];
    let updated = playlists
        .add_track_to_playlist(&playlist.id, &track.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.tracks, vec![track.id.clone()]);

    assert_eq!(catalog.get_stats().await.unwrap().total_playlists, 1);
}
