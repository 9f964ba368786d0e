mod common;

use anyhow::Result;
use async_trait::async_trait;
use music_vault::catalog::{CatalogRecord, CatalogStore};
use music_vault::scanner::{MusicScanner, UNKNOWN_ALBUM, UNKNOWN_ARTIST, generate_id};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use common::{png_bytes, write_flac, write_tagged_wav, write_wav};

#[derive(Default)]
struct MemoryStore {
    tracks: Mutex<HashMap<String, CatalogRecord>>,
}

impl MemoryStore {
    fn records(&self) -> Vec<CatalogRecord> {
        let mut records: Vec<_> = self.tracks.lock().unwrap().values().cloned().collect();
        records.sort_by(|a, b| a.file_path.cmp(&b.file_path));
        records
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn upsert_track(&self, record: &CatalogRecord) -> Result<()> {
        self.tracks
            .lock()
            .unwrap()
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn update_enhanced_info(&self, track_id: &str, enhanced_path: &str) -> Result<()> {
        let mut tracks = self.tracks.lock().unwrap();
        let record = tracks
            .get_mut(track_id)
            .ok_or_else(|| anyhow::anyhow!("unknown track {}", track_id))?;
        record.has_enhanced_version = true;
        record.enhanced_file_path = Some(enhanced_path.to_string());
        Ok(())
    }
}

fn scanner(store: &Arc<MemoryStore>, covers: &Path) -> MusicScanner {
    MusicScanner::new(store.clone(), covers)
}

#[tokio::test]
async fn untagged_file_takes_metadata_from_filename() {
    let library = tempfile::tempdir().unwrap();
    let covers = tempfile::tempdir().unwrap();
    let path = write_wav(&library.path().join("Band - Song.wav"), 1000);

    let store = Arc::new(MemoryStore::default());
    let summary = scanner(&store, covers.path()).scan(library.path()).await.unwrap();

    assert_eq!(summary.discovered, 1);
    assert_eq!(summary.cataloged, 1);

    let records = store.records();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    let file_path = path.to_string_lossy().into_owned();
    assert_eq!(record.id, generate_id(&file_path));
    assert_eq!(record.file_path, file_path);
    assert_eq!(record.title, "Song");
    assert_eq!(record.artist, "Band");
    assert_eq!(record.artist_id, generate_id("Band"));
    assert_eq!(record.album, UNKNOWN_ALBUM);
    assert_eq!(record.album_id, generate_id(&format!("Band-{}", UNKNOWN_ALBUM)));
    assert_eq!(record.duration_ms, 1000);
    assert_eq!(record.cover_image_path, None);
    assert!(!record.has_enhanced_version);
}

#[tokio::test]
async fn plain_filename_becomes_title() {
    let library = tempfile::tempdir().unwrap();
    let covers = tempfile::tempdir().unwrap();
    write_wav(&library.path().join("untitled take.wav"), 500);

    let store = Arc::new(MemoryStore::default());
    scanner(&store, covers.path()).scan(library.path()).await.unwrap();

    let records = store.records();
    assert_eq!(records[0].title, "untitled take");
    assert_eq!(records[0].artist, UNKNOWN_ARTIST);
}

#[tokio::test]
async fn rescan_is_idempotent() {
    let library = tempfile::tempdir().unwrap();
    let covers = tempfile::tempdir().unwrap();
    write_wav(&library.path().join("A - One.wav"), 200);
    write_wav(&library.path().join("nested/B - Two.wav"), 300);

    let store = Arc::new(MemoryStore::default());
    let scanner = scanner(&store, covers.path());

    scanner.scan(library.path()).await.unwrap();
    let first = store.records();
    let summary = scanner.scan(library.path()).await.unwrap();

    assert_eq!(summary.cataloged, 2);
    assert_eq!(store.records(), first);
}

#[tokio::test]
async fn enhanced_variant_is_linked_not_cataloged() {
    let library = tempfile::tempdir().unwrap();
    let covers = tempfile::tempdir().unwrap();
    let original = write_wav(&library.path().join("Band - Song.wav"), 400);
    let enhanced = write_wav(&library.path().join("Band - Song_enhanced.wav"), 400);

    let store = Arc::new(MemoryStore::default());
    let summary = scanner(&store, covers.path()).scan(library.path()).await.unwrap();

    assert_eq!(summary.discovered, 2);
    assert_eq!(summary.enhanced_variants, 1);
    assert_eq!(summary.cataloged, 1);

    let records = store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].file_path, original.to_string_lossy());
    assert!(records[0].has_enhanced_version);
    assert_eq!(
        records[0].enhanced_file_path.as_deref(),
        Some(enhanced.to_string_lossy().as_ref())
    );
}

#[tokio::test]
async fn unreadable_file_is_skipped() {
    let library = tempfile::tempdir().unwrap();
    let covers = tempfile::tempdir().unwrap();
    std::fs::write(library.path().join("broken.mp3"), b"this is not audio at all").unwrap();
    write_wav(&library.path().join("Band - Song.wav"), 250);

    let store = Arc::new(MemoryStore::default());
    let summary = scanner(&store, covers.path()).scan(library.path()).await.unwrap();

    assert_eq!(summary.discovered, 2);
    assert_eq!(summary.cataloged, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(store.records().len(), 1);
}

#[tokio::test]
async fn sibling_lyrics_are_attached() {
    let library = tempfile::tempdir().unwrap();
    let covers = tempfile::tempdir().unwrap();
    write_wav(&library.path().join("album/Band - Song.wav"), 250);
    std::fs::write(library.path().join("album/lyrics.lrc"), "[00:01.00]Hello").unwrap();

    let store = Arc::new(MemoryStore::default());
    scanner(&store, covers.path()).scan(library.path()).await.unwrap();

    assert_eq!(store.records()[0].lyrics.as_deref(), Some("[00:01.00]Hello"));
}

#[tokio::test]
async fn missing_root_is_created() {
    let parent = tempfile::tempdir().unwrap();
    let covers = tempfile::tempdir().unwrap();
    let root = parent.path().join("does/not/exist");

    let store = Arc::new(MemoryStore::default());
    let summary = scanner(&store, covers.path()).scan(&root).await.unwrap();

    assert!(root.is_dir());
    assert_eq!(summary.discovered, 0);
    assert!(store.records().is_empty());
}

#[tokio::test]
async fn process_file_reports_the_written_record() {
    let library = tempfile::tempdir().unwrap();
    let covers = tempfile::tempdir().unwrap();
    let path = write_wav(&library.path().join("Band - Song.wav"), 250);

    let store = Arc::new(MemoryStore::default());
    let record = scanner(&store, covers.path())
        .process_file(&path, Some(&library.path().join("missing_enhanced.wav")))
        .await
        .unwrap();

    assert_eq!(record.title, "Song");
    assert!(!record.has_enhanced_version);
    assert_eq!(store.records(), vec![record]);
}

#[tokio::test]
async fn relative_root_matches_absolute_file_paths() {
    // relative to the test's working directory
    let library = tempfile::tempdir_in(".").unwrap();
    let covers = tempfile::tempdir().unwrap();
    assert!(library.path().is_relative());
    let path = write_wav(&library.path().join("Band - Song.wav"), 250);
    let absolute = std::path::absolute(&path).unwrap();

    let store = Arc::new(MemoryStore::default());
    let scanner = scanner(&store, covers.path());
    scanner.process_file(&absolute, None).await.unwrap();
    scanner.scan(library.path()).await.unwrap();

    let records = store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].file_path, absolute.to_string_lossy());
    assert_eq!(records[0].id, generate_id(&absolute.to_string_lossy()));
}

#[tokio::test]
async fn riff_info_tags_lose_their_terminators() {
    let library = tempfile::tempdir().unwrap();
    let covers = tempfile::tempdir().unwrap();
    write_tagged_wav(
        &library.path().join("Real Band - Something Else.wav"),
        500,
        &[
            (b"INAM", "Cool Song"),
            (b"IART", "Some Channel Music"),
            (b"IPRD", "Tape"),
            (b"ITRK", "3/12"),
        ],
    );

    let store = Arc::new(MemoryStore::default());
    scanner(&store, covers.path()).scan(library.path()).await.unwrap();

    let record = &store.records()[0];
    assert_eq!(record.title, "Cool Song");
    assert_eq!(record.artist, "Real Band");
    assert_eq!(record.artist_id, generate_id("Real Band"));
    assert_eq!(record.album, "Tape");
    assert_eq!(record.album_id, generate_id("Real Band-Tape"));
    assert_eq!(record.track_number, Some(3));
    assert_eq!(record.duration_ms, 500);
}

fn tag_flac(path: &Path, artist: &str, album: &str, track: &str, picture: Option<Vec<u8>>) {
    let mut tag = metaflac::Tag::read_from_path(path).unwrap();
    tag.set_vorbis("TITLE", vec!["Cool Song"]);
    tag.set_vorbis("ARTIST", vec![artist]);
    tag.set_vorbis("ALBUM", vec![album]);
    tag.set_vorbis("TRACKNUMBER", vec![track]);
    tag.set_vorbis("DATE", vec!["2019-04-01"]);
    if let Some(data) = picture {
        tag.add_picture("image/png", metaflac::block::PictureType::CoverFront, data);
    }
    tag.save().unwrap();
}

#[tokio::test]
async fn channel_tag_artist_gives_way_to_filename() {
    let library = tempfile::tempdir().unwrap();
    let covers = tempfile::tempdir().unwrap();
    let path = write_flac(&library.path().join("Real Band - Cool Song.flac"), 2000);
    tag_flac(&path, "Some Channel Music", "Singles", "3/12", None);

    let store = Arc::new(MemoryStore::default());
    let record = scanner(&store, covers.path())
        .process_file(&path, None)
        .await
        .unwrap();

    assert_eq!(record.title, "Cool Song");
    assert_eq!(record.artist, "Real Band");
    assert_eq!(record.album, "Singles");
    assert_eq!(record.track_number, Some(3));
    assert_eq!(record.year, Some(2019));
    assert_eq!(record.duration_ms, 2000);
    assert_eq!(record.cover_image_path, None);
}

#[tokio::test]
async fn embedded_picture_becomes_a_bounded_cover() {
    let library = tempfile::tempdir().unwrap();
    let covers = tempfile::tempdir().unwrap();
    let path = write_flac(&library.path().join("Band - Cool Song.flac"), 1000);
    tag_flac(&path, "Band", "Album", "1", Some(png_bytes(1000, 500)));

    let store = Arc::new(MemoryStore::default());
    let scanner = scanner(&store, covers.path());
    let record = scanner.process_file(&path, None).await.unwrap();

    let album_id = generate_id("Band-Album");
    assert_eq!(record.album_id, album_id);
    assert_eq!(record.cover_image_path, Some(format!("/covers/{}.jpg", album_id)));

    let cover = covers.path().join(format!("{}.jpg", album_id));
    let thumbnail = image::open(&cover).unwrap();
    assert_eq!((thumbnail.width(), thumbnail.height()), (640, 320));

    // a second track of the album keeps the existing cover file
    std::fs::write(&cover, b"kept").unwrap();
    let second = write_flac(&library.path().join("Band - Other Song.flac"), 1000);
    tag_flac(&second, "Band", "Album", "2", Some(png_bytes(64, 64)));
    let record = scanner.process_file(&second, None).await.unwrap();

    assert_eq!(record.cover_image_path, Some(format!("/covers/{}.jpg", album_id)));
    assert_eq!(std::fs::read(&cover).unwrap(), b"kept");
}
