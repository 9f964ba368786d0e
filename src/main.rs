use anyhow::{Context, Result};
use clap::Parser;
use music_vault::catalog::{CatalogDatabase, CatalogStore};
use music_vault::downloader::YouTubeDownloader;
use music_vault::enhancer::AudioEnhancer;
use music_vault::lyrics::LyricsClient;
use music_vault::playlist::PlaylistDatabase;
use music_vault::responses::Presenter;
use music_vault::scanner::MusicScanner;
use music_vault::server::{self, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "music-vault")]
#[command(about = "Personal music library server", long_about = None)]
struct Cli {
    /// Path to music library folder
    #[arg(short, long, env = "MUSIC_FOLDER", default_value = "./music_library")]
    library: PathBuf,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "8000")]
    port: u16,

    /// SQLite catalog file
    #[arg(long, env = "MUSIC_DB_PATH", default_value = "./music_library.db")]
    database: PathBuf,

    /// Where extracted album covers are written
    #[arg(long, env = "COVERS_DIR", default_value = "./covers")]
    covers_dir: PathBuf,

    /// Placeholder images served under /images
    #[arg(long, env = "PUBLIC_IMAGES_DIR")]
    images_dir: Option<PathBuf>,

    /// Base URL used in image links (defaults to http://localhost:<port>)
    #[arg(long, env = "PUBLIC_URL")]
    public_url: Option<String>,

    #[arg(long, env = "FFMPEG_PATH", default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    #[arg(long, env = "FFPROBE_PATH", default_value = "ffprobe")]
    ffprobe: PathBuf,

    #[arg(long, env = "YT_DLP_PATH", default_value = "yt-dlp")]
    yt_dlp: PathBuf,

    /// Skip the library scan at startup
    #[arg(long)]
    no_scan: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    let cli = Cli::parse();

    if cli.library.exists() && !cli.library.is_dir() {
        anyhow::bail!("Library path is not a directory: {}", cli.library.display());
    }

    tracing::info!("Starting music vault");
    tracing::info!("Library path: {}", cli.library.display());
    tracing::info!("Catalog: {}", cli.database.display());

    let catalog = CatalogDatabase::new(&cli.database)
        .await
        .context("Failed to open catalog database")?;
    let playlists = PlaylistDatabase::new(catalog.pool().clone())
        .await
        .context("Failed to initialize playlists")?;

    let store: Arc<dyn CatalogStore> = Arc::new(catalog.clone());
    let scanner = Arc::new(MusicScanner::new(store, &cli.covers_dir));

    if cli.no_scan {
        tracing::info!("Skipping startup scan");
    } else {
        let summary = scanner
            .scan(&cli.library)
            .await
            .context("Failed to scan library")?;
        tracing::info!(
            "Startup scan: {} cataloged, {} skipped",
            summary.cataloged,
            summary.skipped
        );
    }

    let enhancer = AudioEnhancer::new(&cli.ffmpeg, &cli.ffprobe);
    if !enhancer.verify_ffmpeg().await {
        tracing::warn!("Audio enhancement disabled until ffmpeg is available");
    }

    let downloader = YouTubeDownloader::new(&cli.yt_dlp, &cli.library, LyricsClient::new()?);
    if !downloader.is_available().await {
        tracing::warn!("yt-dlp not found, downloads will fail");
    }

    let public_url = cli
        .public_url
        .unwrap_or_else(|| format!("http://localhost:{}", cli.port));

    let state = AppState {
        catalog,
        playlists,
        scanner,
        enhancer,
        downloader,
        presenter: Presenter::new(public_url),
        library_root: cli.library.clone(),
    };

    let app = server::create_router(state, cli.images_dir.as_deref());
    let addr = format!("0.0.0.0:{}", cli.port);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
