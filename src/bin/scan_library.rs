//! Scan a music folder into the catalog once and print the summary as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use music_vault::catalog::{CatalogDatabase, CatalogStore};
use music_vault::scanner::MusicScanner;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scan-library")]
#[command(about = "Scan a music folder into the catalog", long_about = None)]
struct Cli {
    /// Path to music library folder
    #[arg(short, long, env = "MUSIC_FOLDER", default_value = "./music_library")]
    library: PathBuf,

    /// SQLite catalog file
    #[arg(long, env = "MUSIC_DB_PATH", default_value = "./music_library.db")]
    database: PathBuf,

    /// Where extracted album covers are written
    #[arg(long, env = "COVERS_DIR", default_value = "./covers")]
    covers_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let catalog = CatalogDatabase::new(&cli.database)
        .await
        .context("Failed to open catalog database")?;
    let store: Arc<dyn CatalogStore> = Arc::new(catalog.clone());
    let scanner = MusicScanner::new(store, &cli.covers_dir);

    let summary = scanner.scan(&cli.library).await?;
    let stats = catalog.get_stats().await?;

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "summary": summary,
            "library": stats,
        }))?
    );

    Ok(())
}
