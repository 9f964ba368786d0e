//! Music Vault - a personal music library server
//!
//! Scans a folder of audio files into a SQLite catalog and serves it through
//! a Spotify-shaped HTTP API, with ffmpeg enhancement and yt-dlp downloads.

pub mod audio;
pub mod catalog;
pub mod downloader;
pub mod enhancer;
pub mod lyrics;
pub mod playlist;
pub mod responses;
pub mod scanner;
pub mod server;
