//! # ytgrab - playlist-aware media downloader
//!
//! Orchestrates downloads through an external extraction engine (`yt-dlp`).
//!
//! ## Features
//!
//! - Format catalog listing and best/audio-only/explicit format resolution
//! - Download ledger that skips items fetched in earlier runs
//! - Playlist downloads with range selection and bounded concurrency
//! - Substitute search for unavailable playlist members
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ytgrab::{Downloader, FormatRequest, ItemFilter, YtDlpEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = Downloader::new(Arc::new(YtDlpEngine::new()))
//!         .with_format(FormatRequest::AudioOnly)
//!         .with_output_dir("./downloads");
//!
//!     let summary = downloader
//!         .download_playlist("PLAYLIST_URL", &ItemFilter::Range { start: 1, end: Some(10) })
//!         .await?;
//!     println!("{} item(s) processed", summary.outcomes.len());
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod core;
pub mod download;
pub mod error;
pub mod ledger;
pub mod platform;
pub mod utils;

// Re-export main types
pub use core::{
    DownloadOptions, DownloadOutcome, Downloader, FailureReason, FormatDescriptor, FormatRequest,
    FormatSelection, MediaItem, Playlist, RunSummary,
};
pub use download::{FallbackConfig, ItemFilter, PlaylistOrchestrator, TaskOptions};
pub use error::GrabError;
pub use ledger::{FileLedger, HistoryLedger, MemoryLedger, SharedLedger};
pub use platform::{ExtractionEngine, YtDlpEngine};

/// Result type alias for ytgrab operations
pub type Result<T> = std::result::Result<T, GrabError>;
