//! Boundary to the external extraction/transfer engine

use crate::core::media::{ItemDetails, MediaItem, Probe};
use crate::core::progress::ProgressCallback;
use std::path::PathBuf;
use thiserror::Error;

/// Categorized engine failure
#[derive(Debug, Error)]
pub enum EngineError {
    /// Item removed, private, or otherwise gone
    #[error("{0}")]
    Unavailable(String),

    /// Geo-blocked, age-gated, members-only
    #[error("{0}")]
    Restricted(String),

    /// Connection or HTTP level failure
    #[error("{0}")]
    Network(String),

    /// Engine binary missing or exited without a usable result
    #[error("{0}")]
    Process(String),

    /// Engine output could not be understood
    #[error("unexpected engine output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio post-processing applied by the engine after transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioExtraction {
    /// Target codec (e.g. "mp3")
    pub codec: String,
    /// Target quality (e.g. "192")
    pub quality: String,
}

impl Default for AudioExtraction {
    fn default() -> Self {
        Self {
            codec: "mp3".to_string(),
            quality: "192".to_string(),
        }
    }
}

/// Everything the engine needs to transfer one item
#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// Item identifier
    pub item_id: String,
    /// URL or identifier the engine resolves
    pub source: String,
    /// Engine format spec
    pub format_spec: String,
    /// Target directory
    pub output_dir: PathBuf,
    /// File name without extension
    pub file_stem: String,
    /// Audio post-processing, if any
    pub audio: Option<AudioExtraction>,
}

/// Extraction engine capabilities the orchestration layer consumes
#[async_trait::async_trait]
pub trait ExtractionEngine: Send + Sync {
    /// Name of the engine (for logging)
    fn name(&self) -> &'static str;

    /// Resolve a URL into item or playlist metadata
    async fn probe(&self, url: &str) -> Result<Probe, EngineError>;

    /// Fetch full metadata, including formats, for one item
    async fn item_details(&self, item: &MediaItem) -> Result<ItemDetails, EngineError>;

    /// Search for items matching a free-text query, best match first
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<MediaItem>, EngineError>;

    /// Transfer an item to disk, returning the final file path
    async fn transfer(
        &self,
        request: &TransferRequest,
        progress: ProgressCallback,
    ) -> Result<PathBuf, EngineError>;
}
