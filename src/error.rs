//! Error types for ytgrab

use crate::core::outcome::FailureReason;
use crate::platform::engine::EngineError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for ytgrab operations
#[derive(Debug, Error)]
pub enum GrabError {
    #[error("Format '{code}' is not available for item {item_id}")]
    FormatNotFound { code: String, item_id: String },

    #[error("Invalid playlist selection: {reason}")]
    InvalidRange { reason: String },

    #[error("Download ledger {} is corrupt at line {line}: {reason}", path.display())]
    LedgerCorrupt {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Download of {item_id} failed: {reason}")]
    ItemFailed {
        item_id: String,
        reason: FailureReason,
    },

    #[error("URL points to a playlist (use --playlist to download it)")]
    UnexpectedPlaylist,

    #[error("URL does not point to a playlist")]
    NotAPlaylist,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("{operation} timed out after {}", humantime::format_duration(*after))]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Extraction engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),
}

impl GrabError {
    /// Errors that stop a run before any item is touched
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            GrabError::InvalidRange { .. } | GrabError::LedgerCorrupt { .. }
        )
    }

    pub(crate) fn invalid_range(reason: impl Into<String>) -> Self {
        GrabError::InvalidRange {
            reason: reason.into(),
        }
    }
}
