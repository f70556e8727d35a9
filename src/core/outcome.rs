//! Per-item download outcomes and run summaries

use crate::platform::engine::EngineError;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Why an item could not be downloaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "category", content = "detail", rename_all = "kebab-case")]
pub enum FailureReason {
    #[error("format {0} is not available")]
    FormatUnavailable(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("restricted: {0}")]
    Restricted(String),

    #[error("timed out after {}", humantime::format_duration(*.0))]
    Timeout(#[serde(serialize_with = "serialize_duration")] Duration),

    #[error("cancelled before start")]
    Cancelled,

    #[error("filesystem error: {0}")]
    Io(String),

    #[error("engine error: {0}")]
    Engine(String),
}

impl FailureReason {
    pub fn timeout(after: Duration) -> Self {
        FailureReason::Timeout(after)
    }

    /// Short category tag
    pub fn category(&self) -> &'static str {
        match self {
            FailureReason::FormatUnavailable(_) => "format-unavailable",
            FailureReason::Network(_) => "network",
            FailureReason::Unavailable(_) => "unavailable",
            FailureReason::Restricted(_) => "restricted",
            FailureReason::Timeout(_) => "timeout",
            FailureReason::Cancelled => "cancelled",
            FailureReason::Io(_) => "io",
            FailureReason::Engine(_) => "engine",
        }
    }

    /// Failures the playlist orchestrator may route through the fallback
    /// resolver: the item is gone, blocked, or never answered.
    pub fn is_availability_related(&self) -> bool {
        matches!(
            self,
            FailureReason::Unavailable(_) | FailureReason::Restricted(_) | FailureReason::Timeout(_)
        )
    }
}

impl From<EngineError> for FailureReason {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::Unavailable(msg) => FailureReason::Unavailable(msg),
            EngineError::Restricted(msg) => FailureReason::Restricted(msg),
            EngineError::Network(msg) => FailureReason::Network(msg),
            EngineError::Io(err) => FailureReason::Io(err.to_string()),
            other => FailureReason::Engine(other.to_string()),
        }
    }
}

fn serialize_duration<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&humantime::format_duration(*duration))
}

/// Outcome of one item within one run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum DownloadOutcome {
    Succeeded {
        item_id: String,
        path: PathBuf,
        /// Audio had to be isolated from a muxed stream
        audio_extracted: bool,
    },
    SkippedExisting {
        item_id: String,
        path: PathBuf,
    },
    Failed {
        item_id: String,
        reason: FailureReason,
    },
    Substituted {
        original_id: String,
        substitute_id: String,
        path: PathBuf,
    },
}

impl DownloadOutcome {
    /// Identifier of the item this outcome is about
    pub fn item_id(&self) -> &str {
        match self {
            DownloadOutcome::Succeeded { item_id, .. }
            | DownloadOutcome::SkippedExisting { item_id, .. }
            | DownloadOutcome::Failed { item_id, .. } => item_id,
            DownloadOutcome::Substituted { original_id, .. } => original_id,
        }
    }

    /// File on disk, if the item ended up there
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            DownloadOutcome::Succeeded { path, .. }
            | DownloadOutcome::SkippedExisting { path, .. }
            | DownloadOutcome::Substituted { path, .. } => Some(path),
            DownloadOutcome::Failed { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            DownloadOutcome::Failed { reason, .. } => Some(reason),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, DownloadOutcome::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            DownloadOutcome::Succeeded { .. } => "downloaded",
            DownloadOutcome::SkippedExisting { .. } => "skipped",
            DownloadOutcome::Failed { .. } => "failed",
            DownloadOutcome::Substituted { .. } => "substituted",
        }
    }
}

/// Counts per outcome kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub substituted: usize,
}

/// Summary of one playlist run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Playlist title
    pub title: String,
    /// Directory the members were written to
    pub output_dir: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Outcomes in playlist order
    pub outcomes: Vec<DownloadOutcome>,
}

impl RunSummary {
    pub fn counts(&self) -> OutcomeCounts {
        self.outcomes
            .iter()
            .fold(OutcomeCounts::default(), |mut counts, outcome| {
                match outcome {
                    DownloadOutcome::Succeeded { .. } => counts.succeeded += 1,
                    DownloadOutcome::SkippedExisting { .. } => counts.skipped += 1,
                    DownloadOutcome::Failed { .. } => counts.failed += 1,
                    DownloadOutcome::Substituted { .. } => counts.substituted += 1,
                }
                counts
            })
    }

    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(DownloadOutcome::is_failed)
    }

    pub fn elapsed(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }
}
