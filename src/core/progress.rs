//! Transfer progress and per-item status events

use crate::core::media::MediaItem;
use crate::core::outcome::DownloadOutcome;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Progress information for a transfer, as reported by the engine
#[derive(Debug, Clone)]
pub struct Progress {
    /// Total size of the file in bytes (0 if unknown)
    pub total_size: u64,
    /// Number of bytes transferred
    pub downloaded_size: u64,
    /// Transfer progress as a percentage (0.0 to 100.0)
    pub percent: f64,
    /// Current speed in bytes per second
    pub speed: Option<f64>,
    /// Estimated time remaining
    pub eta: Option<Duration>,
    /// Time when the transfer started
    pub start_time: Instant,
}

impl Progress {
    /// Create a new progress tracker
    pub fn new(total_size: u64) -> Self {
        Self {
            total_size,
            downloaded_size: 0,
            percent: 0.0,
            speed: None,
            eta: None,
            start_time: Instant::now(),
        }
    }

    /// Update progress with new transferred size
    pub fn update(&mut self, downloaded_size: u64) {
        self.downloaded_size = downloaded_size;
        self.percent = if self.total_size > 0 {
            (downloaded_size as f64 / self.total_size as f64) * 100.0
        } else {
            0.0
        };

        let elapsed = self.start_time.elapsed();
        if elapsed.as_millis() > 0 {
            self.speed = Some(downloaded_size as f64 / elapsed.as_secs_f64());

            if let Some(speed) = self.speed {
                if speed > 0.0 && self.total_size > downloaded_size {
                    let remaining_bytes = self.total_size - downloaded_size;
                    self.eta = Some(Duration::from_secs((remaining_bytes as f64 / speed) as u64));
                }
            }
        }
    }

    /// Check if transfer is complete
    pub fn is_complete(&self) -> bool {
        self.total_size > 0 && self.downloaded_size >= self.total_size
    }
}

/// Callback the engine invokes with transfer progress
pub type ProgressCallback = std::sync::Arc<dyn Fn(Progress) + Send + Sync>;

/// Discrete status of one item
#[derive(Debug, Clone, PartialEq)]
pub enum ItemStatus {
    Queued,
    Resolving,
    Transferring { percent: f64 },
    Done,
    Skipped,
    Failed { reason: String },
}

impl ItemStatus {
    /// Exactly one terminal status is emitted per item
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ItemStatus::Done | ItemStatus::Skipped | ItemStatus::Failed { .. }
        )
    }
}

/// Status event tagged with the item it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct ItemEvent {
    pub item_id: String,
    pub title: String,
    pub position: Option<usize>,
    pub status: ItemStatus,
}

/// Producer side of the status event stream.
///
/// Sending never blocks; events are dropped silently once the consumer
/// has gone away.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<ItemEvent>>,
}

impl EventSink {
    /// Create a sink and the receiver a presentation layer drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ItemEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Sink that discards everything
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: ItemEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

/// Emits events for one item slot.
///
/// A substitute download reports through the reporter of the member it
/// replaces, so the presentation layer sees one item either way.
#[derive(Debug, Clone)]
pub struct ItemReporter {
    sink: EventSink,
    item_id: String,
    title: String,
    position: Option<usize>,
}

impl ItemReporter {
    pub fn new(sink: EventSink, item: &MediaItem) -> Self {
        Self {
            sink,
            item_id: item.id.clone(),
            title: item.title.clone(),
            position: item.position,
        }
    }

    pub fn status(&self, status: ItemStatus) {
        self.sink.emit(ItemEvent {
            item_id: self.item_id.clone(),
            title: self.title.clone(),
            position: self.position,
            status,
        });
    }

    /// Emit the terminal event matching `outcome`
    pub fn finish(&self, outcome: &DownloadOutcome) {
        let status = match outcome {
            DownloadOutcome::Succeeded { .. } | DownloadOutcome::Substituted { .. } => ItemStatus::Done,
            DownloadOutcome::SkippedExisting { .. } => ItemStatus::Skipped,
            DownloadOutcome::Failed { reason, .. } => ItemStatus::Failed {
                reason: reason.to_string(),
            },
        };
        self.status(status);
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f64 = bytes as f64;
    let exp = (bytes_f64.ln() / THRESHOLD.ln()).floor() as usize;
    let exp = exp.min(UNITS.len() - 1);

    let value = bytes_f64 / THRESHOLD.powi(exp as i32);

    if exp == 0 {
        format!("{} {}", bytes, UNITS[exp])
    } else {
        format!("{:.1} {}", value, UNITS[exp])
    }
}

/// Format duration as human-readable string
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    if total_seconds < 60 {
        format!("{}s", total_seconds)
    } else if total_seconds < 3600 {
        let minutes = total_seconds / 60;
        let seconds = total_seconds % 60;
        if seconds == 0 {
            format!("{}m", minutes)
        } else {
            format!("{}m {}s", minutes, seconds)
        }
    } else {
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        if minutes == 0 {
            format!("{}h", hours)
        } else {
            format!("{}h {}m", hours, minutes)
        }
    }
}

/// Format seconds as MM:SS or HH:MM:SS
pub fn format_clock(seconds: u32) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let seconds = seconds % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}
