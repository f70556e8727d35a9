//! Main downloader implementation

use crate::core::catalog::{self, FormatDescriptor, FormatRequest};
use crate::core::media::{ItemDetails, Probe};
use crate::core::outcome::{DownloadOutcome, FailureReason, RunSummary};
use crate::core::progress::{EventSink, ItemReporter, ItemStatus};
use crate::download::{DownloadTask, FallbackConfig, ItemFilter, PlaylistOrchestrator, TaskOptions, TaskTarget};
use crate::error::GrabError;
use crate::ledger::{self, FileLedger, MemoryLedger, SharedLedger, DEFAULT_LEDGER_FILE};
use crate::platform::engine::{AudioExtraction, ExtractionEngine};
use crate::utils::filename::item_stem;
use crate::utils::url::normalize_target;
use crate::Result;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Main downloader configuration
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Directory items are written to
    pub output_dir: PathBuf,
    /// Ledger file; defaults to `archive.txt` in the output directory
    pub archive_path: Option<PathBuf>,
    /// Persist the ledger at all
    pub use_archive: bool,
    /// Requested format
    pub format: FormatRequest,
    /// Single-item task settings
    pub task: TaskOptions,
    /// Substitute lookup settings
    pub fallback: FallbackConfig,
    /// Playlist members processed at the same time
    pub concurrency: usize,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./downloads"),
            archive_path: None,
            use_archive: true,
            format: FormatRequest::Best,
            task: TaskOptions::default(),
            fallback: FallbackConfig::default(),
            concurrency: 1,
        }
    }
}

/// Entry point tying the engine, the ledger and the download components together
pub struct Downloader {
    engine: Arc<dyn ExtractionEngine>,
    options: DownloadOptions,
    events: EventSink,
    cancel: CancellationToken,
    ledger: Option<SharedLedger>,
}

impl Downloader {
    /// Create a new downloader with default options
    pub fn new(engine: Arc<dyn ExtractionEngine>) -> Self {
        Self {
            engine,
            options: DownloadOptions::default(),
            events: EventSink::disabled(),
            cancel: CancellationToken::new(),
            ledger: None,
        }
    }

    pub fn with_options(mut self, options: DownloadOptions) -> Self {
        self.options = options;
        self
    }

    /// Set output directory
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.options.output_dir = dir.into();
        self
    }

    /// Set requested format
    pub fn with_format(mut self, format: FormatRequest) -> Self {
        self.options.format = format;
        self
    }

    /// Use a ledger file other than the default
    pub fn with_archive(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.archive_path = Some(path.into());
        self.options.use_archive = true;
        self
    }

    /// Keep the ledger in memory only
    pub fn without_archive(mut self) -> Self {
        self.options.use_archive = false;
        self
    }

    pub fn with_skip_existing(mut self, skip_existing: bool) -> Self {
        self.options.task.skip_existing = skip_existing;
        self
    }

    /// Limit for each engine call
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options.task.timeout = timeout;
        self
    }

    pub fn with_audio(mut self, audio: AudioExtraction) -> Self {
        self.options.task.audio = audio;
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackConfig) -> Self {
        self.options.fallback = fallback;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.options.concurrency = concurrency.max(1);
        self
    }

    /// Send status events to `events`
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Use an already opened ledger instead of loading one per run
    pub fn with_ledger(mut self, ledger: SharedLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn options(&self) -> &DownloadOptions {
        &self.options
    }

    /// Location of the ledger file
    pub fn ledger_path(&self) -> PathBuf {
        self.options
            .archive_path
            .clone()
            .unwrap_or_else(|| self.options.output_dir.join(DEFAULT_LEDGER_FILE))
    }

    async fn open_ledger(&self) -> Result<SharedLedger> {
        if let Some(ledger) = &self.ledger {
            return Ok(ledger.clone());
        }
        if !self.options.use_archive {
            return Ok(ledger::shared(MemoryLedger::new()));
        }
        let file = FileLedger::load(self.ledger_path()).await?;
        Ok(ledger::shared(file))
    }

    /// Resolve a URL into item or playlist metadata.
    ///
    /// Bounded by the same per-call timeout as the engine calls of a task.
    pub async fn probe(&self, url: &str) -> Result<Probe> {
        let target = normalize_target(url)?;
        let after = self.options.task.timeout;
        match tokio::time::timeout(after, self.engine.probe(&target)).await {
            Ok(probe) => Ok(probe?),
            Err(_) => Err(GrabError::Timeout {
                operation: "probe",
                after,
            }),
        }
    }

    /// Catalog of a single item
    pub async fn list_formats(&self, url: &str) -> Result<(ItemDetails, Vec<FormatDescriptor>)> {
        match self.probe(url).await? {
            Probe::Item(details) => {
                let formats = catalog::list_formats(&details);
                Ok((*details, formats))
            }
            Probe::Playlist(_) => Err(GrabError::UnexpectedPlaylist),
        }
    }

    /// Download a single item.
    ///
    /// Every failure is returned as an error: a missing format as
    /// [`GrabError::FormatNotFound`], anything else as [`GrabError::ItemFailed`].
    pub async fn download(&self, url: &str) -> Result<DownloadOutcome> {
        let ledger = self.open_ledger().await?;
        let details = match self.probe(url).await? {
            Probe::Item(details) => details,
            Probe::Playlist(_) => return Err(GrabError::UnexpectedPlaylist),
        };
        let item = &details.item;

        let reporter = ItemReporter::new(self.events.clone(), item);
        reporter.status(ItemStatus::Queued);

        let outcome = if self.cancel.is_cancelled() {
            DownloadOutcome::Failed {
                item_id: item.id.clone(),
                reason: FailureReason::Cancelled,
            }
        } else {
            let task = DownloadTask::new(self.engine.clone(), ledger, self.options.task.clone());
            let target = TaskTarget::new(&self.options.output_dir, item_stem(&item.title, &item.id));
            task.run(item, &self.options.format, &target, &reporter).await
        };
        reporter.finish(&outcome);

        match outcome {
            DownloadOutcome::Failed {
                item_id,
                reason: FailureReason::FormatUnavailable(code),
            } => Err(GrabError::FormatNotFound { code, item_id }),
            DownloadOutcome::Failed { item_id, reason } => Err(GrabError::ItemFailed { item_id, reason }),
            outcome => Ok(outcome),
        }
    }

    /// Download the selected members of a playlist.
    ///
    /// Fails only on errors that prevent the run from starting; member
    /// failures are part of the summary.
    pub async fn download_playlist(&self, url: &str, filter: &ItemFilter) -> Result<RunSummary> {
        let ledger = self.open_ledger().await?;
        let playlist = match self.probe(url).await? {
            Probe::Playlist(playlist) => playlist,
            Probe::Item(_) => return Err(GrabError::NotAPlaylist),
        };

        let started_at = Utc::now();
        let orchestrator = PlaylistOrchestrator::new(self.engine.clone(), ledger)
            .with_task_options(self.options.task.clone())
            .with_fallback(self.options.fallback.clone())
            .with_concurrency(self.options.concurrency)
            .with_events(self.events.clone())
            .with_cancellation(self.cancel.clone());

        let outcomes = orchestrator
            .run(&playlist, filter, &self.options.format, &self.options.output_dir)
            .await?;

        let summary = RunSummary {
            output_dir: PlaylistOrchestrator::playlist_dir(&playlist, &self.options.output_dir),
            title: playlist.title,
            started_at,
            finished_at: Utc::now(),
            outcomes,
        };

        let counts = summary.counts();
        info!(
            "Playlist finished: {} downloaded, {} substituted, {} skipped, {} failed",
            counts.succeeded, counts.substituted, counts.skipped, counts.failed
        );
        Ok(summary)
    }
}
