//! Single-item download task
//!
//! Drives one item through `pending → resolving-format → transferring →
//! recording → done`, with `error` reachable from the two middle stages.
//! Failures come back as [`DownloadOutcome::Failed`] values; retrying is the
//! caller's business.

use crate::core::catalog::{self, FormatRequest, FormatSelection};
use crate::core::media::{Availability, MediaItem};
use crate::core::outcome::{DownloadOutcome, FailureReason};
use crate::core::progress::{ItemReporter, ItemStatus, Progress, ProgressCallback};
use crate::error::GrabError;
use crate::ledger::{self, SharedLedger};
use crate::platform::engine::{AudioExtraction, ExtractionEngine, TransferRequest};
use crate::utils::filename::find_by_stem;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default limit for a single engine call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Task behavior knobs
#[derive(Debug, Clone)]
pub struct TaskOptions {
    /// Skip items that are recorded and present on disk
    pub skip_existing: bool,
    /// Limit for each engine call
    pub timeout: Duration,
    /// Post-processing for audio-only requests
    pub audio: AudioExtraction,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            skip_existing: true,
            timeout: DEFAULT_TIMEOUT,
            audio: AudioExtraction::default(),
        }
    }
}

impl TaskOptions {
    pub fn with_skip_existing(mut self, skip_existing: bool) -> Self {
        self.skip_existing = skip_existing;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_audio(mut self, audio: AudioExtraction) -> Self {
        self.audio = audio;
        self
    }
}

/// Where the item's file goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskTarget {
    pub output_dir: PathBuf,
    /// File name without extension
    pub file_stem: String,
}

impl TaskTarget {
    pub fn new(output_dir: impl Into<PathBuf>, file_stem: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            file_stem: file_stem.into(),
        }
    }
}

/// Lifecycle stage of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    ResolvingFormat,
    Transferring,
    Recording,
    Done,
    Error,
}

impl TaskState {
    /// Legal transitions. `Pending → Done` is the skip-existing shortcut.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Pending, ResolvingFormat)
                | (Pending, Done)
                | (ResolvingFormat, Transferring)
                | (ResolvingFormat, Error)
                | (Transferring, Recording)
                | (Transferring, Error)
                | (Recording, Done)
        )
    }
}

struct StateTracker<'a> {
    item_id: &'a str,
    state: TaskState,
}

impl<'a> StateTracker<'a> {
    fn new(item_id: &'a str) -> Self {
        Self {
            item_id,
            state: TaskState::Pending,
        }
    }

    fn advance(&mut self, next: TaskState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!("{}: {:?} -> {:?}", self.item_id, self.state, next);
        self.state = next;
    }
}

/// Downloads one item end to end
#[derive(Clone)]
pub struct DownloadTask {
    engine: Arc<dyn ExtractionEngine>,
    ledger: SharedLedger,
    options: TaskOptions,
}

impl DownloadTask {
    pub fn new(engine: Arc<dyn ExtractionEngine>, ledger: SharedLedger, options: TaskOptions) -> Self {
        Self {
            engine,
            ledger,
            options,
        }
    }

    pub fn options(&self) -> &TaskOptions {
        &self.options
    }

    pub fn engine(&self) -> Arc<dyn ExtractionEngine> {
        self.engine.clone()
    }

    /// Run the task. Status events go through `reporter`; the terminal event
    /// is left to the caller, which may still substitute the item.
    pub async fn run(
        &self,
        item: &MediaItem,
        request: &FormatRequest,
        target: &TaskTarget,
        reporter: &ItemReporter,
    ) -> DownloadOutcome {
        let mut tracker = StateTracker::new(&item.id);

        if self.options.skip_existing {
            if let Some(path) = self.existing_download(item, target).await {
                tracker.advance(TaskState::Done);
                info!("Skipping {} ({}), already at {}", item.title, item.id, path.display());
                return DownloadOutcome::SkippedExisting {
                    item_id: item.id.clone(),
                    path,
                };
            }
        }

        tracker.advance(TaskState::ResolvingFormat);
        reporter.status(ItemStatus::Resolving);
        let selection = match self.resolve(item, request).await {
            Ok(selection) => selection,
            Err(reason) => {
                tracker.advance(TaskState::Error);
                return failed(item, reason);
            }
        };

        tracker.advance(TaskState::Transferring);
        let path = match self.transfer(item, request, &selection, target, reporter).await {
            Ok(path) => path,
            Err(reason) => {
                tracker.advance(TaskState::Error);
                return failed(item, reason);
            }
        };

        tracker.advance(TaskState::Recording);
        record_or_warn(&self.ledger, &[&item.id]).await;

        tracker.advance(TaskState::Done);
        info!("Downloaded {} to {}", item.id, path.display());
        DownloadOutcome::Succeeded {
            item_id: item.id.clone(),
            path,
            audio_extracted: selection.requires_audio_extraction,
        }
    }

    /// Finished file for an item that needs no transfer.
    ///
    /// Only recorded items qualify, and only while their file is still on
    /// disk. A file with a matching stem but no record may belong to another
    /// item with the same title, so it never counts.
    async fn existing_download(&self, item: &MediaItem, target: &TaskTarget) -> Option<PathBuf> {
        if !self.ledger.lock().await.contains(&item.id) {
            return None;
        }

        match find_by_stem(&target.output_dir, &target.file_stem).await {
            Ok(Some(path)) => Some(path),
            Ok(None) => {
                warn!(
                    "{} is in the download ledger but '{}' is missing, downloading again",
                    item.id, target.file_stem
                );
                None
            }
            Err(e) => {
                warn!("Could not inspect {}: {}", target.output_dir.display(), e);
                None
            }
        }
    }

    async fn resolve(
        &self,
        item: &MediaItem,
        request: &FormatRequest,
    ) -> Result<FormatSelection, FailureReason> {
        if item.availability == Availability::Unavailable {
            return Err(FailureReason::Unavailable(format!(
                "'{}' is listed as unavailable",
                item.title
            )));
        }

        let details = match tokio::time::timeout(self.options.timeout, self.engine.item_details(item)).await {
            Ok(result) => result.map_err(FailureReason::from)?,
            Err(_) => return Err(FailureReason::timeout(self.options.timeout)),
        };

        let selection = catalog::resolve(&details, request).map_err(|e| match e {
            GrabError::FormatNotFound { code, .. } => FailureReason::FormatUnavailable(code),
            other => FailureReason::Engine(other.to_string()),
        })?;

        if selection.requires_audio_extraction {
            info!(
                "{} has no audio-only stream, audio will be extracted from format {}",
                item.id,
                selection.engine_spec()
            );
        }
        debug!("{}: {} resolved to '{}'", item.id, request, selection.engine_spec());
        Ok(selection)
    }

    async fn transfer(
        &self,
        item: &MediaItem,
        request: &FormatRequest,
        selection: &FormatSelection,
        target: &TaskTarget,
        reporter: &ItemReporter,
    ) -> Result<PathBuf, FailureReason> {
        tokio::fs::create_dir_all(&target.output_dir)
            .await
            .map_err(|e| FailureReason::Io(format!("{}: {}", target.output_dir.display(), e)))?;

        let transfer = TransferRequest {
            item_id: item.id.clone(),
            source: item.source(),
            format_spec: selection.engine_spec(),
            output_dir: target.output_dir.clone(),
            file_stem: target.file_stem.clone(),
            audio: request.is_audio_only().then(|| self.options.audio.clone()),
        };

        reporter.status(ItemStatus::Transferring { percent: 0.0 });
        let callback = throttled_progress(reporter.clone());

        match tokio::time::timeout(self.options.timeout, self.engine.transfer(&transfer, callback)).await {
            Ok(result) => result.map_err(FailureReason::from),
            Err(_) => Err(FailureReason::timeout(self.options.timeout)),
        }
    }
}

/// Forward progress only when the whole-number percentage changes
fn throttled_progress(reporter: ItemReporter) -> ProgressCallback {
    let last = Arc::new(AtomicU64::new(0));
    Arc::new(move |progress: Progress| {
        let percent = progress.percent.clamp(0.0, 100.0);
        let whole = percent.floor() as u64;
        if last.swap(whole, Ordering::Relaxed) != whole {
            reporter.status(ItemStatus::Transferring { percent });
        }
    })
}

fn failed(item: &MediaItem, reason: FailureReason) -> DownloadOutcome {
    warn!("{} ({}) failed: {}", item.title, item.id, reason);
    DownloadOutcome::Failed {
        item_id: item.id.clone(),
        reason,
    }
}

/// Record and flush; a ledger write failure does not undo a finished download
pub(crate) async fn record_or_warn(ledger: &SharedLedger, ids: &[&str]) {
    if let Err(e) = ledger::record_all(ledger, ids).await {
        warn!("Could not update the download ledger for {:?}: {}", ids, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::progress::EventSink;
    use crate::ledger::{HistoryLedger, MemoryLedger};
    use crate::platform::formats::RawFormat;
    use crate::platform::mock::{Failure, MockEngine, Stage};
    use tempfile::TempDir;
    use tokio::sync::Mutex;

    struct Fixture {
        engine: Arc<MockEngine>,
        ledger: Arc<Mutex<MemoryLedger>>,
        task: DownloadTask,
        dir: TempDir,
    }

    fn fixture(engine: MockEngine, ledger: MemoryLedger, options: TaskOptions) -> Fixture {
        let engine = Arc::new(engine);
        let ledger = Arc::new(Mutex::new(ledger));
        let task = DownloadTask::new(engine.clone(), ledger.clone(), options);
        Fixture {
            engine,
            ledger,
            task,
            dir: TempDir::new().unwrap(),
        }
    }

    fn reporter(item: &MediaItem) -> ItemReporter {
        ItemReporter::new(EventSink::disabled(), item)
    }

    #[tokio::test]
    async fn test_successful_download_records_and_flushes() {
        let fx = fixture(MockEngine::new(), MemoryLedger::new(), TaskOptions::default());
        let item = MediaItem::new("abc", "Song");
        let target = TaskTarget::new(fx.dir.path(), "Song");

        let outcome = fx
            .task
            .run(&item, &FormatRequest::Best, &target, &reporter(&item))
            .await;

        let expected = fx.dir.path().join("Song.mp4");
        assert_eq!(
            outcome,
            DownloadOutcome::Succeeded {
                item_id: "abc".into(),
                path: expected.clone(),
                audio_extracted: false,
            }
        );
        assert!(expected.exists());

        let transfers = fx.engine.transfers();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].format_spec, "137+251");
        assert!(transfers[0].audio.is_none());

        let ledger = fx.ledger.lock().await;
        assert!(ledger.contains("abc"));
        assert_eq!(ledger.flushes(), 1);
    }

    #[tokio::test]
    async fn test_skip_existing_leaves_ledger_and_engine_alone() {
        let fx = fixture(
            MockEngine::new(),
            MemoryLedger::with_ids(["abc"]),
            TaskOptions::default(),
        );
        std::fs::write(fx.dir.path().join("Song.mp4"), b"done").unwrap();
        let item = MediaItem::new("abc", "Song");
        let target = TaskTarget::new(fx.dir.path(), "Song");

        for _ in 0..2 {
            let outcome = fx
                .task
                .run(&item, &FormatRequest::Best, &target, &reporter(&item))
                .await;
            assert!(matches!(outcome, DownloadOutcome::SkippedExisting { .. }));
        }

        assert_eq!(fx.engine.member_calls(), 0);
        let ledger = fx.ledger.lock().await;
        assert!(ledger.records().is_empty());
        assert_eq!(ledger.flushes(), 0);
    }

    #[tokio::test]
    async fn test_recorded_but_missing_is_downloaded_again() {
        let fx = fixture(
            MockEngine::new(),
            MemoryLedger::with_ids(["abc"]),
            TaskOptions::default(),
        );
        let item = MediaItem::new("abc", "Song");
        let target = TaskTarget::new(fx.dir.path(), "Song");

        let outcome = fx
            .task
            .run(&item, &FormatRequest::Best, &target, &reporter(&item))
            .await;
        assert!(matches!(outcome, DownloadOutcome::Succeeded { .. }));
        assert_eq!(fx.engine.transfers().len(), 1);
        assert_eq!(fx.ledger.lock().await.flushes(), 1);
    }

    #[tokio::test]
    async fn test_same_title_from_another_item_is_not_skipped() {
        let fx = fixture(MockEngine::new(), MemoryLedger::with_ids(["first"]), TaskOptions::default());
        std::fs::write(fx.dir.path().join("Intro.mp4"), b"first").unwrap();
        let item = MediaItem::new("second", "Intro");
        let target = TaskTarget::new(fx.dir.path(), "Intro");

        let outcome = fx
            .task
            .run(&item, &FormatRequest::Best, &target, &reporter(&item))
            .await;
        assert!(matches!(outcome, DownloadOutcome::Succeeded { .. }));
        assert_eq!(fx.engine.transfers().len(), 1);
        assert!(fx.ledger.lock().await.contains("second"));
    }

    #[tokio::test]
    async fn test_no_skip_existing_downloads_anyway() {
        let fx = fixture(
            MockEngine::new(),
            MemoryLedger::with_ids(["abc"]),
            TaskOptions::default().with_skip_existing(false),
        );
        std::fs::write(fx.dir.path().join("Song.mp4"), b"old").unwrap();
        let item = MediaItem::new("abc", "Song");
        let target = TaskTarget::new(fx.dir.path(), "Song");

        let outcome = fx
            .task
            .run(&item, &FormatRequest::Best, &target, &reporter(&item))
            .await;
        assert!(matches!(outcome, DownloadOutcome::Succeeded { .. }));
        assert_eq!(fx.engine.transfers().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_code_fails_without_transfer() {
        let fx = fixture(MockEngine::new(), MemoryLedger::new(), TaskOptions::default());
        let item = MediaItem::new("abc", "Song");
        let target = TaskTarget::new(fx.dir.path(), "Song");

        let outcome = fx
            .task
            .run(
                &item,
                &FormatRequest::Code("137+999".into()),
                &target,
                &reporter(&item),
            )
            .await;

        assert_eq!(
            outcome,
            DownloadOutcome::Failed {
                item_id: "abc".into(),
                reason: FailureReason::FormatUnavailable("999".into()),
            }
        );
        assert!(fx.engine.transfers().is_empty());
        assert!(fx.ledger.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_audio_only_without_audio_stream_extracts() {
        let engine = MockEngine::new().with_formats(
            "abc",
            vec![
                RawFormat::muxed("18", "mp4", 360, 500.0),
                RawFormat::muxed("22", "mp4", 720, 1500.0),
            ],
        );
        let fx = fixture(engine, MemoryLedger::new(), TaskOptions::default());
        let item = MediaItem::new("abc", "Song");
        let target = TaskTarget::new(fx.dir.path(), "Song");

        let outcome = fx
            .task
            .run(&item, &FormatRequest::AudioOnly, &target, &reporter(&item))
            .await;

        match outcome {
            DownloadOutcome::Succeeded {
                path,
                audio_extracted,
                ..
            } => {
                assert!(audio_extracted);
                assert_eq!(path.extension().unwrap(), "mp3");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        let transfers = fx.engine.transfers();
        assert_eq!(transfers[0].format_spec, "22");
        assert_eq!(transfers[0].audio, Some(AudioExtraction::default()));
    }

    #[tokio::test]
    async fn test_engine_failures_are_categorized() {
        let engine = MockEngine::new()
            .with_failure("gone", Stage::Details, Failure::Unavailable)
            .with_failure("blocked", Stage::Transfer, Failure::Restricted)
            .with_failure("flaky", Stage::Transfer, Failure::Network);
        let fx = fixture(engine, MemoryLedger::new(), TaskOptions::default());

        for (id, category) in [("gone", "unavailable"), ("blocked", "restricted"), ("flaky", "network")] {
            let item = MediaItem::new(id, id);
            let target = TaskTarget::new(fx.dir.path(), id);
            let outcome = fx
                .task
                .run(&item, &FormatRequest::Best, &target, &reporter(&item))
                .await;
            assert_eq!(outcome.failure().map(FailureReason::category), Some(category));
        }
        assert!(fx.ledger.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_listed_unavailable_skips_engine() {
        let fx = fixture(MockEngine::new(), MemoryLedger::new(), TaskOptions::default());
        let item = MediaItem::new("abc", "[Private video]").with_availability(Availability::Unavailable);
        let target = TaskTarget::new(fx.dir.path(), "x");

        let outcome = fx
            .task
            .run(&item, &FormatRequest::Best, &target, &reporter(&item))
            .await;
        assert_eq!(outcome.failure().map(FailureReason::category), Some("unavailable"));
        assert_eq!(fx.engine.member_calls(), 0);
    }

    #[tokio::test]
    async fn test_transfer_timeout() {
        let engine = MockEngine::new().with_delay("slow", Duration::from_millis(500));
        let fx = fixture(
            engine,
            MemoryLedger::new(),
            TaskOptions::default().with_timeout(Duration::from_millis(50)),
        );
        let item = MediaItem::new("slow", "Slow");
        let target = TaskTarget::new(fx.dir.path(), "Slow");

        let outcome = fx
            .task
            .run(&item, &FormatRequest::Best, &target, &reporter(&item))
            .await;
        let reason = outcome.failure().cloned().unwrap();
        assert_eq!(reason, FailureReason::Timeout(Duration::from_millis(50)));
        assert_eq!(reason.to_string(), "timed out after 50ms");
        assert!(reason.is_availability_related());
        assert!(fx.ledger.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_status_events() {
        let fx = fixture(MockEngine::new(), MemoryLedger::new(), TaskOptions::default());
        let item = MediaItem::new("abc", "Song");
        let target = TaskTarget::new(fx.dir.path(), "Song");
        let (sink, mut rx) = EventSink::channel();

        fx.task
            .run(&item, &FormatRequest::Best, &target, &ItemReporter::new(sink, &item))
            .await;

        let mut statuses = Vec::new();
        while let Ok(event) = rx.try_recv() {
            statuses.push(event.status);
        }
        assert_eq!(
            statuses,
            vec![
                ItemStatus::Resolving,
                ItemStatus::Transferring { percent: 0.0 },
                ItemStatus::Transferring { percent: 50.0 },
                ItemStatus::Transferring { percent: 100.0 },
            ]
        );
        assert!(statuses.iter().all(|s| !s.is_terminal()));
    }

    #[test]
    fn test_state_transitions() {
        assert!(TaskState::Pending.can_transition_to(TaskState::ResolvingFormat));
        assert!(TaskState::ResolvingFormat.can_transition_to(TaskState::Error));
        assert!(TaskState::Transferring.can_transition_to(TaskState::Error));
        assert!(!TaskState::Recording.can_transition_to(TaskState::Error));
        assert!(!TaskState::Pending.can_transition_to(TaskState::Transferring));
        assert!(!TaskState::Done.can_transition_to(TaskState::Pending));
    }
}
