//! Playlist orchestration
//!
//! Members are processed by a bounded pool of tasks. Each member gets at most
//! one substitute attempt, and outcomes are returned in playlist order no
//! matter which member finished first.

use crate::core::catalog::FormatRequest;
use crate::core::media::{MediaItem, Playlist};
use crate::core::outcome::{DownloadOutcome, FailureReason};
use crate::core::progress::{EventSink, ItemReporter, ItemStatus};
use crate::download::fallback::{FallbackConfig, FallbackResolver};
use crate::download::selection::ItemFilter;
use crate::download::task::{record_or_warn, DownloadTask, TaskOptions, TaskTarget};
use crate::ledger::SharedLedger;
use crate::platform::engine::ExtractionEngine;
use crate::utils::filename::{member_stem, playlist_dir_name};
use crate::Result;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Drives a download task per selected playlist member
pub struct PlaylistOrchestrator {
    task: DownloadTask,
    fallback: FallbackResolver,
    ledger: SharedLedger,
    events: EventSink,
    concurrency: usize,
    cancel: CancellationToken,
}

impl PlaylistOrchestrator {
    pub fn new(engine: Arc<dyn ExtractionEngine>, ledger: SharedLedger) -> Self {
        Self {
            task: DownloadTask::new(engine.clone(), ledger.clone(), TaskOptions::default()),
            fallback: FallbackResolver::new(engine, FallbackConfig::default()),
            ledger,
            events: EventSink::disabled(),
            concurrency: 1,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_task_options(mut self, options: TaskOptions) -> Self {
        self.task = DownloadTask::new(self.engine(), self.ledger.clone(), options);
        self
    }

    pub fn with_fallback(mut self, config: FallbackConfig) -> Self {
        self.fallback = FallbackResolver::new(self.engine(), config);
        self
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Members processed at the same time (at least 1)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Once cancelled, members that have not started are reported as
    /// cancelled; running members finish.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn engine(&self) -> Arc<dyn ExtractionEngine> {
        self.task.engine()
    }

    /// Directory the playlist's members are written to
    pub fn playlist_dir(playlist: &Playlist, output_dir: &Path) -> PathBuf {
        output_dir.join(playlist_dir_name(&playlist.title))
    }

    /// Download the selected members of `playlist`.
    ///
    /// An invalid selection fails before anything is created or downloaded.
    /// Per-member failures are reported in the returned outcomes.
    pub async fn run(
        &self,
        playlist: &Playlist,
        filter: &ItemFilter,
        request: &FormatRequest,
        output_dir: &Path,
    ) -> Result<Vec<DownloadOutcome>> {
        let selected = filter.select(playlist.len())?;
        let dir = Self::playlist_dir(playlist, output_dir);
        tokio::fs::create_dir_all(&dir).await?;

        info!(
            "Playlist '{}': {} of {} member(s) selected ({}), {} at a time",
            playlist.title,
            selected.len(),
            playlist.len(),
            filter,
            self.concurrency
        );

        let members: Vec<(usize, &MediaItem)> = selected
            .into_iter()
            .map(|index| &playlist.entries[index])
            .enumerate()
            .collect();

        let reporters: Vec<ItemReporter> = members
            .iter()
            .map(|(_, item)| ItemReporter::new(self.events.clone(), item))
            .collect();
        for reporter in &reporters {
            reporter.status(ItemStatus::Queued);
        }

        let mut outcomes: Vec<(usize, DownloadOutcome)> = stream::iter(members)
            .map(|(slot, item)| {
                let reporter = &reporters[slot];
                let dir = &dir;
                async move { (slot, self.process_member(item, request, dir, reporter).await) }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        outcomes.sort_by_key(|(slot, _)| *slot);

        // Anything still buffered by the ledger goes to disk before returning
        if let Err(e) = self.ledger.lock().await.flush().await {
            warn!("Final ledger flush failed: {}", e);
        }

        Ok(outcomes.into_iter().map(|(_, outcome)| outcome).collect())
    }

    async fn process_member(
        &self,
        item: &MediaItem,
        request: &FormatRequest,
        dir: &Path,
        reporter: &ItemReporter,
    ) -> DownloadOutcome {
        if self.cancel.is_cancelled() {
            let outcome = DownloadOutcome::Failed {
                item_id: item.id.clone(),
                reason: FailureReason::Cancelled,
            };
            reporter.finish(&outcome);
            return outcome;
        }

        let position = item.position.unwrap_or_default();
        let target = TaskTarget::new(dir, member_stem(position, &item.title));

        let mut outcome = self.task.run(item, request, &target, reporter).await;

        if let DownloadOutcome::Failed { reason, .. } = &outcome {
            if reason.is_availability_related() && self.fallback.config().enabled && !self.cancel.is_cancelled() {
                outcome = self.substitute(item, request, &target, reporter, reason.clone()).await;
            }
        }

        reporter.finish(&outcome);
        outcome
    }

    /// One substitute attempt; the substitute itself is never substituted
    async fn substitute(
        &self,
        item: &MediaItem,
        request: &FormatRequest,
        target: &TaskTarget,
        reporter: &ItemReporter,
        original_reason: FailureReason,
    ) -> DownloadOutcome {
        let not_found = DownloadOutcome::Failed {
            item_id: item.id.clone(),
            reason: original_reason,
        };

        let Some(substitute) = self.fallback.find_alternative(item).await else {
            return not_found;
        };

        match self.task.run(&substitute, request, target, reporter).await {
            DownloadOutcome::Succeeded { path, .. } | DownloadOutcome::SkippedExisting { path, .. } => {
                // The original id is recorded too so the next run skips the member
                record_or_warn(&self.ledger, &[&item.id]).await;
                info!("{} substituted by {}", item.id, substitute.id);
                DownloadOutcome::Substituted {
                    original_id: item.id.clone(),
                    substitute_id: substitute.id.clone(),
                    path,
                }
            }
            DownloadOutcome::Failed { reason, .. } => {
                warn!(
                    "Substitute {} for {} failed as well: {}",
                    substitute.id, item.id, reason
                );
                DownloadOutcome::Failed {
                    item_id: item.id.clone(),
                    reason,
                }
            }
            DownloadOutcome::Substituted { .. } => not_found,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::media::Availability;
    use crate::error::GrabError;
    use crate::ledger::{HistoryLedger, MemoryLedger};
    use crate::platform::mock::{Failure, MockEngine, Stage};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::Mutex;

    fn playlist(count: usize) -> Playlist {
        let entries = (1..=count)
            .map(|n| MediaItem::new(format!("m{}", n), format!("Track {}", n)).with_duration(200))
            .collect();
        Playlist::new("PL1", "Road/Trip: Mix", entries)
    }

    struct Fixture {
        engine: Arc<MockEngine>,
        ledger: Arc<Mutex<MemoryLedger>>,
        dir: TempDir,
    }

    impl Fixture {
        fn new(engine: MockEngine) -> Self {
            Self::with_ledger(engine, MemoryLedger::new())
        }

        fn with_ledger(engine: MockEngine, ledger: MemoryLedger) -> Self {
            Self {
                engine: Arc::new(engine),
                ledger: Arc::new(Mutex::new(ledger)),
                dir: TempDir::new().unwrap(),
            }
        }

        fn orchestrator(&self) -> PlaylistOrchestrator {
            PlaylistOrchestrator::new(self.engine.clone(), self.ledger.clone())
        }
    }

    fn ids(outcomes: &[DownloadOutcome]) -> Vec<&str> {
        outcomes.iter().map(DownloadOutcome::item_id).collect()
    }

    #[tokio::test]
    async fn test_range_processes_exactly_those_members() {
        let fx = Fixture::new(MockEngine::new());
        let outcomes = fx
            .orchestrator()
            .run(
                &playlist(6),
                &ItemFilter::Range { start: 2, end: Some(4) },
                &FormatRequest::Best,
                fx.dir.path(),
            )
            .await
            .unwrap();

        assert_eq!(ids(&outcomes), vec!["m2", "m3", "m4"]);
        let transferred: Vec<String> = fx.engine.transfers().into_iter().map(|t| t.item_id).collect();
        assert_eq!(transferred, vec!["m2", "m3", "m4"]);

        let member_dir = fx.dir.path().join("Road_Trip_ Mix");
        assert!(member_dir.join("002 - Track 2.mp4").exists());
        assert!(member_dir.join("004 - Track 4.mp4").exists());
    }

    #[tokio::test]
    async fn test_invalid_range_fails_before_any_work() {
        let fx = Fixture::new(MockEngine::new());
        for filter in [
            ItemFilter::Range { start: 4, end: Some(2) },
            ItemFilter::Range { start: 2, end: Some(9) },
            ItemFilter::Single(0),
        ] {
            let err = fx
                .orchestrator()
                .run(&playlist(5), &filter, &FormatRequest::Best, fx.dir.path())
                .await
                .unwrap_err();
            assert!(matches!(err, GrabError::InvalidRange { .. }));
        }

        assert_eq!(fx.engine.member_calls(), 0);
        assert!(!fx.dir.path().join("Road_Trip_ Mix").exists());
    }

    #[tokio::test]
    async fn test_outcomes_follow_playlist_order() {
        let engine = MockEngine::new()
            .with_delay("m1", Duration::from_millis(250))
            .with_delay("m2", Duration::from_millis(200))
            .with_delay("m3", Duration::from_millis(10))
            .with_delay("m4", Duration::from_millis(150))
            .with_delay("m5", Duration::from_millis(100));
        let fx = Fixture::new(engine);

        let outcomes = fx
            .orchestrator()
            .with_concurrency(5)
            .run(&playlist(5), &ItemFilter::All, &FormatRequest::Best, fx.dir.path())
            .await
            .unwrap();

        assert_eq!(fx.engine.completed().first().map(String::as_str), Some("m3"));
        assert_eq!(ids(&outcomes), vec!["m1", "m2", "m3", "m4", "m5"]);
        assert!(outcomes.iter().all(|o| matches!(o, DownloadOutcome::Succeeded { .. })));
        assert!(fx.engine.max_in_flight() > 1);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let mut engine = MockEngine::new();
        for n in 1..=6 {
            engine = engine.with_delay(&format!("m{}", n), Duration::from_millis(30));
        }
        let fx = Fixture::new(engine);

        fx.orchestrator()
            .with_concurrency(2)
            .run(&playlist(6), &ItemFilter::All, &FormatRequest::Best, fx.dir.path())
            .await
            .unwrap();

        assert!(fx.engine.max_in_flight() <= 2);
        assert_eq!(fx.engine.completed().len(), 6);
    }

    #[tokio::test]
    async fn test_unavailable_member_is_substituted_once() {
        let engine = MockEngine::new()
            .with_failure("m2", Stage::Details, Failure::Unavailable)
            .with_search_results(vec![
                MediaItem::new("other", "Track 2 (cover)").with_duration(100),
                MediaItem::new("alt2", "track  2").with_duration(200),
            ]);
        let fx = Fixture::new(engine);

        let outcomes = fx
            .orchestrator()
            .run(&playlist(3), &ItemFilter::All, &FormatRequest::Best, fx.dir.path())
            .await
            .unwrap();

        let expected_path = fx.dir.path().join("Road_Trip_ Mix").join("002 - Track 2.mp4");
        assert_eq!(
            outcomes[1],
            DownloadOutcome::Substituted {
                original_id: "m2".into(),
                substitute_id: "alt2".into(),
                path: expected_path.clone(),
            }
        );
        assert!(expected_path.exists());
        assert_eq!(fx.engine.searches().len(), 1);

        let ledger = fx.ledger.lock().await;
        assert!(ledger.contains("m2"));
        assert!(ledger.contains("alt2"));
    }

    #[tokio::test]
    async fn test_substituted_member_is_skipped_next_run() {
        let engine = MockEngine::new()
            .with_failure("m1", Stage::Details, Failure::Unavailable)
            .with_search_results(vec![MediaItem::new("alt1", "Track 1")]);
        let fx = Fixture::new(engine);
        let orchestrator = fx.orchestrator();
        let list = playlist(1);

        orchestrator
            .run(&list, &ItemFilter::All, &FormatRequest::Best, fx.dir.path())
            .await
            .unwrap();
        let second = orchestrator
            .run(&list, &ItemFilter::All, &FormatRequest::Best, fx.dir.path())
            .await
            .unwrap();

        assert!(matches!(second[0], DownloadOutcome::SkippedExisting { .. }));
        assert_eq!(fx.engine.searches().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_substitute_is_not_substituted_again() {
        let engine = MockEngine::new()
            .with_failure("m1", Stage::Transfer, Failure::Restricted)
            .with_failure("alt1", Stage::Transfer, Failure::Unavailable)
            .with_search_results(vec![MediaItem::new("alt1", "Track 1")]);
        let fx = Fixture::new(engine);

        let outcomes = fx
            .orchestrator()
            .run(&playlist(1), &ItemFilter::All, &FormatRequest::Best, fx.dir.path())
            .await
            .unwrap();

        assert_eq!(outcomes[0].item_id(), "m1");
        assert_eq!(outcomes[0].failure().map(FailureReason::category), Some("unavailable"));
        assert_eq!(fx.engine.searches().len(), 1);
        assert!(fx.ledger.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_no_match_reports_original_failure() {
        let engine = MockEngine::new()
            .with_failure("m1", Stage::Details, Failure::Unavailable)
            .with_search_results(vec![MediaItem::new("x", "Completely different").with_duration(900)]);
        let fx = Fixture::new(engine);

        let outcomes = fx
            .orchestrator()
            .run(&playlist(2), &ItemFilter::All, &FormatRequest::Best, fx.dir.path())
            .await
            .unwrap();

        assert_eq!(outcomes[0].failure().map(FailureReason::category), Some("unavailable"));
        assert!(matches!(outcomes[1], DownloadOutcome::Succeeded { .. }));
    }

    #[tokio::test]
    async fn test_network_failures_do_not_trigger_fallback() {
        let engine = MockEngine::new()
            .with_failure("m1", Stage::Transfer, Failure::Network)
            .with_search_results(vec![MediaItem::new("alt1", "Track 1")]);
        let fx = Fixture::new(engine);

        let outcomes = fx
            .orchestrator()
            .run(&playlist(1), &ItemFilter::All, &FormatRequest::Best, fx.dir.path())
            .await
            .unwrap();

        assert_eq!(outcomes[0].failure().map(FailureReason::category), Some("network"));
        assert!(fx.engine.searches().is_empty());
    }

    #[tokio::test]
    async fn test_fallback_can_be_disabled() {
        let engine = MockEngine::new()
            .with_failure("m1", Stage::Details, Failure::Unavailable)
            .with_search_results(vec![MediaItem::new("alt1", "Track 1")]);
        let fx = Fixture::new(engine);

        let outcomes = fx
            .orchestrator()
            .with_fallback(FallbackConfig::disabled())
            .run(&playlist(1), &ItemFilter::All, &FormatRequest::Best, fx.dir.path())
            .await
            .unwrap();

        assert!(outcomes[0].is_failed());
        assert!(fx.engine.searches().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_is_eligible_for_fallback() {
        let engine = MockEngine::new()
            .with_delay("m1", Duration::from_millis(500))
            .with_search_results(vec![MediaItem::new("alt1", "Track 1")]);
        let fx = Fixture::new(engine);

        let outcomes = fx
            .orchestrator()
            .with_task_options(TaskOptions::default().with_timeout(Duration::from_millis(50)))
            .run(&playlist(1), &ItemFilter::All, &FormatRequest::Best, fx.dir.path())
            .await
            .unwrap();

        assert!(matches!(
            &outcomes[0],
            DownloadOutcome::Substituted { substitute_id, .. } if substitute_id == "alt1"
        ));
    }

    #[tokio::test]
    async fn test_listed_unavailable_member_goes_to_fallback() {
        let fx = Fixture::new(
            MockEngine::new().with_search_results(vec![MediaItem::new("alt", "Lost Song")]),
        );
        let entries = vec![MediaItem::new("gone", "Lost Song").with_availability(Availability::Unavailable)];
        let list = Playlist::new("PL2", "Mix", entries);

        let outcomes = fx
            .orchestrator()
            .run(&list, &ItemFilter::All, &FormatRequest::Best, fx.dir.path())
            .await
            .unwrap();

        assert!(matches!(outcomes[0], DownloadOutcome::Substituted { .. }));
        assert_eq!(fx.engine.details_calls(), vec!["alt".to_string()]);
    }

    #[tokio::test]
    async fn test_skip_existing_members_leave_ledger_unchanged() {
        let fx = Fixture::with_ledger(MockEngine::new(), MemoryLedger::with_ids(["m1", "m2"]));
        let member_dir = fx.dir.path().join("Road_Trip_ Mix");
        std::fs::create_dir_all(&member_dir).unwrap();
        std::fs::write(member_dir.join("001 - Track 1.mp4"), b"x").unwrap();
        std::fs::write(member_dir.join("002 - Track 2.mp4"), b"x").unwrap();

        let outcomes = fx
            .orchestrator()
            .run(&playlist(2), &ItemFilter::All, &FormatRequest::Best, fx.dir.path())
            .await
            .unwrap();

        assert!(outcomes
            .iter()
            .all(|o| matches!(o, DownloadOutcome::SkippedExisting { .. })));
        assert_eq!(fx.engine.member_calls(), 0);
        assert!(fx.ledger.lock().await.records().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_stops_new_members() {
        let engine = MockEngine::new().with_delay("m1", Duration::from_millis(200));
        let fx = Fixture::new(engine);
        let cancel = CancellationToken::new();
        let orchestrator = fx
            .orchestrator()
            .with_concurrency(1)
            .with_cancellation(cancel.clone());

        let trigger = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                cancel.cancel();
            })
        };

        let outcomes = orchestrator
            .run(&playlist(3), &ItemFilter::All, &FormatRequest::Best, fx.dir.path())
            .await
            .unwrap();
        trigger.await.unwrap();

        assert!(matches!(outcomes[0], DownloadOutcome::Succeeded { .. }));
        assert_eq!(outcomes[1].failure(), Some(&FailureReason::Cancelled));
        assert_eq!(outcomes[2].failure(), Some(&FailureReason::Cancelled));
        assert!(fx.ledger.lock().await.contains("m1"));
        assert_eq!(fx.engine.transfers().len(), 1);
    }

    #[tokio::test]
    async fn test_one_terminal_event_per_member() {
        let engine = MockEngine::new()
            .with_failure("m2", Stage::Details, Failure::Unavailable)
            .with_search_results(vec![MediaItem::new("alt2", "Track 2")]);
        let fx = Fixture::new(engine);
        let (sink, mut rx) = EventSink::channel();

        fx.orchestrator()
            .with_events(sink)
            .run(&playlist(3), &ItemFilter::All, &FormatRequest::Best, fx.dir.path())
            .await
            .unwrap();

        let mut terminal = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if event.status.is_terminal() {
                terminal.push(event.item_id);
            }
        }
        terminal.sort();
        assert_eq!(terminal, vec!["m1", "m2", "m3"]);
    }
}
