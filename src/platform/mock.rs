//! Scriptable in-memory engine for tests

use crate::core::media::{ItemDetails, MediaItem, Probe};
use crate::core::progress::{Progress, ProgressCallback};
use crate::platform::engine::{EngineError, ExtractionEngine, TransferRequest};
use crate::platform::formats::RawFormat;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Stage at which an injected failure fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Details,
    Transfer,
}

/// Failure category to inject
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Unavailable,
    Restricted,
    Network,
}

impl Failure {
    fn to_error(self, id: &str) -> EngineError {
        match self {
            Failure::Unavailable => EngineError::Unavailable(format!("Video unavailable: {}", id)),
            Failure::Restricted => EngineError::Restricted(format!("{} is age restricted", id)),
            Failure::Network => EngineError::Network("connection reset by peer".to_string()),
        }
    }
}

/// Catalog every item gets unless one is registered
pub fn standard_formats() -> Vec<RawFormat> {
    vec![
        RawFormat::muxed("18", "mp4", 360, 500.0),
        RawFormat::video("137", "mp4", 1080, 4000.0),
        RawFormat::video("136", "mp4", 720, 2000.0),
        RawFormat::audio("140", "m4a", 128.0),
        RawFormat::audio("251", "webm", 160.0),
    ]
}

#[derive(Default)]
struct State {
    probe: Option<Probe>,
    details: HashMap<String, Vec<RawFormat>>,
    failures: HashMap<(String, Stage), Failure>,
    delays: HashMap<String, Duration>,
    probe_delay: Option<Duration>,
    search_results: Vec<MediaItem>,
    searches: Vec<String>,
    details_calls: Vec<String>,
    transfers: Vec<TransferRequest>,
    completed: Vec<String>,
}

/// Engine double with call recording and injected behavior
#[derive(Default)]
pub struct MockEngine {
    state: Mutex<State>,
    probe_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_probe(self, probe: Probe) -> Self {
        self.state.lock().unwrap().probe = Some(probe);
        self
    }

    /// Register a catalog for one item
    pub fn with_formats(self, id: &str, formats: Vec<RawFormat>) -> Self {
        self.state
            .lock()
            .unwrap()
            .details
            .insert(id.to_string(), formats);
        self
    }

    pub fn with_failure(self, id: &str, stage: Stage, failure: Failure) -> Self {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert((id.to_string(), stage), failure);
        self
    }

    /// Make the transfer of `id` take `delay`
    pub fn with_delay(self, id: &str, delay: Duration) -> Self {
        self.state
            .lock()
            .unwrap()
            .delays
            .insert(id.to_string(), delay);
        self
    }

    /// Make every probe take `delay`
    pub fn with_probe_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().probe_delay = Some(delay);
        self
    }

    /// Results returned for every search, best first
    pub fn with_search_results(self, results: Vec<MediaItem>) -> Self {
        self.state.lock().unwrap().search_results = results;
        self
    }

    pub fn probe_calls(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    pub fn details_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().details_calls.clone()
    }

    pub fn searches(&self) -> Vec<String> {
        self.state.lock().unwrap().searches.clone()
    }

    pub fn transfers(&self) -> Vec<TransferRequest> {
        self.state.lock().unwrap().transfers.clone()
    }

    /// Item ids in transfer completion order
    pub fn completed(&self) -> Vec<String> {
        self.state.lock().unwrap().completed.clone()
    }

    /// Total engine calls that touched a member
    pub fn member_calls(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.details_calls.len() + state.transfers.len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn failure(&self, id: &str, stage: Stage) -> Option<EngineError> {
        self.state
            .lock()
            .unwrap()
            .failures
            .get(&(id.to_string(), stage))
            .map(|f| f.to_error(id))
    }
}

#[async_trait::async_trait]
impl ExtractionEngine for MockEngine {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn probe(&self, url: &str) -> Result<Probe, EngineError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.state.lock().unwrap().probe_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.state
            .lock()
            .unwrap()
            .probe
            .clone()
            .ok_or_else(|| EngineError::Unavailable(format!("nothing at {}", url)))
    }

    async fn item_details(&self, item: &MediaItem) -> Result<ItemDetails, EngineError> {
        self.state
            .lock()
            .unwrap()
            .details_calls
            .push(item.id.clone());

        if let Some(err) = self.failure(&item.id, Stage::Details) {
            return Err(err);
        }

        let formats = self
            .state
            .lock()
            .unwrap()
            .details
            .get(&item.id)
            .cloned()
            .unwrap_or_else(standard_formats);
        Ok(ItemDetails::new(item.clone(), formats))
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<MediaItem>, EngineError> {
        let mut state = self.state.lock().unwrap();
        state.searches.push(query.to_string());
        Ok(state.search_results.iter().take(limit).cloned().collect())
    }

    async fn transfer(
        &self,
        request: &TransferRequest,
        progress: ProgressCallback,
    ) -> Result<PathBuf, EngineError> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.transfers.push(request.clone());
            state.delays.get(&request.item_id).copied()
        };

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(err) = self.failure(&request.item_id, Stage::Transfer) {
            return Err(err);
        }

        for done in [512u64, 1024] {
            let mut update = Progress::new(1024);
            update.update(done);
            progress(update);
        }

        let ext = if request.audio.is_some() { "mp3" } else { "mp4" };
        let path = request
            .output_dir
            .join(format!("{}.{}", request.file_stem, ext));
        tokio::fs::write(&path, request.item_id.as_bytes()).await?;

        self.state
            .lock()
            .unwrap()
            .completed
            .push(request.item_id.clone());
        Ok(path)
    }
}
