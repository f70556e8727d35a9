//! Download history ledger
//!
//! The ledger is the durable set of item identifiers that were downloaded in
//! earlier runs. It is passed explicitly into the task and the playlist
//! orchestrator; all writes go through one [`SharedLedger`] lock so records
//! and flushes never interleave.

pub mod file;
pub mod memory;

pub use file::FileLedger;
pub use memory::MemoryLedger;

use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

/// File name of the ledger inside the output directory
pub const DEFAULT_LEDGER_FILE: &str = "archive.txt";

/// One completed download
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadRecord {
    pub id: String,
    pub recorded_at: DateTime<Utc>,
}

impl DownloadRecord {
    pub fn now(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            recorded_at: Utc::now(),
        }
    }
}

/// Persisted set of downloaded identifiers
#[async_trait::async_trait]
pub trait HistoryLedger: Send + Sync {
    /// Whether `id` was recorded, in this run or an earlier one
    fn contains(&self, id: &str) -> bool;

    /// Record `id`; returns `false` if it was already present
    async fn record(&mut self, id: &str) -> Result<bool>;

    /// Make every record durable
    async fn flush(&mut self) -> Result<()>;

    /// Number of known identifiers
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ledger handle shared by concurrent tasks
pub type SharedLedger = Arc<Mutex<dyn HistoryLedger>>;

/// Wrap a ledger for sharing
pub fn shared<L: HistoryLedger + 'static>(ledger: L) -> SharedLedger {
    Arc::new(Mutex::new(ledger))
}

/// Record `ids` and flush under a single lock acquisition
pub async fn record_all(ledger: &SharedLedger, ids: &[&str]) -> Result<()> {
    let mut guard = ledger.lock().await;
    for id in ids {
        guard.record(id).await?;
    }
    guard.flush().await
}
