//! Volatile ledger, used for `--no-archive` runs and tests

use super::{DownloadRecord, HistoryLedger};
use crate::Result;
use std::collections::HashSet;

/// Ledger that lives only as long as the process
#[derive(Debug, Default)]
pub struct MemoryLedger {
    ids: HashSet<String>,
    records: Vec<DownloadRecord>,
    flushes: usize,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with identifiers from an earlier run
    pub fn with_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Records added since creation, in order
    pub fn records(&self) -> &[DownloadRecord] {
        &self.records
    }

    /// How many times `flush` was called
    pub fn flushes(&self) -> usize {
        self.flushes
    }
}

#[async_trait::async_trait]
impl HistoryLedger for MemoryLedger {
    fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    async fn record(&mut self, id: &str) -> Result<bool> {
        if !self.ids.insert(id.to_string()) {
            return Ok(false);
        }
        self.records.push(DownloadRecord::now(id));
        Ok(true)
    }

    async fn flush(&mut self) -> Result<()> {
        self.flushes += 1;
        Ok(())
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}
