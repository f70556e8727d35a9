//! Append-only ledger file

use super::{DownloadRecord, HistoryLedger};
use crate::error::GrabError;
use crate::Result;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Ledger backed by a plain text file, one identifier per line.
///
/// Lines written by other tools in the form `<extractor> <id>` are accepted;
/// the identifier is always the last token. The file is only ever appended
/// to, never rewritten.
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    ids: HashSet<String>,
    pending: Vec<DownloadRecord>,
    needs_newline: bool,
}

impl FileLedger {
    /// Load the ledger at `path`; a missing file is an empty ledger
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No ledger at {}, starting empty", path.display());
                return Ok(Self::empty(path));
            }
            Err(e) => return Err(e.into()),
        };

        let ids = parse(&path, &bytes)?;
        info!("Loaded {} ledger entries from {}", ids.len(), path.display());

        Ok(Self {
            needs_newline: !bytes.is_empty() && !bytes.ends_with(b"\n"),
            path,
            ids,
            pending: Vec::new(),
        })
    }

    fn empty(path: PathBuf) -> Self {
        Self {
            path,
            ids: HashSet::new(),
            pending: Vec::new(),
            needs_newline: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records not yet written to disk
    pub fn pending(&self) -> &[DownloadRecord] {
        &self.pending
    }
}

fn corrupt(path: &Path, line: usize, reason: impl Into<String>) -> GrabError {
    GrabError::LedgerCorrupt {
        path: path.to_path_buf(),
        line,
        reason: reason.into(),
    }
}

fn parse(path: &Path, bytes: &[u8]) -> Result<HashSet<String>> {
    let text = std::str::from_utf8(bytes).map_err(|e| {
        let line = bytes[..e.valid_up_to()].iter().filter(|b| **b == b'\n').count() + 1;
        corrupt(path, line, "invalid UTF-8")
    })?;

    let mut ids = HashSet::new();
    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim_end_matches('\r');

        if line.chars().any(|c| c.is_control() && c != '\t') {
            return Err(corrupt(path, line_no, "control character"));
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            [] => continue,
            [id] | [_, id] => {
                ids.insert((*id).to_string());
            }
            _ => {
                return Err(corrupt(
                    path,
                    line_no,
                    format!("expected an identifier, found {} fields", tokens.len()),
                ))
            }
        }
    }

    Ok(ids)
}

#[async_trait::async_trait]
impl HistoryLedger for FileLedger {
    fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    async fn record(&mut self, id: &str) -> Result<bool> {
        if !self.ids.insert(id.to_string()) {
            return Ok(false);
        }
        self.pending.push(DownloadRecord::now(id));
        Ok(true)
    }

    async fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut chunk = String::new();
        if self.needs_newline {
            chunk.push('\n');
        }
        for record in &self.pending {
            chunk.push_str(&record.id);
            chunk.push('\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(chunk.as_bytes()).await?;
        file.sync_data().await?;

        debug!(
            "Appended {} record(s) to {}",
            self.pending.len(),
            self.path.display()
        );
        self.pending.clear();
        self.needs_newline = false;
        Ok(())
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}
