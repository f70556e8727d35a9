//! Extraction engine backed by the external `yt-dlp` executable

use crate::core::media::{is_placeholder_title, Availability, ItemDetails, MediaItem, Playlist, Probe};
use crate::core::progress::{Progress, ProgressCallback};
use crate::platform::engine::{EngineError, ExtractionEngine, TransferRequest};
use crate::platform::formats::RawFormat;
use crate::utils::cache::{new_async_cache_with_capacity, AsyncCache};
use crate::utils::url::is_music_url;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Marker prefixed to progress lines so they can be told apart from output
const PROGRESS_MARKER: &str = "ytgrab-progress";

/// Metadata cache TTL
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);

/// Subset of the engine's JSON document we care about
#[derive(Debug, Deserialize)]
struct InfoJson {
    id: Option<String>,
    title: Option<String>,
    #[serde(rename = "_type")]
    kind: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
    channel: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    description: Option<String>,
    view_count: Option<u64>,
    upload_date: Option<String>,
    thumbnail: Option<String>,
    availability: Option<String>,
    #[serde(default)]
    formats: Vec<RawFormat>,
    entries: Option<Vec<Option<InfoJson>>>,
}

impl InfoJson {
    fn is_playlist(&self) -> bool {
        self.entries.is_some() || matches!(self.kind.as_deref(), Some("playlist") | Some("multi_video"))
    }

    fn into_media_item(self) -> Option<MediaItem> {
        let id = self.id.filter(|id| !id.is_empty())?;
        let title = self.title.unwrap_or_default();

        let availability = match self.availability.as_deref() {
            Some("public") | Some("unlisted") => Availability::Available,
            Some("private") => Availability::Unavailable,
            _ if is_placeholder_title(&title) => Availability::Unavailable,
            _ => Availability::Unknown,
        };

        let mut item = MediaItem::new(id, title).with_availability(availability);
        item.duration = self.duration.filter(|d| *d >= 0.0).map(|d| d.round() as u32);
        item.uploader = self.uploader.or(self.channel);
        item.url = self.webpage_url.or(self.url);
        Some(item)
    }

    fn into_details(mut self) -> Option<ItemDetails> {
        let raw_formats = std::mem::take(&mut self.formats);
        let description = self.description.take();
        let view_count = self.view_count.take();
        let upload_date = self.upload_date.take();
        let thumbnail = self.thumbnail.take();

        let item = self.into_media_item()?;
        Some(ItemDetails {
            item,
            description,
            view_count,
            upload_date,
            thumbnail,
            raw_formats,
        })
    }

    fn into_playlist(self) -> Playlist {
        let id = self.id.unwrap_or_default();
        let title = self.title.unwrap_or_else(|| "Unknown Playlist".to_string());
        let uploader = self.uploader.or(self.channel);
        let entries = self
            .entries
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .filter_map(InfoJson::into_media_item)
            .collect();

        let mut playlist = Playlist::new(id, title, entries);
        playlist.uploader = uploader;
        playlist
    }
}

/// `yt-dlp` subprocess engine
pub struct YtDlpEngine {
    binary: PathBuf,
    extra_args: Vec<String>,
    cache: AsyncCache<String, ItemDetails>,
}

impl YtDlpEngine {
    /// Create an engine that runs `yt-dlp` from PATH
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("yt-dlp"),
            extra_args: Vec::new(),
            cache: new_async_cache_with_capacity(DEFAULT_CACHE_TTL, 512),
        }
    }

    /// Use a specific executable
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Extra arguments passed to every invocation (cookies, proxies, ...)
    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .args(&self.extra_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    fn spawn_error(&self, err: std::io::Error) -> EngineError {
        if err.kind() == std::io::ErrorKind::NotFound {
            EngineError::Process(format!("{} not found in PATH", self.binary.display()))
        } else {
            EngineError::Io(err)
        }
    }

    /// Run the engine in metadata mode and parse its single JSON document
    async fn dump_json(&self, args: &[&str]) -> Result<InfoJson, EngineError> {
        debug!("Running {} {:?}", self.binary.display(), args);
        let output = self
            .command()
            .arg("--dump-single-json")
            .arg("--no-warnings")
            .args(args)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_stderr(&stderr));
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }

    async fn cache_details(&self, details: &ItemDetails) {
        self.cache
            .insert(details.item.id.clone(), details.clone())
            .await;
    }
}

impl Default for YtDlpEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ExtractionEngine for YtDlpEngine {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn probe(&self, url: &str) -> Result<Probe, EngineError> {
        info!("Probing {}", url);
        let info = if is_music_url(url) {
            // Keep unavailable tracks in the listing so they can be substituted
            debug!("Music URL detected, listing unavailable entries too");
            self.dump_json(&[
                "--flat-playlist",
                "--compat-options",
                "no-youtube-unavailable-videos",
                url,
            ])
            .await?
        } else {
            self.dump_json(&["--flat-playlist", url]).await?
        };

        if info.is_playlist() {
            let playlist = info.into_playlist();
            info!("Found playlist '{}' with {} entries", playlist.title, playlist.len());
            return Ok(Probe::Playlist(playlist));
        }

        let details = info
            .into_details()
            .ok_or_else(|| EngineError::Process(format!("no item id reported for {}", url)))?;
        self.cache_details(&details).await;
        Ok(Probe::Item(Box::new(details)))
    }

    async fn item_details(&self, item: &MediaItem) -> Result<ItemDetails, EngineError> {
        if let Some(cached) = self.cache.get(&item.id).await {
            debug!("Metadata cache hit for {}", item.id);
            return Ok(cached);
        }

        let source = item.source();
        let info = self.dump_json(&["--no-playlist", &source]).await?;
        let mut details = info
            .into_details()
            .ok_or_else(|| EngineError::Process(format!("no item id reported for {}", source)))?;

        // Keep the position assigned during enumeration
        details.item.position = item.position;
        self.cache_details(&details).await;
        Ok(details)
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<MediaItem>, EngineError> {
        let target = format!("ytsearch{}:{}", limit.max(1), query);
        info!("Searching: {}", target);
        let info = self.dump_json(&["--flat-playlist", &target]).await?;

        Ok(info
            .entries
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .filter_map(InfoJson::into_media_item)
            .collect())
    }

    async fn transfer(
        &self,
        request: &TransferRequest,
        progress: ProgressCallback,
    ) -> Result<PathBuf, EngineError> {
        let template = request
            .output_dir
            .join(format!("{}.%(ext)s", escape_template(&request.file_stem)));
        let progress_template = format!(
            "download:{} %(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s",
            PROGRESS_MARKER
        );

        let mut command = self.command();
        command
            .arg("--no-warnings")
            .arg("--no-playlist")
            .arg("--newline")
            .arg("--progress")
            .arg("--no-simulate")
            .arg("--progress-template")
            .arg(&progress_template)
            .arg("--print")
            .arg("after_move:filepath")
            .arg("-f")
            .arg(&request.format_spec)
            .arg("-o")
            .arg(&template);

        if let Some(audio) = &request.audio {
            command
                .arg("-x")
                .arg("--audio-format")
                .arg(&audio.codec)
                .arg("--audio-quality")
                .arg(&audio.quality);
        }
        command.arg(&request.source);

        info!(
            "Transferring {} with format '{}' into {}",
            request.item_id,
            request.format_spec,
            request.output_dir.display()
        );
        let mut child = command.spawn().map_err(|e| self.spawn_error(e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Process("engine stdout unavailable".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::Process("engine stderr unavailable".to_string()))?;

        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        });

        let mut final_path = None;
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if let Some(rest) = line.strip_prefix(PROGRESS_MARKER) {
                if let Some(update) = parse_progress(rest) {
                    progress(update);
                }
            } else if !line.is_empty() {
                final_path = Some(PathBuf::from(line));
            }
        }

        let status = child.wait().await?;
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            warn!("{} exited with {} for {}", self.name(), status, request.item_id);
            return Err(classify_stderr(&stderr));
        }

        match final_path {
            Some(path) => Ok(path),
            None => locate_output(&request.output_dir, &request.file_stem)
                .await
                .ok_or_else(|| {
                    EngineError::Process(format!(
                        "{} finished without reporting an output file",
                        self.name()
                    ))
                }),
        }
    }
}

/// `%` starts a template field; a literal one must be doubled
fn escape_template(stem: &str) -> String {
    stem.replace('%', "%%")
}

/// Parse "<downloaded> <total> <estimate>" where any field may be "NA"
fn parse_progress(fields: &str) -> Option<Progress> {
    let mut parts = fields.split_whitespace().map(|p| p.parse::<f64>().ok());
    let downloaded = parts.next().flatten()?;
    let total = parts.next().flatten();
    let estimate = parts.next().flatten();

    let total = total.or(estimate).unwrap_or(0.0);
    let mut progress = Progress::new(total as u64);
    progress.update(downloaded as u64);
    Some(progress)
}

async fn locate_output(dir: &Path, stem: &str) -> Option<PathBuf> {
    crate::utils::filename::find_by_stem(dir, stem).await.ok().flatten()
}

struct ErrorPatterns {
    restricted: Regex,
    unavailable: Regex,
    network: Regex,
}

fn error_patterns() -> &'static ErrorPatterns {
    static PATTERNS: OnceLock<ErrorPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| ErrorPatterns {
        restricted: Regex::new(
            r"(?i)(available in your country|blocked it in your country|geo.?restrict|confirm your age|age.?restricted|members.?only|join this channel)",
        )
        .expect("valid restricted pattern"),
        unavailable: Regex::new(
            r"(?i)(video unavailable|private video|has been removed|no longer available|does not exist|account .* terminated|is not available)",
        )
        .expect("valid unavailable pattern"),
        network: Regex::new(
            r"(?i)(unable to download|http error|connection|timed out|name resolution|network is unreachable|ssl)",
        )
        .expect("valid network pattern"),
    })
}

/// Map the engine's stderr onto an error category
pub fn classify_stderr(stderr: &str) -> EngineError {
    let message = stderr
        .lines()
        .rev()
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| stderr.lines().rev().find(|l| !l.trim().is_empty()))
        .unwrap_or("engine exited with an error")
        .trim()
        .to_string();

    let patterns = error_patterns();
    if patterns.restricted.is_match(&message) {
        EngineError::Restricted(message)
    } else if patterns.unavailable.is_match(&message) {
        EngineError::Unavailable(message)
    } else if patterns.network.is_match(&message) {
        EngineError::Network(message)
    } else {
        EngineError::Process(message)
    }
}
