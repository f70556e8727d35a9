//! Command line argument parsing

use crate::core::{DownloadOptions, FormatRequest};
use crate::download::{FallbackConfig, ItemFilter, TaskOptions};
use crate::platform::AudioExtraction;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// ytgrab - download videos, audio and playlists through yt-dlp
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Video or playlist URL (a bare video or playlist ID also works)
    pub url: String,

    /// Output directory
    #[arg(short, long, value_name = "DIR", default_value = "./downloads")]
    pub output_dir: PathBuf,

    /// List available formats and exit
    #[arg(short = 'l', long)]
    pub list_formats: bool,

    /// Show video or playlist information and exit
    #[arg(short, long)]
    pub info: bool,

    /// Treat the URL as a playlist
    #[arg(short, long)]
    pub playlist: bool,

    /// Format code to download (e.g. '22', '137+140', 'best')
    #[arg(short, long, value_name = "CODE")]
    pub format: Option<String>,

    /// Download audio only
    #[arg(short, long)]
    pub audio_only: bool,

    /// Codec audio-only downloads are converted to
    #[arg(long, value_enum, default_value = "mp3")]
    pub audio_format: AudioCodec,

    /// Audio quality passed to the converter (bitrate in kbps or 0-10 VBR)
    #[arg(long, value_name = "QUALITY", default_value = "192")]
    pub audio_quality: String,

    /// Download only this playlist item (1-based)
    #[arg(long, value_name = "N", requires = "playlist", conflicts_with_all = ["start", "end"])]
    pub item: Option<usize>,

    /// First playlist item to download (1-based, inclusive)
    #[arg(long, value_name = "N", requires = "playlist")]
    pub start: Option<usize>,

    /// Last playlist item to download (1-based, inclusive)
    #[arg(long, value_name = "N", requires = "playlist")]
    pub end: Option<usize>,

    /// Download even if the item is recorded in the archive
    #[arg(long)]
    pub no_skip_existing: bool,

    /// Archive file (default: <output-dir>/archive.txt)
    #[arg(long, value_name = "PATH")]
    pub archive: Option<PathBuf>,

    /// Do not read or write the archive file
    #[arg(long, conflicts_with = "archive")]
    pub no_archive: bool,

    /// Parallelism for playlist downloads
    #[arg(short = 'j', long, default_value = "1")]
    pub concurrency: usize,

    /// Limit for each extraction or transfer (e.g., 30m, 1h)
    #[arg(long, value_name = "DURATION", default_value = "30m")]
    pub timeout: humantime::Duration,

    /// Do not search substitutes for unavailable playlist items
    #[arg(long)]
    pub no_fallback: bool,

    /// Accepted duration difference for a substitute without an exact title match
    #[arg(long, value_name = "DURATION", default_value = "5s")]
    pub fallback_tolerance: humantime::Duration,

    /// Search results inspected when looking for a substitute
    #[arg(long, value_name = "N", default_value = "5")]
    pub fallback_results: usize,

    /// Disable progress output
    #[arg(long)]
    pub no_progress: bool,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,

    /// yt-dlp executable
    #[arg(long = "yt-dlp", value_name = "PATH", default_value = "yt-dlp")]
    pub yt_dlp: PathBuf,

    /// Extra argument passed to every yt-dlp call (repeatable)
    #[arg(long, value_name = "ARG", allow_hyphen_values = true)]
    pub engine_arg: Vec<String>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Quiet output (only errors)
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Audio conversion target
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum AudioCodec {
    Mp3,
    M4a,
    Opus,
    Vorbis,
    Flac,
    Wav,
}

impl AudioCodec {
    /// Name the engine understands
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioCodec::Mp3 => "mp3",
            AudioCodec::M4a => "m4a",
            AudioCodec::Opus => "opus",
            AudioCodec::Vorbis => "vorbis",
            AudioCodec::Flac => "flac",
            AudioCodec::Wav => "wav",
        }
    }
}

impl Args {
    /// Get engine call timeout as Duration
    pub fn timeout_duration(&self) -> Duration {
        self.timeout.into()
    }

    /// Get substitute duration tolerance as Duration
    pub fn fallback_tolerance_duration(&self) -> Duration {
        self.fallback_tolerance.into()
    }

    /// Check if this is a playlist operation
    pub fn is_playlist(&self) -> bool {
        self.playlist || crate::utils::url::is_playlist_url(&self.url)
    }

    /// Get output verbosity level
    pub fn verbosity_level(&self) -> VerbosityLevel {
        if self.quiet {
            VerbosityLevel::Quiet
        } else if self.verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }

    pub fn format_request(&self) -> FormatRequest {
        FormatRequest::from_options(self.format.as_deref(), self.audio_only)
    }

    pub fn item_filter(&self) -> ItemFilter {
        ItemFilter::from_options(self.item, self.start, self.end)
    }

    pub fn audio_extraction(&self) -> AudioExtraction {
        AudioExtraction {
            codec: self.audio_format.as_str().to_string(),
            quality: self.audio_quality.clone(),
        }
    }

    pub fn fallback_config(&self) -> FallbackConfig {
        let config = FallbackConfig::default()
            .with_max_results(self.fallback_results)
            .with_duration_tolerance(self.fallback_tolerance_duration());
        FallbackConfig {
            enabled: !self.no_fallback,
            ..config
        }
    }

    /// Library options matching these arguments
    pub fn download_options(&self) -> DownloadOptions {
        DownloadOptions {
            output_dir: self.output_dir.clone(),
            archive_path: self.archive.clone(),
            use_archive: !self.no_archive,
            format: self.format_request(),
            task: TaskOptions::default()
                .with_skip_existing(!self.no_skip_existing)
                .with_timeout(self.timeout_duration())
                .with_audio(self.audio_extraction()),
            fallback: self.fallback_config(),
            concurrency: self.concurrency.max(1),
        }
    }
}

/// Output verbosity level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbosityLevel {
    /// Quiet (only errors)
    Quiet,
    /// Normal
    Normal,
    /// Verbose (debug info)
    Verbose,
}


// Implement Default for Args to make tests work
impl Default for Args {
    fn default() -> Self {
        Self {
            url: String::new(),
            output_dir: PathBuf::from("./downloads"),
            list_formats: false,
            info: false,
            playlist: false,
            format: None,
            audio_only: false,
            audio_format: AudioCodec::Mp3,
            audio_quality: "192".to_string(),
            item: None,
            start: None,
            end: None,
            no_skip_existing: false,
            archive: None,
            no_archive: false,
            concurrency: 1,
            timeout: humantime::Duration::from(Duration::from_secs(30 * 60)),
            no_fallback: false,
            fallback_tolerance: humantime::Duration::from(Duration::from_secs(5)),
            fallback_results: 5,
            no_progress: false,
            json: false,
            yt_dlp: PathBuf::from("yt-dlp"),
            engine_arg: Vec::new(),
            verbose: false,
            quiet: false,
        }
    }
}
