//! Format catalog and format selection
//!
//! Turns an item's raw format entries into an ordered catalog of
//! [`FormatDescriptor`]s and resolves a [`FormatRequest`] against it. Pure
//! functions only: no network or disk access happens here.

use crate::core::media::ItemDetails;
use crate::error::GrabError;
use std::cmp::Ordering;
use std::fmt;

/// Engine format spec used for "best quality" when nothing concrete is known
pub const BEST_QUALITY_SPEC: &str = "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best";

/// Engine format spec used for "audio only" when nothing concrete is known
pub const AUDIO_ONLY_SPEC: &str = "bestaudio/best";

/// Video stream properties
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VideoTrack {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<u32>,
    pub codec: Option<String>,
}

/// Audio stream properties
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AudioTrack {
    pub codec: Option<String>,
    pub sample_rate: Option<u32>,
}

/// What a format carries
#[derive(Debug, Clone, PartialEq)]
pub enum MediaKind {
    Video(VideoTrack),
    Audio(AudioTrack),
    Muxed { video: VideoTrack, audio: AudioTrack },
}

impl MediaKind {
    pub fn label(&self) -> &'static str {
        match self {
            MediaKind::Video(_) => "video only",
            MediaKind::Audio(_) => "audio only",
            MediaKind::Muxed { .. } => "video+audio",
        }
    }
}

/// One concrete encoding/quality option for an item
#[derive(Debug, Clone, PartialEq)]
pub struct FormatDescriptor {
    /// Format code, unique within the item
    pub code: String,
    /// Container/extension
    pub container: String,
    /// Stream layout
    pub kind: MediaKind,
    /// Total bitrate in kbps
    pub bitrate: Option<u32>,
    /// Estimated size in bytes
    pub estimated_size: Option<u64>,
    /// Engine note (e.g. "1080p", "medium")
    pub note: Option<String>,
}

impl FormatDescriptor {
    fn video_track(&self) -> Option<&VideoTrack> {
        match &self.kind {
            MediaKind::Video(video) | MediaKind::Muxed { video, .. } => Some(video),
            MediaKind::Audio(_) => None,
        }
    }

    pub fn height(&self) -> Option<u32> {
        self.video_track().and_then(|v| v.height)
    }

    pub fn fps(&self) -> Option<u32> {
        self.video_track().and_then(|v| v.fps)
    }

    pub fn is_audio(&self) -> bool {
        matches!(self.kind, MediaKind::Audio(_))
    }

    pub fn is_muxed(&self) -> bool {
        matches!(self.kind, MediaKind::Muxed { .. })
    }

    pub fn is_video_capable(&self) -> bool {
        self.video_track().is_some()
    }

    /// Human-readable resolution, e.g. "1920x1080" or "audio only"
    pub fn resolution_string(&self) -> String {
        match self.video_track() {
            Some(VideoTrack {
                width: Some(w),
                height: Some(h),
                ..
            }) => format!("{}x{}", w, h),
            Some(VideoTrack { height: Some(h), .. }) => format!("{}p", h),
            Some(_) => "unknown".to_string(),
            None => "audio only".to_string(),
        }
    }

    /// Resolution first, then bitrate
    fn quality_cmp(&self, other: &Self) -> Ordering {
        self.height()
            .unwrap_or(0)
            .cmp(&other.height().unwrap_or(0))
            .then(self.bitrate.unwrap_or(0).cmp(&other.bitrate.unwrap_or(0)))
    }

    fn bitrate_cmp(&self, other: &Self) -> Ordering {
        self.bitrate.unwrap_or(0).cmp(&other.bitrate.unwrap_or(0))
    }
}

/// What the user asked for
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FormatRequest {
    /// Highest resolution, then bitrate
    #[default]
    Best,
    /// Audio stream only
    AudioOnly,
    /// Explicit format code(s), `+`-joined for merges (e.g. "137+140")
    Code(String),
}

impl FormatRequest {
    /// Build a request from CLI-style inputs; audio-only wins over a code
    pub fn from_options(code: Option<&str>, audio_only: bool) -> Self {
        if audio_only {
            return FormatRequest::AudioOnly;
        }
        match code.map(str::trim) {
            None | Some("") => FormatRequest::Best,
            Some(c) if c.eq_ignore_ascii_case("best") => FormatRequest::Best,
            Some(c) => FormatRequest::Code(c.to_string()),
        }
    }

    pub fn is_audio_only(&self) -> bool {
        matches!(self, FormatRequest::AudioOnly)
    }
}

impl fmt::Display for FormatRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatRequest::Best => write!(f, "best quality"),
            FormatRequest::AudioOnly => write!(f, "audio only"),
            FormatRequest::Code(code) => write!(f, "format {}", code),
        }
    }
}

/// Selection strategy tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStrategy {
    BestQuality,
    AudioOnly,
    ExplicitCode,
}

/// Result of format resolution
#[derive(Debug, Clone, PartialEq)]
pub struct FormatSelection {
    /// Strategy that produced this selection
    pub strategy: SelectionStrategy,
    /// Concrete picks; empty means the engine applies the strategy itself
    pub formats: Vec<FormatDescriptor>,
    /// The transfer must isolate audio from a muxed stream
    pub requires_audio_extraction: bool,
}

impl FormatSelection {
    fn strategy_only(strategy: SelectionStrategy) -> Self {
        Self {
            strategy,
            formats: Vec::new(),
            requires_audio_extraction: false,
        }
    }

    /// Format spec handed to the extraction engine
    pub fn engine_spec(&self) -> String {
        if self.formats.is_empty() {
            match self.strategy {
                SelectionStrategy::AudioOnly => AUDIO_ONLY_SPEC.to_string(),
                _ => BEST_QUALITY_SPEC.to_string(),
            }
        } else {
            self.formats
                .iter()
                .map(|f| f.code.as_str())
                .collect::<Vec<_>>()
                .join("+")
        }
    }

    /// Container of the primary pick, if any
    pub fn container(&self) -> Option<&str> {
        self.formats.first().map(|f| f.container.as_str())
    }

    pub fn is_strategy_only(&self) -> bool {
        self.formats.is_empty()
    }
}

/// Ordered catalog of the item's usable formats, in engine declaration order
pub fn list_formats(item: &ItemDetails) -> Vec<FormatDescriptor> {
    item.raw_formats
        .iter()
        .filter_map(|raw| raw.classify())
        .collect()
}

/// Resolve a request against an item's catalog
pub fn resolve(item: &ItemDetails, requested: &FormatRequest) -> Result<FormatSelection, GrabError> {
    let catalog = list_formats(item);
    resolve_in(&catalog, &item.item.id, requested)
}

/// Resolve a request against an already built catalog
pub fn resolve_in(
    catalog: &[FormatDescriptor],
    item_id: &str,
    requested: &FormatRequest,
) -> Result<FormatSelection, GrabError> {
    match requested {
        FormatRequest::Best => Ok(resolve_best(catalog)),
        FormatRequest::AudioOnly => Ok(resolve_audio(catalog)),
        FormatRequest::Code(code) => resolve_code(catalog, item_id, code),
    }
}

/// Highest-ranked entry under `cmp`; the earliest wins ties
fn pick_best<'a, F>(candidates: impl Iterator<Item = &'a FormatDescriptor>, cmp: F) -> Option<&'a FormatDescriptor>
where
    F: Fn(&FormatDescriptor, &FormatDescriptor) -> Ordering,
{
    candidates.fold(None, |best, candidate| match best {
        Some(current) if cmp(candidate, current) != Ordering::Greater => Some(current),
        _ => Some(candidate),
    })
}

fn best_audio(catalog: &[FormatDescriptor]) -> Option<&FormatDescriptor> {
    pick_best(catalog.iter().filter(|f| f.is_audio()), FormatDescriptor::bitrate_cmp)
}

fn resolve_best(catalog: &[FormatDescriptor]) -> FormatSelection {
    let Some(top) = pick_best(
        catalog.iter().filter(|f| f.is_video_capable()),
        FormatDescriptor::quality_cmp,
    ) else {
        return FormatSelection::strategy_only(SelectionStrategy::BestQuality);
    };

    let mut formats = vec![top.clone()];
    if matches!(top.kind, MediaKind::Video(_)) {
        if let Some(audio) = best_audio(catalog) {
            formats.push(audio.clone());
        }
    }

    FormatSelection {
        strategy: SelectionStrategy::BestQuality,
        formats,
        requires_audio_extraction: false,
    }
}

fn resolve_audio(catalog: &[FormatDescriptor]) -> FormatSelection {
    if let Some(audio) = best_audio(catalog) {
        return FormatSelection {
            strategy: SelectionStrategy::AudioOnly,
            formats: vec![audio.clone()],
            requires_audio_extraction: false,
        };
    }

    match pick_best(catalog.iter().filter(|f| f.is_muxed()), FormatDescriptor::quality_cmp) {
        Some(muxed) => FormatSelection {
            strategy: SelectionStrategy::AudioOnly,
            formats: vec![muxed.clone()],
            requires_audio_extraction: true,
        },
        None => FormatSelection::strategy_only(SelectionStrategy::AudioOnly),
    }
}

fn resolve_code(
    catalog: &[FormatDescriptor],
    item_id: &str,
    code: &str,
) -> Result<FormatSelection, GrabError> {
    let mut formats = Vec::new();
    for part in code.split('+').map(str::trim) {
        let found = catalog
            .iter()
            .find(|f| f.code == part)
            .ok_or_else(|| GrabError::FormatNotFound {
                code: part.to_string(),
                item_id: item_id.to_string(),
            })?;
        formats.push(found.clone());
    }

    Ok(FormatSelection {
        strategy: SelectionStrategy::ExplicitCode,
        formats,
        requires_audio_extraction: false,
    })
}
