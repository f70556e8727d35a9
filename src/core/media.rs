//! Media item, playlist and metadata structures

use crate::platform::formats::RawFormat;
use serde::{Deserialize, Serialize};

/// Availability of a remote item as known at enumeration time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Available,
    Unavailable,
    #[default]
    Unknown,
}

/// A single downloadable media unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    /// Opaque remote identifier
    pub id: String,
    /// Item title
    pub title: String,
    /// Duration in seconds (if known)
    pub duration: Option<u32>,
    /// Uploader/channel name (if known)
    pub uploader: Option<String>,
    /// Page URL the engine can resolve again
    pub url: Option<String>,
    /// 1-based position inside its playlist
    pub position: Option<usize>,
    /// Availability status
    pub availability: Availability,
}

impl MediaItem {
    /// Create a new MediaItem
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            duration: None,
            uploader: None,
            url: None,
            position: None,
            availability: Availability::Unknown,
        }
    }

    pub fn with_duration(mut self, seconds: u32) -> Self {
        self.duration = Some(seconds);
        self
    }

    pub fn with_uploader(mut self, uploader: impl Into<String>) -> Self {
        self.uploader = Some(uploader.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_position(mut self, position: usize) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_availability(mut self, availability: Availability) -> Self {
        self.availability = availability;
        self
    }

    /// URL or identifier handed to the extraction engine
    pub fn source(&self) -> String {
        self.url
            .clone()
            .unwrap_or_else(|| crate::utils::url::watch_url(&self.id))
    }

    /// Title usable for fallback searches.
    ///
    /// Placeholder titles the platform gives to removed entries carry no
    /// information about the original content and are treated as absent.
    pub fn searchable_title(&self) -> Option<&str> {
        let title = self.title.trim();
        if title.is_empty() || is_placeholder_title(title) {
            None
        } else {
            Some(title)
        }
    }
}

/// Titles the platform substitutes for entries that are gone
pub fn is_placeholder_title(title: &str) -> bool {
    matches!(
        title.trim(),
        "[Private video]" | "[Deleted video]" | "[Unavailable video]"
    )
}

/// Fully resolved metadata of one item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDetails {
    /// Item identity and basic metadata
    pub item: MediaItem,
    /// Item description
    pub description: Option<String>,
    /// View count
    pub view_count: Option<u64>,
    /// Upload date (YYYYMMDD)
    pub upload_date: Option<String>,
    /// Thumbnail URL
    pub thumbnail: Option<String>,
    /// Format entries exactly as the engine reported them
    pub raw_formats: Vec<RawFormat>,
}

impl ItemDetails {
    /// Create details with no extra metadata
    pub fn new(item: MediaItem, raw_formats: Vec<RawFormat>) -> Self {
        Self {
            item,
            description: None,
            view_count: None,
            upload_date: None,
            thumbnail: None,
            raw_formats,
        }
    }

    /// Upload date formatted as YYYY-MM-DD
    pub fn upload_date_string(&self) -> Option<String> {
        let date = self.upload_date.as_deref()?;
        if date.len() == 8 && date.chars().all(|c| c.is_ascii_digit()) {
            Some(format!("{}-{}-{}", &date[0..4], &date[4..6], &date[6..8]))
        } else {
            Some(date.to_string())
        }
    }
}

/// An ordered collection of items sharing a remote grouping identifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playlist {
    /// Playlist ID
    pub id: String,
    /// Playlist title
    pub title: String,
    /// Playlist owner
    pub uploader: Option<String>,
    /// Members in declared order, positions 1..=len
    pub entries: Vec<MediaItem>,
}

impl Playlist {
    /// Create a playlist, numbering entries by declared order
    pub fn new(id: impl Into<String>, title: impl Into<String>, entries: Vec<MediaItem>) -> Self {
        let entries = entries
            .into_iter()
            .enumerate()
            .map(|(index, item)| item.with_position(index + 1))
            .collect();
        Self {
            id: id.into(),
            title: title.into(),
            uploader: None,
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of resolving a URL
#[derive(Debug, Clone)]
pub enum Probe {
    Item(Box<ItemDetails>),
    Playlist(Playlist),
}
