//! Playlist member selection

use crate::error::GrabError;
use crate::Result;
use std::fmt;

/// Which playlist members to process, by 1-based position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemFilter {
    #[default]
    All,
    /// A single member
    Single(usize),
    /// Inclusive range; an open end runs to the last member
    Range { start: usize, end: Option<usize> },
}

impl ItemFilter {
    /// Build a filter from CLI-style inputs
    pub fn from_options(item: Option<usize>, start: Option<usize>, end: Option<usize>) -> Self {
        match (item, start, end) {
            (Some(index), _, _) => ItemFilter::Single(index),
            (None, None, None) => ItemFilter::All,
            (None, start, end) => ItemFilter::Range {
                start: start.unwrap_or(1),
                end,
            },
        }
    }

    /// Zero-based indices of the selected members of a playlist of `len`
    /// entries, in playlist order.
    pub fn select(&self, len: usize) -> Result<Vec<usize>> {
        match *self {
            ItemFilter::All => Ok((0..len).collect()),
            ItemFilter::Single(index) => {
                if index == 0 || index > len {
                    return Err(GrabError::invalid_range(format!(
                        "item {} is outside the playlist (1..={})",
                        index, len
                    )));
                }
                Ok(vec![index - 1])
            }
            ItemFilter::Range { start, end } => {
                let end_index = end.unwrap_or(len);
                if start == 0 {
                    return Err(GrabError::invalid_range("positions start at 1"));
                }
                if start > end_index {
                    return Err(GrabError::invalid_range(format!(
                        "start {} is after end {}",
                        start, end_index
                    )));
                }
                if end_index > len {
                    return Err(GrabError::invalid_range(format!(
                        "end {} is outside the playlist (1..={})",
                        end_index, len
                    )));
                }
                Ok((start - 1..end_index).collect())
            }
        }
    }
}

impl fmt::Display for ItemFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemFilter::All => write!(f, "all items"),
            ItemFilter::Single(index) => write!(f, "item #{}", index),
            ItemFilter::Range { start, end: Some(end) } => write!(f, "items #{}-#{}", start, end),
            ItemFilter::Range { start, end: None } => write!(f, "items #{}-end", start),
        }
    }
}
