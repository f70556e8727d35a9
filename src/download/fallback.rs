//! Substitute lookup for unavailable playlist members
//!
//! The match is a heuristic. A wrong video can be picked when titles
//! collide; that risk is accepted.

use crate::core::media::{is_placeholder_title, MediaItem};
use crate::platform::engine::ExtractionEngine;
use crate::utils::filename::normalize_title;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Fallback tunables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackConfig {
    /// Look for substitutes at all
    pub enabled: bool,
    /// Search results to inspect
    pub max_results: usize,
    /// Largest accepted duration difference for a non-exact title match
    pub duration_tolerance: Duration,
    /// Limit for the search call
    pub search_timeout: Duration,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_results: 5,
            duration_tolerance: Duration::from_secs(5),
            search_timeout: Duration::from_secs(60),
        }
    }
}

impl FallbackConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    pub fn with_duration_tolerance(mut self, tolerance: Duration) -> Self {
        self.duration_tolerance = tolerance;
        self
    }
}

/// Finds an equivalent item for one that cannot be downloaded
#[derive(Clone)]
pub struct FallbackResolver {
    engine: Arc<dyn ExtractionEngine>,
    config: FallbackConfig,
}

impl FallbackResolver {
    pub fn new(engine: Arc<dyn ExtractionEngine>, config: FallbackConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &FallbackConfig {
        &self.config
    }

    /// Search query built from what was known at enumeration time
    pub fn search_query(item: &MediaItem) -> Option<String> {
        let title = item.searchable_title()?;
        let uploader = item
            .uploader
            .as_deref()
            .map(|u| u.trim().trim_end_matches(" - Topic").trim())
            .filter(|u| !u.is_empty());

        Some(match uploader {
            Some(uploader) => format!("{} {}", title, uploader),
            None => title.to_string(),
        })
    }

    /// Look for a substitute for `unavailable`.
    ///
    /// The first result with the same title (case and whitespace ignored)
    /// wins. Otherwise the top result is taken only when both durations are
    /// known and within the configured tolerance. The original item is never
    /// its own substitute.
    pub async fn find_alternative(&self, unavailable: &MediaItem) -> Option<MediaItem> {
        let Some(query) = Self::search_query(unavailable) else {
            info!("No usable title for {}, no substitute search", unavailable.id);
            return None;
        };

        info!("Searching substitute for '{}' ({})", unavailable.title, unavailable.id);
        let search = self.engine.search(&query, self.config.max_results);
        let results = match tokio::time::timeout(self.config.search_timeout, search).await {
            Ok(Ok(results)) => results,
            Ok(Err(e)) => {
                warn!("Substitute search for {} failed: {}", unavailable.id, e);
                return None;
            }
            Err(_) => {
                warn!("Substitute search for {} timed out", unavailable.id);
                return None;
            }
        };

        let candidates: Vec<&MediaItem> = results
            .iter()
            .filter(|c| c.id != unavailable.id && !is_placeholder_title(&c.title))
            .collect();
        debug!("{} candidate(s) for {}", candidates.len(), unavailable.id);

        let wanted = normalize_title(&unavailable.title);
        if let Some(exact) = candidates.iter().find(|c| normalize_title(&c.title) == wanted) {
            info!("Substitute for {}: {} (title match)", unavailable.id, exact.id);
            return Some((*exact).clone());
        }

        let top = candidates.first()?;
        match (unavailable.duration, top.duration) {
            (Some(original), Some(found))
                if u64::from(original.abs_diff(found)) <= self.config.duration_tolerance.as_secs() =>
            {
                info!(
                    "Substitute for {}: {} ('{}', duration {}s vs {}s)",
                    unavailable.id, top.id, top.title, found, original
                );
                Some((*top).clone())
            }
            _ => {
                info!("No substitute close enough for {}", unavailable.id);
                None
            }
        }
    }
}
