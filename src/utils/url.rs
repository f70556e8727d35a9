//! URL utilities for classifying and normalizing media URLs

use crate::error::GrabError;
use url::Url;

/// Prefixes of bare playlist identifiers
const PLAYLIST_ID_PREFIXES: &[&str] = &["PL", "UU", "OLAK5uy_", "RD"];

/// Canonical watch URL for an item identifier
pub fn watch_url(id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", id)
}

/// Canonical URL for a playlist identifier
pub fn playlist_url(id: &str) -> String {
    format!("https://www.youtube.com/playlist?list={}", id)
}

fn is_bare_video_id(input: &str) -> bool {
    input.len() == 11
        && input
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn is_bare_playlist_id(input: &str) -> bool {
    input.len() > 12
        && PLAYLIST_ID_PREFIXES.iter().any(|p| input.starts_with(p))
        && input
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Turn user input into a URL the engine accepts.
///
/// Full http(s) URLs pass through, bare item and playlist identifiers are
/// expanded to their canonical URLs.
pub fn normalize_target(input: &str) -> Result<String, GrabError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(GrabError::InvalidUrl("empty URL".to_string()));
    }

    if is_bare_playlist_id(input) {
        return Ok(playlist_url(input));
    }
    if is_bare_video_id(input) {
        return Ok(watch_url(input));
    }

    let parsed = Url::parse(input)?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(GrabError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                other
            )))
        }
    }
    if parsed.host_str().is_none() {
        return Err(GrabError::InvalidUrl("missing host".to_string()));
    }

    Ok(parsed.to_string())
}

/// Check if URL points at a playlist
pub fn is_playlist_url(url: &str) -> bool {
    if let Ok(parsed) = Url::parse(url) {
        parsed.path().contains("/playlist") || parsed.query_pairs().any(|(key, _)| key == "list")
    } else {
        is_bare_playlist_id(url)
    }
}

/// Check if URL belongs to the music front-end
pub fn is_music_url(url: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(|h| h.eq_ignore_ascii_case("music.youtube.com")))
        .unwrap_or(false)
}
