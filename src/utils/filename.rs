//! Safe filename generation utilities

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Longest sanitized component, in bytes
const MAX_COMPONENT_LEN: usize = 200;

fn invalid_chars() -> &'static Regex {
    static INVALID: OnceLock<Regex> = OnceLock::new();
    INVALID.get_or_init(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f\x7f]"#).expect("valid filename pattern"))
}

/// Make a title safe to use as a single path component.
///
/// Invalid characters become `_`, surrounding dots and spaces are removed and
/// the result is capped at 200 bytes. An empty result becomes `fallback`.
pub fn sanitize_component(title: &str, fallback: &str) -> String {
    let replaced = invalid_chars().replace_all(title, "_");
    let mut safe = replaced
        .trim_matches(|c: char| c == '.' || c == ' ')
        .to_string();

    if safe.len() > MAX_COMPONENT_LEN {
        let mut cut = MAX_COMPONENT_LEN;
        while !safe.is_char_boundary(cut) {
            cut -= 1;
        }
        safe.truncate(cut);
        safe = safe.trim_end_matches(|c: char| c == '.' || c == ' ').to_string();
    }

    if safe.is_empty() {
        fallback.to_string()
    } else {
        safe
    }
}

/// File stem for a single item: `<title> [<id>]`, so items sharing a
/// title never share a file
pub fn item_stem(title: &str, id: &str) -> String {
    format!(
        "{} [{}]",
        sanitize_component(title, "video"),
        sanitize_component(id, "unknown")
    )
}

/// File stem for a playlist member: `<NNN> - <title>`
pub fn member_stem(position: usize, title: &str) -> String {
    format!("{:03} - {}", position, sanitize_component(title, "video"))
}

/// Directory name for a playlist
pub fn playlist_dir_name(title: &str) -> String {
    sanitize_component(title, "playlist")
}

/// Lowercase and collapse whitespace so titles can be compared
pub fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Find a finished file in `dir` whose stem is exactly `stem`.
///
/// Partial transfers (`.part`, `.ytdl`, `.tmp`) do not count.
pub async fn find_by_stem(dir: &Path, stem: &str) -> std::io::Result<Option<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_partial = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("part") | Some("ytdl") | Some("tmp")
        );
        if is_partial || !entry.file_type().await?.is_file() {
            continue;
        }
        if path.file_stem().and_then(|s| s.to_str()) == Some(stem) {
            return Ok(Some(path));
        }
    }

    Ok(None)
}
