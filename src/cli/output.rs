//! Output formatting and progress display

use crate::cli::args::VerbosityLevel;
use crate::core::catalog::{FormatDescriptor, MediaKind};
use crate::core::media::{Availability, ItemDetails, Playlist};
use crate::core::outcome::{DownloadOutcome, RunSummary};
use crate::core::progress::{format_bytes, format_clock, format_duration, ItemEvent, ItemStatus};
use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;

/// Playlist entries shown by `--info` before truncating
const INFO_ENTRY_LIMIT: usize = 10;

/// Output formatter for ytgrab
pub struct OutputFormatter {
    verbosity: VerbosityLevel,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self { verbosity }
    }

    pub fn verbosity(&self) -> VerbosityLevel {
        self.verbosity
    }

    fn is_quiet(&self) -> bool {
        self.verbosity == VerbosityLevel::Quiet
    }

    /// Print info message
    pub fn info(&self, message: &str) {
        if !self.is_quiet() {
            println!("ℹ️  {}", message);
        }
    }

    /// Print success message
    pub fn success(&self, message: &str) {
        if !self.is_quiet() {
            println!("✅ {}", message.green());
        }
    }

    /// Print warning message
    pub fn warning(&self, message: &str) {
        if !self.is_quiet() {
            eprintln!("⚠️  {}", message.yellow());
        }
    }

    /// Print error message
    pub fn error(&self, message: &str) {
        eprintln!("❌ {}", message.red());
    }

    /// Print debug message
    pub fn debug(&self, message: &str) {
        if self.verbosity == VerbosityLevel::Verbose {
            println!("🐛 {}", message.dimmed());
        }
    }

    /// Print video information
    pub fn print_item_info(&self, details: &ItemDetails) {
        if self.is_quiet() {
            return;
        }

        let item = &details.item;
        println!("📹 {}", item.title.bold());
        println!("🆔 {}", item.id);
        if let Some(uploader) = &item.uploader {
            println!("👤 {}", uploader);
        }
        if let Some(duration) = item.duration {
            println!("⏱️  {}", format_clock(duration));
        }
        if let Some(date) = details.upload_date_string() {
            println!("📅 {}", date);
        }
        if let Some(views) = details.view_count {
            println!("👁️  {} views", views);
        }
        println!("📊 {} formats available", details.raw_formats.len());

        if let Some(description) = details.description.as_deref().filter(|d| !d.trim().is_empty()) {
            println!();
            for line in wrap_text(description, 80) {
                println!("  {}", line);
            }
        }
        println!();
    }

    /// Print playlist information
    pub fn print_playlist_info(&self, playlist: &Playlist) {
        if self.is_quiet() {
            return;
        }

        println!("📋 {}", playlist.title.bold());
        println!("🆔 {}", playlist.id);
        if let Some(uploader) = &playlist.uploader {
            println!("👤 {}", uploader);
        }
        println!("📊 Items: {}", playlist.len());
        println!();

        for entry in playlist.entries.iter().take(INFO_ENTRY_LIMIT) {
            let duration = entry.duration.map(format_clock).unwrap_or_else(|| "--:--".to_string());
            let line = format!(
                "  {:>3}. {} [{}]",
                entry.position.unwrap_or_default(),
                entry.title,
                duration
            );
            if entry.availability == Availability::Unavailable {
                println!("{} {}", line.dimmed(), "(unavailable)".red());
            } else {
                println!("{}", line);
            }
        }
        if playlist.len() > INFO_ENTRY_LIMIT {
            println!("  ... and {} more", playlist.len() - INFO_ENTRY_LIMIT);
        }
    }

    /// Print the format table, grouped by what each format carries
    pub fn print_formats(&self, details: &ItemDetails, formats: &[FormatDescriptor]) {
        if self.is_quiet() {
            return;
        }

        println!("📹 {}", details.item.title.bold());
        println!();

        let groups: [(&str, fn(&FormatDescriptor) -> bool); 3] = [
            ("Video + Audio", |f| matches!(f.kind, MediaKind::Muxed { .. })),
            ("Video only", |f| matches!(f.kind, MediaKind::Video(_))),
            ("Audio only", |f| matches!(f.kind, MediaKind::Audio(_))),
        ];

        for (heading, belongs) in groups {
            let rows: Vec<&FormatDescriptor> = formats.iter().filter(|f| belongs(f)).collect();
            if rows.is_empty() {
                continue;
            }
            println!("{}", heading.cyan().bold());
            println!(
                "  {:<10} {:<6} {:<12} {:>4} {:>9} {:>10}  {}",
                "CODE", "EXT", "RESOLUTION", "FPS", "BITRATE", "SIZE", "NOTE"
            );
            for format in rows {
                println!("  {}", format_row(format));
            }
            println!();
        }

        if formats.is_empty() {
            self.warning("No formats available");
        }
    }

    /// Print the result of a single download
    pub fn print_outcome(&self, outcome: &DownloadOutcome) {
        match outcome {
            DownloadOutcome::Succeeded {
                path,
                audio_extracted,
                ..
            } => {
                self.success(&format!("Saved to {}", path.display()));
                if *audio_extracted {
                    self.debug("Audio was extracted from a combined stream");
                }
            }
            DownloadOutcome::SkippedExisting { path, .. } => {
                self.info(&format!("Already downloaded: {}", path.display()));
            }
            DownloadOutcome::Substituted {
                original_id,
                substitute_id,
                path,
            } => {
                self.success(&format!(
                    "Saved substitute {} for {} to {}",
                    substitute_id,
                    original_id,
                    path.display()
                ));
            }
            DownloadOutcome::Failed { item_id, reason } => {
                self.error(&format!("{}: {}", item_id, reason));
            }
        }
    }

    /// Print one line per playlist member followed by the counts
    pub fn print_summary(&self, summary: &RunSummary) {
        if !self.is_quiet() {
            println!();
            println!("📋 {}", summary.title.bold());
            for outcome in &summary.outcomes {
                println!("  {}", summary_line(outcome));
            }
            println!();
        }

        let counts = summary.counts();
        let totals = format!(
            "{} downloaded, {} substituted, {} skipped, {} failed in {}",
            counts.succeeded,
            counts.substituted,
            counts.skipped,
            counts.failed,
            format_duration(summary.elapsed())
        );
        if counts.failed > 0 {
            self.error(&totals);
        } else {
            self.success(&totals);
        }
    }

    /// Print any serializable result as pretty JSON
    pub fn print_json<T: Serialize>(&self, value: &T) -> serde_json::Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

fn format_row(format: &FormatDescriptor) -> String {
    let fps = format.fps().map(|f| f.to_string()).unwrap_or_default();
    let bitrate = format.bitrate.map(|b| format!("{}k", b)).unwrap_or_default();
    let size = format.estimated_size.map(format_bytes).unwrap_or_default();
    format!(
        "{:<10} {:<6} {:<12} {:>4} {:>9} {:>10}  {}",
        format.code,
        format.container,
        format.resolution_string(),
        fps,
        bitrate,
        size,
        format.note.as_deref().unwrap_or_default()
    )
}

fn summary_line(outcome: &DownloadOutcome) -> String {
    let label = format!("{:<11}", outcome.label());
    match outcome {
        DownloadOutcome::Succeeded { path, .. } => {
            format!("{} {}", label.green(), path.display())
        }
        DownloadOutcome::SkippedExisting { path, .. } => {
            format!("{} {}", label.dimmed(), path.display())
        }
        DownloadOutcome::Substituted {
            substitute_id,
            path,
            ..
        } => format!("{} {} (via {})", label.yellow(), path.display(), substitute_id),
        DownloadOutcome::Failed { item_id, reason } => {
            format!("{} {}: {}", label.red(), item_id, reason)
        }
    }
}

/// Greedy word wrap
fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            if !line.is_empty() && line.chars().count() + 1 + word.chars().count() > width {
                lines.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(word);
        }
        lines.push(line);
    }
    lines
}

/// Renders item events as one progress bar per item
pub struct ProgressDisplay {
    multi: MultiProgress,
    bars: HashMap<String, ProgressBar>,
}

impl ProgressDisplay {
    pub fn new(enabled: bool) -> Self {
        let target = if enabled {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        Self {
            multi: MultiProgress::with_draw_target(target),
            bars: HashMap::new(),
        }
    }

    /// Apply one event
    pub fn handle(&mut self, event: ItemEvent) {
        let key = slot_key(&event);
        let bar = match self.bars.get(&key) {
            Some(bar) => bar.clone(),
            None => {
                let bar = self.multi.add(ProgressBar::new(100));
                bar.set_style(bar_style());
                bar.set_prefix(match event.position {
                    Some(position) => format!("{:>3}", position),
                    None => "  -".to_string(),
                });
                bar.enable_steady_tick(Duration::from_millis(120));
                self.bars.insert(key, bar.clone());
                bar
            }
        };

        match event.status {
            ItemStatus::Queued => bar.set_message(format!("{} {}", "queued".dimmed(), event.title)),
            ItemStatus::Resolving => bar.set_message(format!("{} {}", "resolving".cyan(), event.title)),
            ItemStatus::Transferring { percent } => {
                bar.set_position(percent.clamp(0.0, 100.0) as u64);
                bar.set_message(event.title);
            }
            ItemStatus::Done => {
                bar.set_position(100);
                bar.finish_with_message(format!("{} {}", "done".green(), event.title));
            }
            ItemStatus::Skipped => {
                bar.finish_with_message(format!("{} {}", "skipped".dimmed(), event.title));
            }
            ItemStatus::Failed { reason } => {
                bar.abandon_with_message(format!("{} {} ({})", "failed".red(), event.title, reason));
            }
        }
    }

    /// Number of items seen so far
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Consume events until every sender is gone
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ItemEvent>) {
        while let Some(event) = rx.recv().await {
            self.handle(event);
        }
        let _ = self.multi.clear();
    }
}

fn slot_key(event: &ItemEvent) -> String {
    match event.position {
        Some(position) => format!("{}#{}", position, event.item_id),
        None => event.item_id.clone(),
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix} {spinner:.green} [{bar:30.cyan/blue}] {pos:>3}% {wide_msg}")
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::{AudioTrack, VideoTrack};
    use crate::core::media::MediaItem;
    use crate::core::outcome::FailureReason;
    use chrono::Utc;
    use std::path::PathBuf;

    fn event(id: &str, position: Option<usize>, status: ItemStatus) -> ItemEvent {
        ItemEvent {
            item_id: id.to_string(),
            title: format!("Title {}", id),
            position,
            status,
        }
    }

    #[test]
    fn test_output_formatter_verbosity_levels() {
        for level in [VerbosityLevel::Quiet, VerbosityLevel::Normal, VerbosityLevel::Verbose] {
            let formatter = OutputFormatter::new(level);
            assert_eq!(formatter.verbosity(), level);
        }
    }

    #[test]
    fn test_verbosity_levels() {
        let formatter = OutputFormatter::new(VerbosityLevel::Quiet);
        // These should not print anything in quiet mode
        formatter.info("test");
        formatter.success("test");
        formatter.warning("test");
        formatter.debug("test");

        // Error should always print
        formatter.error("test");
    }

    #[test]
    fn test_wrap_text() {
        let lines = wrap_text("one two three four", 9);
        assert_eq!(lines, vec!["one two", "three", "four"]);

        let lines = wrap_text("first\n\nsecond", 80);
        assert_eq!(lines, vec!["first", "", "second"]);

        let lines = wrap_text("averyveryverylongword", 5);
        assert_eq!(lines, vec!["averyveryverylongword"]);
    }

    #[test]
    fn test_format_row() {
        let format = FormatDescriptor {
            code: "22".to_string(),
            container: "mp4".to_string(),
            kind: MediaKind::Muxed {
                video: VideoTrack {
                    width: Some(1280),
                    height: Some(720),
                    fps: Some(30),
                    codec: None,
                },
                audio: AudioTrack::default(),
            },
            bitrate: Some(1500),
            estimated_size: Some(1048576),
            note: Some("720p".to_string()),
        };
        let row = format_row(&format);
        assert!(row.starts_with("22 "));
        assert!(row.contains("1280x720"));
        assert!(row.contains("1500k"));
        assert!(row.contains("1.0 MB"));
        assert!(row.ends_with("720p"));
    }

    #[test]
    fn test_summary_line_labels() {
        colored::control::set_override(false);
        let line = summary_line(&DownloadOutcome::Failed {
            item_id: "abc".to_string(),
            reason: FailureReason::Cancelled,
        });
        assert!(line.starts_with("failed"));
        assert!(line.contains("abc: cancelled before start"));

        let line = summary_line(&DownloadOutcome::Substituted {
            original_id: "abc".to_string(),
            substitute_id: "xyz".to_string(),
            path: PathBuf::from("001 - Song.mp3"),
        });
        assert!(line.starts_with("substituted"));
        assert!(line.contains("(via xyz)"));
    }

    #[test]
    fn test_print_quiet_mode() {
        let formatter = OutputFormatter::new(VerbosityLevel::Quiet);
        let details = ItemDetails::new(MediaItem::new("abc", "Song").with_duration(200), Vec::new());
        let playlist = Playlist::new("PL1", "Mix", vec![MediaItem::new("abc", "Song")]);
        // Should not panic or print anything
        formatter.print_item_info(&details);
        formatter.print_playlist_info(&playlist);
        formatter.print_formats(&details, &[]);
    }

    #[test]
    fn test_print_summary() {
        let formatter = OutputFormatter::new(VerbosityLevel::Normal);
        let summary = RunSummary {
            title: "Mix".to_string(),
            output_dir: PathBuf::from("/tmp/Mix"),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            outcomes: vec![DownloadOutcome::SkippedExisting {
                item_id: "abc".to_string(),
                path: PathBuf::from("/tmp/Mix/001 - Song.mp3"),
            }],
        };
        // Should not panic
        formatter.print_summary(&summary);
        formatter.print_json(&summary).unwrap();
    }

    #[test]
    fn test_progress_display_tracks_slots() {
        let mut display = ProgressDisplay::new(false);
        display.handle(event("a", Some(1), ItemStatus::Queued));
        display.handle(event("a", Some(1), ItemStatus::Transferring { percent: 42.0 }));
        display.handle(event("b", Some(2), ItemStatus::Queued));
        display.handle(event("a", Some(1), ItemStatus::Done));
        // Same item twice in one playlist gets separate bars
        display.handle(event("b", Some(3), ItemStatus::Queued));
        display.handle(event("b", Some(2), ItemStatus::Failed { reason: "gone".into() }));

        assert_eq!(display.len(), 3);
        assert_eq!(display.bars["1#a"].position(), 100);
        assert!(display.bars["2#b"].is_finished());
        assert!(!display.bars["3#b"].is_finished());
    }

    #[tokio::test]
    async fn test_progress_display_drains_channel() {
        let (sink, rx) = crate::core::progress::EventSink::channel();
        sink.emit(event("a", None, ItemStatus::Queued));
        sink.emit(event("a", None, ItemStatus::Skipped));
        drop(sink);

        ProgressDisplay::new(false).run(rx).await;
    }
}
