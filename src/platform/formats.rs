//! Raw format entries as reported by the extraction engine

use crate::core::catalog::{AudioTrack, FormatDescriptor, MediaKind, VideoTrack};
use serde::{Deserialize, Serialize};

/// Extensions that denote audio-only containers when codecs are not reported
const AUDIO_EXTENSIONS: &[&str] = &["m4a", "mp3", "opus", "ogg", "wav", "flac", "aac"];

/// One entry of the engine's `formats` array.
///
/// Field names follow the engine's JSON. Anything may be missing, so every
/// field is optional and classification happens in [`RawFormat::classify`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFormat {
    pub format_id: Option<String>,
    pub ext: Option<String>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
    /// Total bitrate in kbps
    pub tbr: Option<f64>,
    /// Audio bitrate in kbps
    pub abr: Option<f64>,
    /// Video bitrate in kbps
    pub vbr: Option<f64>,
    pub asr: Option<u32>,
    pub filesize: Option<u64>,
    pub filesize_approx: Option<u64>,
    pub format_note: Option<String>,
}

impl RawFormat {
    /// Video-only entry
    pub fn video(code: &str, ext: &str, height: u32, tbr: f64) -> Self {
        Self {
            format_id: Some(code.to_string()),
            ext: Some(ext.to_string()),
            vcodec: Some("avc1".to_string()),
            acodec: Some("none".to_string()),
            height: Some(height),
            width: Some(height * 16 / 9),
            tbr: Some(tbr),
            ..Default::default()
        }
    }

    /// Audio-only entry
    pub fn audio(code: &str, ext: &str, abr: f64) -> Self {
        Self {
            format_id: Some(code.to_string()),
            ext: Some(ext.to_string()),
            vcodec: Some("none".to_string()),
            acodec: Some("mp4a.40.2".to_string()),
            abr: Some(abr),
            tbr: Some(abr),
            ..Default::default()
        }
    }

    /// Combined video+audio entry
    pub fn muxed(code: &str, ext: &str, height: u32, tbr: f64) -> Self {
        Self {
            acodec: Some("mp4a.40.2".to_string()),
            ..Self::video(code, ext, height, tbr)
        }
    }

    /// Map this entry onto the closed set of media kinds.
    ///
    /// Entries that carry neither a video nor an audio stream (storyboards,
    /// manifests without codecs) yield `None` and never reach the catalog.
    pub fn classify(&self) -> Option<FormatDescriptor> {
        let code = self.format_id.clone().filter(|c| !c.is_empty())?;
        let container = self.ext.clone().unwrap_or_else(|| "unknown".to_string());

        let has_video = codec_present(&self.vcodec);
        let has_audio = codec_present(&self.acodec);

        let video = || VideoTrack {
            width: self.width,
            height: self.height,
            fps: self.fps.map(|f| f.round() as u32),
            codec: self.vcodec.clone().filter(|c| c != "none"),
        };
        let audio = || AudioTrack {
            codec: self.acodec.clone().filter(|c| c != "none"),
            sample_rate: self.asr,
        };

        let kind = match (has_video, has_audio) {
            (Some(true), Some(true)) => MediaKind::Muxed {
                video: video(),
                audio: audio(),
            },
            (Some(true), _) => MediaKind::Video(video()),
            (Some(false), Some(true)) => MediaKind::Audio(audio()),
            (Some(false), _) => return None,
            // Video codec not reported: fall back on dimensions and container
            (None, Some(false)) if self.height.is_some() => MediaKind::Video(video()),
            (None, Some(false)) => return None,
            (None, Some(true)) if self.height.is_none() => MediaKind::Audio(audio()),
            (None, _) if self.height.is_some() => MediaKind::Muxed {
                video: video(),
                audio: audio(),
            },
            (None, _) if AUDIO_EXTENSIONS.contains(&container.as_str()) => {
                MediaKind::Audio(audio())
            }
            _ => return None,
        };

        let bitrate = self
            .tbr
            .or_else(|| match (self.vbr, self.abr) {
                (Some(v), Some(a)) => Some(v + a),
                (v, a) => v.or(a),
            })
            .map(|kbps| kbps.round() as u32);

        Some(FormatDescriptor {
            code,
            container,
            kind,
            bitrate,
            estimated_size: self.filesize.or(self.filesize_approx),
            note: self.format_note.clone(),
        })
    }
}

/// `Some(true)` for a real codec, `Some(false)` for the literal "none",
/// `None` when the engine did not say.
fn codec_present(codec: &Option<String>) -> Option<bool> {
    codec
        .as_deref()
        .map(|c| !c.is_empty() && c != "none")
}
