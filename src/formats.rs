use crate::{EngineError, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PRESET_ID: &str = "video-best-mp4";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }

    fn from_str(value: &str) -> Option<Self> {
        match value {
            "audio" => Some(MediaKind::Audio),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }
}

/// What yt-dlp should fetch and what container it should recode into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatSpec {
    pub kind: MediaKind,
    pub selector: String,
    pub container: String,
}

impl FormatSpec {
    /// Short label such as "MP4 video" for status lines.
    pub fn label(&self) -> String {
        format!("{} {}", self.container.to_uppercase(), self.kind.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct FormatPreset {
    pub id: &'static str,
    pub title: &'static str,
    pub token: &'static str,
}

pub const PRESETS: &[FormatPreset] = &[
    FormatPreset {
        id: "video-best-mp4",
        title: "Best video to MP4",
        token: "video|bestvideo+bestaudio/best#mp4",
    },
    FormatPreset {
        id: "video-best-webm",
        title: "Best video to WebM",
        token: "video|bestvideo+bestaudio/best#webm",
    },
    FormatPreset {
        id: "video-best-mkv",
        title: "Best video to MKV",
        token: "video|bestvideo+bestaudio/best#mkv",
    },
    FormatPreset {
        id: "video-2160p-mp4",
        title: "Best 2160p video to MP4",
        token: "video|bestvideo[height<=2160]+bestaudio/best[height<=2160]#mp4",
    },
    FormatPreset {
        id: "video-1440p-mp4",
        title: "Best 1440p video to MP4",
        token: "video|bestvideo[height<=1440]+bestaudio/best[height<=1440]#mp4",
    },
    FormatPreset {
        id: "video-1080p-mp4",
        title: "Best 1080p video to MP4",
        token: "video|bestvideo[height<=1080]+bestaudio/best[height<=1080]#mp4",
    },
    FormatPreset {
        id: "video-720p-mp4",
        title: "Best 720p video to MP4",
        token: "video|bestvideo[height<=720]+bestaudio/best[height<=720]#mp4",
    },
    FormatPreset {
        id: "video-480p-mp4",
        title: "Best 480p video to MP4",
        token: "video|bestvideo[height<=480]+bestaudio/best[height<=480]#mp4",
    },
    FormatPreset {
        id: "audio-best-mp3",
        title: "Best audio to MP3",
        token: "audio|bestaudio/best#mp3",
    },
    FormatPreset {
        id: "audio-best-m4a",
        title: "Best audio to M4A",
        token: "audio|bestaudio/best#m4a",
    },
    FormatPreset {
        id: "audio-best-flac",
        title: "Best audio to FLAC",
        token: "audio|bestaudio/best#flac",
    },
    FormatPreset {
        id: "audio-best-wav",
        title: "Best audio to WAV",
        token: "audio|bestaudio/best#wav",
    },
];

/// Parses a `<kind>|<selector>#<container>` token.
pub fn resolve_token(token: &str) -> Result<FormatSpec> {
    let invalid = || EngineError::InvalidFormatToken(token.to_string());

    let (kind, rest) = token.trim().split_once('|').ok_or_else(invalid)?;
    let (selector, container) = rest.split_once('#').ok_or_else(invalid)?;
    let kind = MediaKind::from_str(kind.trim()).ok_or_else(invalid)?;
    let selector = selector.trim();
    let container = container.trim();
    if selector.is_empty() || container.is_empty() || container.contains(['|', '#']) {
        return Err(invalid());
    }

    Ok(FormatSpec {
        kind,
        selector: selector.to_string(),
        container: container.to_ascii_lowercase(),
    })
}

pub fn find_preset(id: &str) -> Option<&'static FormatPreset> {
    PRESETS.iter().find(|p| p.id == id)
}

pub fn resolve_preset(id: &str) -> Result<FormatSpec> {
    let preset = find_preset(id).ok_or_else(|| EngineError::UnknownFormatPreset(id.to_string()))?;
    resolve_token(preset.token)
}

/// Accepts either a preset id or a raw token.
pub fn resolve_choice(choice: &str) -> Result<FormatSpec> {
    match find_preset(choice.trim()) {
        Some(preset) => resolve_token(preset.token),
        None => resolve_token(choice),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_height_capped_video_token() {
        let spec =
            resolve_token("video|bestvideo[height<=1080]+bestaudio/best[height<=1080]#mp4")
                .expect("token");
        assert_eq!(spec.kind, MediaKind::Video);
        assert_eq!(
            spec.selector,
            "bestvideo[height<=1080]+bestaudio/best[height<=1080]"
        );
        assert_eq!(spec.container, "mp4");
    }

    #[test]
    fn every_preset_resolves() {
        for preset in PRESETS {
            let spec = resolve_token(preset.token)
                .unwrap_or_else(|e| panic!("preset {} is broken: {e}", preset.id));
            let expected_kind = if preset.id.starts_with("audio-") {
                MediaKind::Audio
            } else {
                MediaKind::Video
            };
            assert_eq!(spec.kind, expected_kind, "{}", preset.id);
            assert!(preset.id.ends_with(&spec.container), "{}", preset.id);
        }
        assert!(find_preset(DEFAULT_PRESET_ID).is_some());
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        for token in [
            "",
            "video",
            "video|best",
            "video#mp4",
            "podcast|bestaudio#mp3",
            "audio|#mp3",
            "audio|bestaudio#",
        ] {
            assert!(
                matches!(resolve_token(token), Err(EngineError::InvalidFormatToken(_))),
                "{token:?} should be rejected"
            );
        }
    }

    #[test]
    fn choice_accepts_preset_ids_and_raw_tokens() {
        let from_id = resolve_choice("audio-best-flac").expect("preset");
        assert_eq!(from_id.kind, MediaKind::Audio);
        assert_eq!(from_id.container, "flac");
        assert_eq!(from_id.label(), "FLAC audio");

        let raw = resolve_choice("video|best#mkv").expect("raw");
        assert_eq!(raw.selector, "best");

        assert!(matches!(
            resolve_preset("nope"),
            Err(EngineError::UnknownFormatPreset(_))
        ));
    }
}
