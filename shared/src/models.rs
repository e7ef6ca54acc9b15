/// Domain models shared across all Songdrop crates.
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::ConfigError;

/// File stem every artifact is written under, inside its own scratch directory.
pub const OUTPUT_STEM: &str = "downloaded_song";

/// Extension placeholder understood by the fetcher's output template.
pub const EXT_PLACEHOLDER: &str = "%(ext)s";

/// Form body of `POST /download`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DownloadRequest {
    #[serde(default)]
    pub url: Option<String>,
}

/// Stream selection policy handed to the fetcher.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FormatSelector {
    /// Best audio-only stream, falling back to the best muxed stream.
    BestAudio,
}

impl FormatSelector {
    pub fn as_arg(&self) -> &'static str {
        match self {
            FormatSelector::BestAudio => "bestaudio/best",
        }
    }
}

/// Target audio codec for the transcoding step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AudioCodec {
    Mp3,
    M4a,
    Aac,
    Opus,
    Vorbis,
    Flac,
    Wav,
}

impl AudioCodec {
    /// Name as accepted by `--audio-format`.
    pub fn name(&self) -> &'static str {
        match self {
            AudioCodec::Mp3 => "mp3",
            AudioCodec::M4a => "m4a",
            AudioCodec::Aac => "aac",
            AudioCodec::Opus => "opus",
            AudioCodec::Vorbis => "vorbis",
            AudioCodec::Flac => "flac",
            AudioCodec::Wav => "wav",
        }
    }

    /// Extension of the file the transcoder leaves behind.
    pub fn extension(&self) -> &'static str {
        match self {
            AudioCodec::Vorbis => "ogg",
            other => other.name(),
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            AudioCodec::Mp3 => "audio/mpeg",
            AudioCodec::M4a => "audio/mp4",
            AudioCodec::Aac => "audio/aac",
            AudioCodec::Opus | AudioCodec::Vorbis => "audio/ogg",
            AudioCodec::Flac => "audio/flac",
            AudioCodec::Wav => "audio/wav",
        }
    }
}

impl std::fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for AudioCodec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp3" => Ok(AudioCodec::Mp3),
            "m4a" => Ok(AudioCodec::M4a),
            "aac" => Ok(AudioCodec::Aac),
            "opus" => Ok(AudioCodec::Opus),
            "vorbis" | "ogg" => Ok(AudioCodec::Vorbis),
            "flac" => Ok(AudioCodec::Flac),
            "wav" => Ok(AudioCodec::Wav),
            _ => Err(ConfigError::Invalid {
                key: "AUDIO_FORMAT",
                value: s.to_string(),
                reason: "expected one of mp3, m4a, aac, opus, vorbis, flac, wav".to_string(),
            }),
        }
    }
}

/// Kind of post-processing step the fetcher runs after download.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PostProcessorKind {
    /// Extract the audio track and transcode it with ffmpeg.
    ExtractAudio,
}

/// One post-processing step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostProcessor {
    pub kind: PostProcessorKind,
    pub codec: AudioCodec,
    /// Bitrate in kbps (e.g. "192") or a VBR level "0"-"10".
    pub quality: String,
}

/// Everything the fetcher needs besides the URL. Built per request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FetchConfig {
    pub format: FormatSelector,
    pub output_template: String,
    pub post_processors: Vec<PostProcessor>,
}

impl FetchConfig {
    /// Best-audio download transcoded to `codec`, written into `output_dir`.
    pub fn audio(output_dir: &Path, codec: AudioCodec, quality: impl Into<String>) -> Self {
        let template = output_dir.join(format!("{}.{}", OUTPUT_STEM, EXT_PLACEHOLDER));
        Self {
            format: FormatSelector::BestAudio,
            output_template: template.to_string_lossy().into_owned(),
            post_processors: vec![PostProcessor {
                kind: PostProcessorKind::ExtractAudio,
                codec,
                quality: quality.into(),
            }],
        }
    }

    /// Codec of the final transcoding step, if any.
    pub fn target_codec(&self) -> Option<AudioCodec> {
        self.post_processors
            .iter()
            .rev()
            .find(|p| p.kind == PostProcessorKind::ExtractAudio)
            .map(|p| p.codec)
    }

    /// Path the finished artifact will be found at.
    pub fn expected_output(&self) -> PathBuf {
        let ext = self
            .target_codec()
            .map(|c| c.extension())
            .unwrap_or("mp3");
        PathBuf::from(self.output_template.replace(EXT_PLACEHOLDER, ext))
    }

    /// File name the caller should save the artifact as.
    pub fn attachment_name(&self) -> String {
        self.expected_output()
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.replace('"', "_"))
            .unwrap_or_else(|| format!("{}.mp3", OUTPUT_STEM))
    }
}
