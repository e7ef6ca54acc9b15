/// Service configuration, read from the environment (and `.env`).
use std::path::PathBuf;
use std::time::Duration;

use songdrop_shared::errors::ConfigError;
use songdrop_shared::models::AudioCodec;
use songdrop_shared::url_guard::validate_source_url;

/// Downloaded when a form is submitted without a URL, unless `FALLBACK_URL`
/// overrides it (an empty value disables the fallback).
pub const DEFAULT_FALLBACK_URL: &str =
    "https://music.youtube.com/watch?v=ANk2rYwEngk&si=mhv1UuJf_b9-eqdm";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Root under which per-request scratch directories are created.
    pub download_dir: PathBuf,
    pub ytdlp_bin: String,
    pub ffmpeg_path: Option<PathBuf>,
    pub fallback_url: Option<String>,
    pub audio_codec: AudioCodec,
    pub audio_quality: String,
    pub fetch_timeout: Duration,
    pub max_concurrent_fetches: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset keys take their defaults; set but
    /// unparsable keys are errors.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = get("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or("API_PORT", get("API_PORT"), 8080u16)?;
        let download_dir = PathBuf::from(
            get("DOWNLOAD_DIR").unwrap_or_else(|| "./downloads".to_string()),
        );
        let ytdlp_bin = get("YTDLP_BIN")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "yt-dlp".to_string());
        let ffmpeg_path = get("FFMPEG_PATH")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let fallback_url = match get("FALLBACK_URL") {
            None => Some(DEFAULT_FALLBACK_URL.to_string()),
            Some(v) if v.trim().is_empty() => None,
            Some(v) => {
                validate_source_url(&v).map_err(|e| ConfigError::Invalid {
                    key: "FALLBACK_URL",
                    value: v.clone(),
                    reason: e.to_string(),
                })?;
                Some(v)
            }
        };

        let audio_codec = match get("AUDIO_FORMAT") {
            Some(v) => v.parse::<AudioCodec>()?,
            None => AudioCodec::Mp3,
        };
        let audio_quality = match get("AUDIO_QUALITY") {
            Some(v) => validate_quality(v)?,
            None => "192".to_string(),
        };

        let timeout_secs = parse_or("FETCH_TIMEOUT_SECS", get("FETCH_TIMEOUT_SECS"), 300u64)?;
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "FETCH_TIMEOUT_SECS",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }

        let max_concurrent_fetches =
            parse_or("MAX_CONCURRENT_FETCHES", get("MAX_CONCURRENT_FETCHES"), 2usize)?;
        if max_concurrent_fetches == 0 {
            return Err(ConfigError::Invalid {
                key: "MAX_CONCURRENT_FETCHES",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }

        Ok(Self {
            host,
            port,
            download_dir,
            ytdlp_bin,
            ffmpeg_path,
            fallback_url,
            audio_codec,
            audio_quality,
            fetch_timeout: Duration::from_secs(timeout_secs),
            max_concurrent_fetches,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(v) => v.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            key,
            value: v.clone(),
            reason: e.to_string(),
        }),
    }
}

/// yt-dlp takes a VBR level 0-10 or a bitrate such as `192` / `192K`.
fn validate_quality(raw: String) -> Result<String, ConfigError> {
    let value = raw.trim();
    let digits = value.strip_suffix(['K', 'k']).unwrap_or(value);
    if !digits.is_empty() && digits.len() <= 4 && digits.chars().all(|c| c.is_ascii_digit()) {
        Ok(value.to_string())
    } else {
        Err(ConfigError::Invalid {
            key: "AUDIO_QUALITY",
            value: raw.clone(),
            reason: "expected a VBR level 0-10 or a bitrate like 192".into(),
        })
    }
}
