/// Unified error types for the Songdrop system.
use thiserror::Error;

/// Top-level error type for the Songdrop system.
#[derive(Debug, Error)]
pub enum SongdropError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Invalid URL: {0}")]
    Url(#[from] UrlError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rejections produced by the source URL guard.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UrlError {
    #[error("a URL is required")]
    Missing,

    #[error("URL is longer than {0} bytes")]
    TooLong(usize),

    #[error("URL contains whitespace or control characters")]
    IllegalCharacters,

    #[error("URL is not well formed")]
    Malformed,

    #[error("scheme '{0}' is not allowed, use http or https")]
    SchemeNotAllowed(String),

    #[error("host '{0}' is not allowed")]
    HostNotAllowed(String),

    #[error("URL must not carry credentials")]
    CredentialsNotAllowed,
}

/// Errors raised while running the external media fetcher.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to start fetcher: {0}")]
    SpawnFailed(String),

    #[error("Source not supported: {0}")]
    UnsupportedUrl(String),

    #[error("Source requires authentication")]
    AuthRequired,

    #[error("Media unavailable: {0}")]
    Unavailable(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Audio transcoder (ffmpeg) not found")]
    TranscoderMissing,

    #[error("Fetch timed out after {0}s")]
    Timeout(u64),

    #[error("Fetcher exited with code {code}: {detail}")]
    Failed { code: i32, detail: String },

    #[error("Fetcher reported success but produced no file at {0}")]
    OutputMissing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// Classify a failed fetcher run from its exit code and stderr tail.
    pub fn from_stderr(code: i32, stderr: &str) -> Self {
        let lower = stderr.to_lowercase();
        let detail = last_error_line(stderr);

        if lower.contains("unsupported url") || lower.contains("is not a valid url") {
            FetchError::UnsupportedUrl(detail)
        } else if lower.contains("ffmpeg not found")
            || lower.contains("ffprobe and ffmpeg not found")
            || lower.contains("ffprobe/avprobe and ffmpeg/avconv not found")
        {
            FetchError::TranscoderMissing
        } else if lower.contains("sign in to confirm")
            || lower.contains("login required")
            || lower.contains("requires authentication")
            || lower.contains("use --cookies")
        {
            FetchError::AuthRequired
        } else if lower.contains("video unavailable")
            || lower.contains("private video")
            || lower.contains("has been removed")
            || lower.contains("not available in your country")
            || lower.contains("http error 404")
        {
            FetchError::Unavailable(detail)
        } else if lower.contains("unable to download webpage")
            || lower.contains("timed out")
            || lower.contains("name or service not known")
            || lower.contains("connection refused")
            || lower.contains("temporary failure in name resolution")
        {
            FetchError::Network(detail)
        } else {
            FetchError::Failed { code, detail }
        }
    }

    /// Whether this error is the caller's fault rather than the service's.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            FetchError::UnsupportedUrl(_) | FetchError::AuthRequired | FetchError::Unavailable(_)
        )
    }
}

/// Pick the most useful line from a fetcher's stderr.
fn last_error_line(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    lines
        .iter()
        .rev()
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| lines.last())
        .map(|l| l.trim_start_matches("ERROR:").trim().to_string())
        .unwrap_or_else(|| "no output".to_string())
}

/// Invalid or missing configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} has invalid value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}
