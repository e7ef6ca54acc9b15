/// The media fetcher seam.
///
/// Anything that can turn a URL plus a [`FetchConfig`] into an audio file on
/// disk implements [`MediaFetcher`]. The production implementation shells out
/// to yt-dlp; tests substitute in-memory fakes.
use async_trait::async_trait;

use songdrop_shared::errors::FetchError;
use songdrop_shared::models::FetchConfig;

#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Download `url` and leave the transcoded file at `config.expected_output()`.
    async fn fetch(&self, url: &str, config: &FetchConfig) -> Result<(), FetchError>;

    /// Version string of the underlying tool, reported by the health check.
    async fn version(&self) -> Result<String, FetchError>;
}
