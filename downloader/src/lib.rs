//! Songdrop media fetching.
//!
//! Wraps the external yt-dlp/ffmpeg toolchain behind the [`MediaFetcher`]
//! trait and manages the per-request scratch directories its output lands in.
pub mod artifact;
pub mod dispatcher;
pub mod fetcher;
pub mod paths;
pub mod ytdlp;

pub use artifact::{ArtifactStream, OutputArtifact, ScratchDir};
pub use dispatcher::FetchDispatcher;
pub use fetcher::MediaFetcher;
pub use ytdlp::YtDlpFetcher;
