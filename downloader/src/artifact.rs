/// Request-scoped output files.
///
/// Every download gets its own scratch directory. The directory lives exactly
/// as long as the [`ScratchDir`] (or the [`OutputArtifact`] / [`ArtifactStream`]
/// that takes it over), so a response body that is dropped after sending
/// removes the file it streamed. Inside a tokio runtime the removal runs on
/// the blocking pool.
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use tempfile::TempDir;
use tokio::fs::File;
use tokio_stream::Stream;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use songdrop_shared::errors::FetchError;

/// A uniquely named directory under the download root.
#[derive(Debug)]
pub struct ScratchDir {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl ScratchDir {
    /// Create `<root>/<request_id>-XXXXXX/`.
    pub fn create(root: &Path, request_id: &str) -> io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", request_id))
            .tempdir_in(root)?;
        let path = dir.path().to_path_buf();
        debug!("Scratch dir created: {}", path.display());
        Ok(Self { dir: Some(dir), path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take ownership of the file the fetcher was expected to produce.
    ///
    /// Fails if it is missing, not a regular file, or empty.
    pub async fn into_artifact(self, expected: PathBuf) -> Result<OutputArtifact, FetchError> {
        if !expected.starts_with(&self.path) {
            return Err(FetchError::OutputMissing(expected.display().to_string()));
        }
        match tokio::fs::metadata(&expected).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(OutputArtifact {
                len: meta.len(),
                path: expected,
                _scratch: self,
            }),
            Ok(_) => Err(FetchError::OutputMissing(expected.display().to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(FetchError::OutputMissing(expected.display().to_string()))
            }
            Err(e) => Err(FetchError::Io(e)),
        }
    }
}

fn remove_scratch(dir: TempDir, path: &Path) {
    match dir.close() {
        Ok(()) => debug!("Scratch dir removed: {}", path.display()),
        Err(e) => warn!("Failed to remove scratch dir {}: {}", path.display(), e),
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let path = std::mem::take(&mut self.path);
                handle.spawn_blocking(move || remove_scratch(dir, &path));
            }
            Err(_) => remove_scratch(dir, &self.path),
        }
    }
}

/// A verified, non-empty audio file inside its scratch directory.
#[derive(Debug)]
pub struct OutputArtifact {
    path: PathBuf,
    len: u64,
    _scratch: ScratchDir,
}

impl OutputArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Open the file as a byte stream that owns the scratch directory.
    pub async fn into_stream(self) -> io::Result<ArtifactStream> {
        let file = File::open(&self.path).await?;
        Ok(ArtifactStream {
            inner: ReaderStream::new(file),
            _artifact: self,
        })
    }
}

/// Streams an artifact's bytes; removes the scratch directory when dropped.
pub struct ArtifactStream {
    inner: ReaderStream<File>,
    _artifact: OutputArtifact,
}

impl Stream for ArtifactStream {
    type Item = <ReaderStream<File> as Stream>::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
