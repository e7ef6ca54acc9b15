/// Bounded, time-limited access to a [`MediaFetcher`].
///
/// Uses a tokio Semaphore to cap how many fetcher processes run at once and
/// wraps every run in a timeout. The fetcher version is cached so health
/// checks do not start a process per request.
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, warn};

use songdrop_shared::errors::FetchError;
use songdrop_shared::models::FetchConfig;

use crate::fetcher::MediaFetcher;

const VERSION_TIMEOUT: Duration = Duration::from_secs(15);
/// How long a successful version lookup is reused.
pub const VERSION_CACHE_TTL: Duration = Duration::from_secs(60);

pub struct FetchDispatcher {
    fetcher: Arc<dyn MediaFetcher>,
    /// Semaphore to limit concurrent fetches.
    slots: Arc<Semaphore>,
    max_concurrent: usize,
    timeout: Duration,
    /// Last good version and when it was read. Held across the lookup so
    /// at most one version process runs at a time.
    version_cache: Mutex<Option<(Instant, String)>>,
}

impl FetchDispatcher {
    /// Create a dispatcher allowing `max_concurrent` simultaneous fetches.
    pub fn new(fetcher: Arc<dyn MediaFetcher>, max_concurrent: usize, timeout: Duration) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            fetcher,
            slots: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            timeout,
            version_cache: Mutex::new(None),
        }
    }

    /// Wait for a free slot, then run the fetcher under the timeout.
    ///
    /// Dropping the returned future releases the slot; the yt-dlp fetcher
    /// kills its child's process group on drop.
    pub async fn run(&self, url: &str, config: &FetchConfig) -> Result<(), FetchError> {
        let _permit = self
            .slots
            .acquire()
            .await
            .map_err(|_| FetchError::SpawnFailed("fetch slots closed".into()))?;
        debug!(
            "Fetch slot acquired ({}/{} in use)",
            self.max_concurrent - self.slots.available_permits(),
            self.max_concurrent
        );

        match tokio::time::timeout(self.timeout, self.fetcher.fetch(url, config)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Fetch of {} exceeded {:?}, abandoning", url, self.timeout);
                Err(FetchError::Timeout(self.timeout.as_secs()))
            }
        }
    }

    /// Fetcher version, reused for [`VERSION_CACHE_TTL`] after a successful
    /// lookup. Failures are not cached.
    pub async fn version(&self) -> Result<String, FetchError> {
        let mut cache = self.version_cache.lock().await;
        if let Some((read_at, version)) = cache.as_ref() {
            if read_at.elapsed() < VERSION_CACHE_TTL {
                return Ok(version.clone());
            }
        }

        let version = tokio::time::timeout(VERSION_TIMEOUT, self.fetcher.version())
            .await
            .map_err(|_| FetchError::Timeout(VERSION_TIMEOUT.as_secs()))??;
        debug!("Fetcher version refreshed: {}", version);
        *cache = Some((Instant::now(), version.clone()));
        Ok(version)
    }

    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}
