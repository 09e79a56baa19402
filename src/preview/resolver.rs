use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::preview::{LinkPreviewResolver, PreviewData, PreviewError, PreviewResult, PreviewSource};

/// Upper bound on a whole resolution, across all endpoints
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(15);

type Slot = Arc<OnceCell<Option<PreviewData>>>;

/// Memoizing resolver on top of a [`PreviewSource`].
///
/// Each URL is fetched at most once for the lifetime of the resolver;
/// concurrent callers for the same URL wait on the same fetch. Failures
/// and timeouts are cached as basic previews.
pub struct CachedResolver<S> {
    source: S,
    cache: Mutex<HashMap<String, Slot>>,
    timeout: Option<Duration>,
}

impl<S: PreviewSource> CachedResolver<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cache: Mutex::new(HashMap::new()),
            timeout: Some(DEFAULT_RESOLVE_TIMEOUT),
        }
    }

    /// Override (or remove) the overall resolution timeout
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Previously resolved result for `url`, if resolution has finished
    pub fn cached(&self, url: &str) -> Option<Option<PreviewData>> {
        self.lock_cache()
            .get(url)
            .and_then(|slot| slot.get().cloned())
    }

    pub fn cached_count(&self) -> usize {
        self.lock_cache()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    fn lock_cache(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn fetch_or_fallback(&self, url: &str) -> Option<PreviewData> {
        debug!("Fetching preview for {} via {}", url, self.source.name());

        let result: PreviewResult<PreviewData> = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.source.fetch(url)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("Preview for {} timed out after {:?}", url, limit);
                    return PreviewData::basic(url);
                }
            },
            None => self.source.fetch(url).await,
        };

        match result {
            Ok(data) => Some(data),
            Err(PreviewError::Offline) => PreviewData::basic(url),
            Err(e) => {
                warn!("Preview for {} failed, using basic preview: {}", url, e);
                PreviewData::basic(url)
            }
        }
    }
}

#[async_trait]
impl<S: PreviewSource> LinkPreviewResolver for CachedResolver<S> {
    async fn resolve(&self, url: &str) -> Option<PreviewData> {
        let slot = self.lock_cache().entry(url.to_string()).or_default().clone();
        slot.get_or_init(|| self.fetch_or_fallback(url))
            .await
            .clone()
    }
}

/// Source that never touches the network; every URL gets a basic preview
pub struct OfflineSource;

#[async_trait]
impl PreviewSource for OfflineSource {
    fn name(&self) -> &str {
        "offline"
    }

    async fn fetch(&self, _url: &str) -> PreviewResult<PreviewData> {
        Err(PreviewError::Offline)
    }
}
