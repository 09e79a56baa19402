use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::preview::{LinkPreviewResolver, PreviewData, PreviewError, PreviewResult, PreviewSource};

/// Scripted preview source for testing without network access.
///
/// URLs without a canned response fail with `NoMetadata`.
#[derive(Default)]
pub struct MockPreviewSource {
    responses: Mutex<HashMap<String, PreviewData>>,
    calls: Mutex<HashMap<String, usize>>,
    latency: Option<Duration>,
}

impl MockPreviewSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every fetch by `latency` (tokio time)
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn respond(&self, url: &str, data: PreviewData) {
        lock(&self.responses).insert(url.to_string(), data);
    }

    /// Number of fetches issued for `url`
    pub fn calls(&self, url: &str) -> usize {
        lock(&self.calls).get(url).copied().unwrap_or(0)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl PreviewSource for MockPreviewSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch(&self, url: &str) -> PreviewResult<PreviewData> {
        *lock(&self.calls).entry(url.to_string()).or_insert(0) += 1;

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        lock(&self.responses)
            .get(url)
            .cloned()
            .ok_or_else(|| PreviewError::NoMetadata(url.to_string()))
    }
}

/// Resolver whose lookups never complete
#[derive(Default)]
pub struct PendingResolver {
    calls: AtomicUsize,
}

impl PendingResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LinkPreviewResolver for PendingResolver {
    async fn resolve(&self, _url: &str) -> Option<PreviewData> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending::<()>().await;
        None
    }
}
