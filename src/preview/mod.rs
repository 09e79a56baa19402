pub mod http;
pub mod mock;
pub mod resolver;

pub use http::{Endpoint, HttpConfig, HttpPreviewSource};
pub use mock::{MockPreviewSource, PendingResolver};
pub use resolver::{CachedResolver, OfflineSource};

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for preview fetching
pub type PreviewResult<T> = Result<T, PreviewError>;

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("endpoint returned status {0}")]
    Status(u16),
    #[error("no preview metadata found for {0}")]
    NoMetadata(String),
    #[error("previews are disabled")]
    Offline,
}

/// Description shown on previews built from the URL alone
pub const BASIC_DESCRIPTION: &str = "Web link";

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("url pattern compiles"));

/// First http(s) URL embedded in `text`, if any
pub fn extract_url(text: &str) -> Option<&str> {
    URL_PATTERN.find(text).map(|m| m.as_str())
}

/// Open Graph style summary of a linked page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewData {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    /// Built from the URL only, no page metadata
    #[serde(default)]
    pub is_basic: bool,
}

impl PreviewData {
    /// Minimal preview derived from the URL host.
    ///
    /// Returns `None` when the URL can't be parsed.
    pub fn basic(url: &str) -> Option<Self> {
        let parsed = Url::parse(url).ok()?;
        let host = parsed.host_str()?.to_string();
        Some(Self {
            url: url.to_string(),
            title: Some(host),
            description: Some(BASIC_DESCRIPTION.to_string()),
            image: None,
            is_basic: true,
        })
    }

    pub fn host(&self) -> Option<String> {
        Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }
}

/// Something that can look up page metadata for a URL (network, fixture, ...)
#[async_trait]
pub trait PreviewSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, url: &str) -> PreviewResult<PreviewData>;
}

/// Capability consumed by the timeline engine.
///
/// Must not fail: implementations degrade to a basic preview and only
/// return `None` when nothing at all can be shown.
#[async_trait]
pub trait LinkPreviewResolver: Send + Sync {
    async fn resolve(&self, url: &str) -> Option<PreviewData>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_first_url() {
        assert_eq!(
            extract_url("see https://a.example/x and http://b.example"),
            Some("https://a.example/x")
        );
        assert_eq!(extract_url("no links here"), None);
        assert_eq!(extract_url("ftp://nope.example"), None);
        assert_eq!(extract_url("http://x.y/path\nnext"), Some("http://x.y/path"));
    }

    #[test]
    fn test_basic_preview() {
        let data = PreviewData::basic("https://www.example.com/page?q=1").unwrap();
        assert_eq!(data.title.as_deref(), Some("www.example.com"));
        assert_eq!(data.description.as_deref(), Some(BASIC_DESCRIPTION));
        assert!(data.is_basic);
        assert!(data.image.is_none());

        assert!(PreviewData::basic("https://").is_none());
        assert!(PreviewData::basic("not a url").is_none());
    }
}
