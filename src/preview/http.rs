use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Url;
use tracing::debug;

use crate::preview::{PreviewData, PreviewError, PreviewResult, PreviewSource};

/// Per-endpoint request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

const USER_AGENT: &str = concat!("chatsim-preview/", env!("CARGO_PKG_VERSION"));

/// Where to fetch a page's HTML from
#[derive(Debug, Clone, PartialEq)]
pub enum Endpoint {
    /// Request the URL itself
    Direct,
    /// Pass the URL as a query parameter to a proxy (`base?param=<url>`)
    Query { base: String, param: String },
    /// Append the raw URL to a proxy prefix (`prefix<url>`)
    Prefix(String),
}

impl Endpoint {
    pub fn request_url(&self, target: &str) -> PreviewResult<Url> {
        let url = match self {
            Endpoint::Direct => Url::parse(target),
            Endpoint::Query { base, param } => Url::parse_with_params(base, &[(param, target)]),
            Endpoint::Prefix(prefix) => Url::parse(&format!("{}{}", prefix, target)),
        };
        url.map_err(|e| PreviewError::InvalidUrl(format!("{}: {}", target, e)))
    }
}

/// Configuration for [`HttpPreviewSource`]
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Tried in order until one yields metadata
    pub endpoints: Vec<Endpoint>,
    pub request_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![
                Endpoint::Direct,
                Endpoint::Query {
                    base: "https://api.codetabs.com/v1/proxy/".to_string(),
                    param: "quest".to_string(),
                },
                Endpoint::Query {
                    base: "https://corsproxy.io/".to_string(),
                    param: "url".to_string(),
                },
                Endpoint::Prefix("https://cors-anywhere.herokuapp.com/".to_string()),
            ],
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Scrapes Open Graph metadata over HTTP
pub struct HttpPreviewSource {
    client: reqwest::Client,
    config: HttpConfig,
}

impl HttpPreviewSource {
    pub fn new(config: HttpConfig) -> PreviewResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    async fn fetch_html(&self, endpoint: &Endpoint, url: &str) -> PreviewResult<String> {
        let request_url = endpoint.request_url(url)?;
        debug!("Requesting {}", request_url);

        let response = self.client.get(request_url).send().await?;
        if !response.status().is_success() {
            return Err(PreviewError::Status(response.status().as_u16()));
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl PreviewSource for HttpPreviewSource {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, url: &str) -> PreviewResult<PreviewData> {
        Url::parse(url).map_err(|e| PreviewError::InvalidUrl(format!("{}: {}", url, e)))?;

        let mut last_error = None;
        for endpoint in &self.config.endpoints {
            match self.fetch_html(endpoint, url).await {
                Ok(html) => {
                    if let Some(data) = parse_open_graph(&html, url) {
                        return Ok(data);
                    }
                    debug!("{:?} returned no usable metadata for {}", endpoint, url);
                }
                Err(e) => {
                    debug!("{:?} failed for {}: {}", endpoint, url, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| PreviewError::NoMetadata(url.to_string())))
    }
}

static META_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<meta\b[^>]*>").expect("meta pattern compiles"));

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)([a-zA-Z_:.-]+)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("attribute pattern compiles")
});

static TITLE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("title pattern compiles")
});

static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").expect("entity pattern compiles")
});

/// Extract `og:*` metadata (falling back to `<title>`) from an HTML page.
///
/// Returns `None` unless at least an image or a title is present.
pub fn parse_open_graph(html: &str, page_url: &str) -> Option<PreviewData> {
    let mut og: HashMap<String, String> = HashMap::new();

    for tag in META_TAG.find_iter(html) {
        let attrs: HashMap<String, String> = ATTRIBUTE
            .captures_iter(tag.as_str())
            .filter_map(|cap| {
                let name = cap.get(1)?.as_str().to_ascii_lowercase();
                let value = cap.get(2).or_else(|| cap.get(3)).or_else(|| cap.get(4))?;
                Some((name, value.as_str().to_string()))
            })
            .collect();

        let key = attrs.get("property").or_else(|| attrs.get("name"));
        if let (Some(key), Some(content)) = (key, attrs.get("content")) {
            let key = key.to_ascii_lowercase();
            if key.starts_with("og:") && !og.contains_key(&key) {
                og.insert(key, decode_entities(content.trim()));
            }
        }
    }

    let non_empty = |s: &String| !s.is_empty();
    let image = og
        .get("og:image")
        .filter(|s| non_empty(s))
        .map(|src| absolutize(src, page_url));
    let title = og.get("og:title").filter(|s| non_empty(s)).cloned().or_else(|| {
        TITLE_TAG
            .captures(html)
            .and_then(|cap| cap.get(1))
            .map(|m| decode_entities(m.as_str().trim()))
            .filter(|s| !s.is_empty())
    });
    let description = og.get("og:description").filter(|s| non_empty(s)).cloned();

    if image.is_none() && title.is_none() {
        return None;
    }

    Some(PreviewData {
        url: page_url.to_string(),
        title,
        description,
        image,
        is_basic: false,
    })
}

fn absolutize(src: &str, page_url: &str) -> String {
    Url::parse(page_url)
        .and_then(|base| base.join(src))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| src.to_string())
}

fn decode_entities(s: &str) -> String {
    ENTITY
        .replace_all(s, |cap: &regex::Captures| {
            let entity = &cap[1];
            let decoded = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ if entity.starts_with("#x") || entity.starts_with("#X") => {
                    u32::from_str_radix(&entity[2..], 16).ok().and_then(char::from_u32)
                }
                _ if entity.starts_with('#') => {
                    entity[1..].parse::<u32>().ok().and_then(char::from_u32)
                }
                _ => None,
            };
            decoded
                .map(String::from)
                .unwrap_or_else(|| cap[0].to_string())
        })
        .into_owned()
}
