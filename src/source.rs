use std::sync::LazyLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use scraper::{Html, Selector};
use spider_client::shapes::request::{ReturnFormat, ReturnFormatHandling};
use spider_client::{RequestParams, Spider};
use thiserror::Error;
use tracing::{debug, warn};

static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());

const NOT_FOUND_MARKERS: &[&str] = &["Page Not Found", "404"];

/// Result of loading one URL.
#[derive(Debug, Clone, PartialEq)]
pub enum Page {
    Loaded { html: String, title: String },
    NotFound,
}

impl Page {
    /// Classify a rendered document. A 404 status or a not-found title means absence.
    pub fn from_html(status: Option<u16>, html: String) -> Page {
        if status == Some(404) {
            return Page::NotFound;
        }
        let title = page_title(&html);
        if NOT_FOUND_MARKERS.iter().any(|m| title.contains(m)) {
            return Page::NotFound;
        }
        Page::Loaded { html, title }
    }

    pub fn html(&self) -> Option<&str> {
        match self {
            Page::Loaded { html, .. } => Some(html),
            Page::NotFound => None,
        }
    }
}

/// Classify a fetched response. 404 and not-found titles are absence; any
/// other status outside 2xx is a fetch failure.
pub fn page_from_response(url: &str, status: Option<u16>, html: String) -> Result<Page, FetchError> {
    match status {
        Some(s) if s != 404 && !(200..=299).contains(&s) => Err(FetchError::Backend {
            url: url.to_string(),
            message: format!("HTTP {}", s),
        }),
        _ => Ok(Page::from_html(status, html)),
    }
}

pub fn page_title(html: &str) -> String {
    Html::parse_document(html)
        .select(&TITLE)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url}: {message}")]
    Backend { url: String, message: String },
    #[error("page source unavailable: {0}")]
    Setup(String),
}

/// Loads rendered HTML for a URL. Held for a whole crawl run and closed at the end.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Page, FetchError>;

    async fn close(&self) -> Result<(), FetchError> {
        Ok(())
    }
}

/// Bounded structural wait in place of a fixed settle delay.
#[derive(Debug, Clone, Copy)]
pub struct Readiness {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Readiness {
    #[cfg(test)]
    /// Single fetch, no polling.
    pub const IMMEDIATE: Readiness = Readiness {
        timeout: Duration::ZERO,
        poll_interval: Duration::ZERO,
    };
}

/// Fetch `url` until `ready` holds for its HTML or the timeout passes.
/// A page that never becomes ready is returned as last seen.
pub async fn fetch_when_ready<S, F>(
    source: &S,
    url: &str,
    ready: F,
    policy: Readiness,
) -> Result<Page, FetchError>
where
    S: PageSource + ?Sized,
    F: Fn(&str) -> bool,
{
    let start = Instant::now();
    let mut attempts = 1u32;
    loop {
        let page = source.fetch(url).await?;
        let settled = match &page {
            Page::NotFound => true,
            Page::Loaded { html, .. } => ready(html.as_str()),
        };
        if settled || start.elapsed() >= policy.timeout {
            if !settled {
                debug!("{} not ready after {} attempts, using last response", url, attempts);
            }
            return Ok(page);
        }
        tokio::time::sleep(policy.poll_interval).await;
        attempts += 1;
    }
}

// ── spider.cloud ──

/// Rendered pages via the spider.cloud API.
pub struct SpiderPageSource {
    spider: Spider,
}

impl SpiderPageSource {
    pub fn from_env() -> Result<Self, FetchError> {
        let api_key = std::env::var("SPIDER_API_KEY")
            .map_err(|_| FetchError::Setup("SPIDER_API_KEY environment variable must be set".into()))?;
        let spider = Spider::new(Some(api_key))
            .map_err(|e| FetchError::Setup(format!("failed to create Spider client: {}", e)))?;
        Ok(SpiderPageSource { spider })
    }
}

#[async_trait]
impl PageSource for SpiderPageSource {
    async fn fetch(&self, url: &str) -> Result<Page, FetchError> {
        let params = RequestParams {
            return_format: Some(ReturnFormatHandling::Single(ReturnFormat::Raw)),
            ..Default::default()
        };

        let response = self
            .spider
            .scrape_url(url, Some(params), "application/json")
            .await
            .map_err(|e| FetchError::Backend {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let parsed: serde_json::Value = match response.as_str() {
            Some(s) => serde_json::from_str(s).unwrap_or(response.clone()),
            None => response,
        };
        let first = parsed.as_array().and_then(|arr| arr.first());

        let status = first
            .and_then(|obj| obj.get("status"))
            .and_then(|s| s.as_u64())
            .map(|s| s as u16);

        if let Some(err) = first.and_then(|obj| obj.get("error")).and_then(|e| e.as_str()) {
            if status != Some(404) && !err.is_empty() {
                return Err(FetchError::Backend {
                    url: url.to_string(),
                    message: err.to_string(),
                });
            }
        }

        let html = first
            .and_then(|obj| obj.get("content"))
            .and_then(|c| c.as_str())
            .unwrap_or_default()
            .to_string();

        page_from_response(url, status, html)
    }
}

// ── plain HTTP ──

/// Server-rendered pages over plain HTTP.
pub struct HttpPageSource {
    client: reqwest::Client,
}

impl HttpPageSource {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Setup(e.to_string()))?;
        Ok(HttpPageSource { client })
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch(&self, url: &str) -> Result<Page, FetchError> {
        let transport = |source: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            source,
        };
        let response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
            warn!("{} returned {}", url, status);
            return page_from_response(url, Some(status.as_u16()), String::new());
        }
        let html = response.text().await.map_err(transport)?;
        page_from_response(url, Some(status.as_u16()), html)
    }
}
