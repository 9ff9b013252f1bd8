use devscope_core::{Error, PageFetcher, Result};
use std::sync::Arc;
use std::time::Duration;

pub mod briefing;
pub mod cache;
pub mod config;
pub mod context;
pub mod extract;
pub mod openai;
pub mod perplexity;

pub use cache::PageCache;

pub const USER_AGENT: &str = "devscope/0.1 (+developer tooling research)";

/// Default character budget for one page's extracted text.
pub const DEFAULT_PAGE_MAX_CHARS: usize = 6_000;

pub const PAGE_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Hard cap on bytes read from a page body.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Shared HTTP client. Per-request timeouts are set by each caller.
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(10))
        // Avoid "hang forever" on DNS/TLS stalls; request timeouts bound the rest.
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| Error::Fetch(e.to_string()))
}

/// Page fetcher backed by reqwest and an in-memory [`PageCache`].
#[derive(Debug, Clone)]
pub struct LocalFetcher {
    client: reqwest::Client,
    cache: Arc<PageCache>,
    timeout: Duration,
}

impl LocalFetcher {
    pub fn new(client: reqwest::Client, cache: Arc<PageCache>) -> Self {
        Self {
            client,
            cache,
            timeout: PAGE_FETCH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    /// Raw body of a successful GET, lossily decoded as UTF-8.
    async fn fetch_body(&self, url: &str) -> Result<String> {
        let url = url::Url::parse(url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let resp = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::Fetch(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Fetch(format!("HTTP {status}")));
        }

        let mut bytes = Vec::new();
        let mut stream = resp.bytes_stream();
        use futures_util::StreamExt;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::Fetch(e.to_string()))?;
            if bytes.len().saturating_add(chunk.len()) > MAX_BODY_BYTES {
                let can_take = MAX_BODY_BYTES.saturating_sub(bytes.len());
                bytes.extend_from_slice(&chunk[..can_take]);
                tracing::debug!(max_bytes = MAX_BODY_BYTES, "page body truncated");
                break;
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[async_trait::async_trait]
impl PageFetcher for LocalFetcher {
    async fn fetch_text(&self, url: &str, max_chars: usize) -> String {
        if let Some(hit) = self.cache.get(url, max_chars) {
            tracing::debug!(url, "page cache hit");
            return hit;
        }

        let t0 = std::time::Instant::now();
        let html = match self.fetch_body(url).await {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!(url, error = %e, "failed to fetch page; continuing without it");
                return String::new();
            }
        };

        let text = extract::paragraph_text(&html, max_chars);
        tracing::debug!(
            url,
            chars = text.chars().count(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "page fetched"
        );
        // Empty extractions are not memoized so a transient failure can recover next time.
        if !text.is_empty() {
            self.cache.put(url, max_chars, text.clone());
        }
        text
    }
}
