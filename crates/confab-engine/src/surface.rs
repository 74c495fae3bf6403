//! The answer surface: URL construction plus fetch/extract composition.

use std::sync::Arc;

use confab_page::{ContentBlock, ContentExtractor, PageFetcher};

/// Substrings marking a bot-challenge interstitial, checked on raw HTML
/// before extraction is attempted.
const CHALLENGE_MARKERS: [&str; 2] = ["captcha", "unusual traffic"];

/// Whether a raw HTML snapshot is a challenge page rather than an answer.
pub fn is_challenge_page(html: &str) -> bool {
    let lower = html.to_lowercase();
    CHALLENGE_MARKERS.iter().any(|m| lower.contains(m))
}

/// One queryable AI-answer endpoint: a fetcher, an extractor, and the
/// base URL the percent-encoded query is appended to.
pub struct AnswerSurface {
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<dyn ContentExtractor>,
    base_url: String,
}

impl AnswerSurface {
    pub const DEFAULT_BASE_URL: &'static str = "https://www.google.com/search?udm=50&aep=11&q=";

    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        extractor: Arc<dyn ContentExtractor>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            base_url: base_url.into(),
        }
    }

    pub fn query_url(&self, query: &str) -> String {
        format!("{}{}", self.base_url, urlencoding::encode(query))
    }

    /// Fetch the rendered page for `query` and return the raw HTML,
    /// challenge interstitials included.
    pub async fn fetch_raw(&self, query: &str) -> confab_page::Result<String> {
        self.fetcher.navigate(&self.query_url(query)).await
    }

    pub fn extract(&self, html: &str) -> Option<Vec<ContentBlock>> {
        self.extractor.extract(html)
    }

    /// One fetch+extract round trip. Used by the relevance and summary
    /// side queries, where a challenge page is simply no answer: side
    /// queries are best-effort and never retried.
    pub async fn ask(&self, query: &str) -> confab_page::Result<Option<Vec<ContentBlock>>> {
        let html = self.fetch_raw(query).await?;
        if is_challenge_page(&html) {
            return Ok(None);
        }
        Ok(self.extract(&html))
    }

    /// Tear down the fetch session; the next fetch re-creates it lazily.
    pub async fn reset_session(&self) {
        self.fetcher.reset().await;
    }

    pub async fn shutdown(&self) {
        self.fetcher.shutdown().await;
    }
}
