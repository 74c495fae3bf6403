//! Page fetching behind the `PageFetcher` trait.
//!
//! `BrowserFetcher` drives headless Chromium over CDP and is the default:
//! the answer surface renders client-side, so a plain GET sees an empty
//! shell. `HttpFetcher` does a plain GET for static surfaces and tests.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::error::{Error, Result, is_session_lost_message};

/// Desktop user agent presented to the answer surface.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Fetcher tuning.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub headless: bool,
    pub user_agent: String,
    /// Upper bound on waiting for the rendered page to settle.
    pub readiness_timeout: Duration,
    /// Poll interval while waiting for the snapshot to stabilize.
    pub poll_interval: Duration,
    /// Consecutive unchanged polls before the snapshot counts as settled.
    pub settle_polls: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            headless: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            readiness_timeout: Duration::from_secs(15),
            poll_interval: Duration::from_millis(250),
            settle_polls: 2,
        }
    }
}

/// Fetches one URL and returns the rendered HTML snapshot.
///
/// `navigate` must wait for client-side rendering to settle before
/// snapshotting, and must surface challenge interstitials as raw HTML
/// rather than an error. `reset` tears the session down; the next
/// `navigate` re-creates it lazily.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<String>;

    async fn reset(&self);

    /// Final cleanup before process exit.
    async fn shutdown(&self);
}

struct BrowserSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

/// Headless-Chromium fetcher with a lazily created, resettable session.
pub struct BrowserFetcher {
    config: FetchConfig,
    session: Mutex<Option<BrowserSession>>,
}

impl BrowserFetcher {
    pub fn new(config: FetchConfig) -> Self {
        Self {
            config,
            session: Mutex::new(None),
        }
    }

    async fn launch(&self) -> Result<BrowserSession> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-dev-shm-usage")
            .arg("--disable-blink-features=AutomationControlled")
            .arg(format!("--user-agent={}", self.config.user_agent));
        if !self.config.headless {
            builder = builder.with_head();
        }
        let browser_config = builder.build().map_err(Error::Launch)?;
        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| Error::Launch(e.to_string()))?;

        // The handler stream must be pumped for the whole session lifetime.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        tracing::info!(headless = self.config.headless, "browser session started");
        Ok(BrowserSession {
            browser,
            handler_task,
        })
    }

    async fn snapshot(&self, session: &BrowserSession, url: &str) -> Result<String> {
        let page = session
            .browser
            .new_page(url)
            .await
            .map_err(|e| Error::Browser(e.to_string()))?;
        let html = self.wait_for_stable_content(&page).await;
        if let Err(e) = page.close().await {
            tracing::debug!("failed to close page: {e}");
        }
        html
    }

    /// Poll the rendered DOM until consecutive snapshots stop changing or
    /// the readiness timeout expires. A partial snapshot at timeout is
    /// better than nothing, so only a fully empty page is an error.
    async fn wait_for_stable_content(&self, page: &Page) -> Result<String> {
        let deadline = Instant::now() + self.config.readiness_timeout;
        let mut last_len = 0usize;
        let mut stable = 0u32;
        loop {
            let html = page
                .content()
                .await
                .map_err(|e| Error::Browser(e.to_string()))?;
            if !html.is_empty() && html.len() == last_len {
                stable += 1;
                if stable >= self.config.settle_polls {
                    return Ok(html);
                }
            } else {
                stable = 0;
                last_len = html.len();
            }
            if Instant::now() >= deadline {
                if !html.is_empty() {
                    tracing::debug!("page never settled, returning partial snapshot");
                    return Ok(html);
                }
                return Err(Error::ReadinessTimeout(self.config.readiness_timeout));
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn navigate(&self, url: &str) -> Result<String> {
        let mut guard = self.session.lock().await;
        if guard.is_none() {
            *guard = Some(self.launch().await?);
        }
        let Some(session) = guard.as_ref() else {
            return Err(Error::Browser("session missing after launch".to_string()));
        };
        match self.snapshot(session, url).await {
            // Classify dead-session errors so callers can reset and retry.
            Err(Error::Browser(msg)) if is_session_lost_message(&msg) => {
                Err(Error::SessionLost(msg))
            }
            other => other,
        }
    }

    async fn reset(&self) {
        let mut guard = self.session.lock().await;
        if let Some(mut session) = guard.take() {
            if let Err(e) = session.browser.close().await {
                tracing::debug!("browser close failed: {e}");
            }
            session.handler_task.abort();
            tracing::info!("browser session torn down");
        }
    }

    async fn shutdown(&self) {
        self.reset().await;
    }
}

/// Plain-GET fetcher. Returns the body even on non-success statuses:
/// challenge interstitials arrive as 429/503 pages and the caller detects
/// them from the HTML, not the status code.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn navigate(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .header("Accept", "text/html")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%status, "non-success response, inspecting body anyway");
        }
        Ok(response.text().await?)
    }

    async fn reset(&self) {}

    async fn shutdown(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_config_defaults() {
        let config = FetchConfig::default();
        assert!(config.headless);
        assert!(config.settle_polls >= 1);
        assert!(config.readiness_timeout > config.poll_interval);
    }
}
