//! Headless rendering for pages whose static HTML is incomplete
//!
//! The browser is launched lazily on the first render and shared by every
//! later one. A launch failure is remembered so the crawl degrades to static
//! fetching with a single warning instead of retrying per page.

use crate::RenderError;
use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use url::Url;

/// Interval between readiness polls
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Produces the DOM of a page after its scripts have run
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Renders `url` and returns the serialized DOM
    ///
    /// Implementations must give up after `timeout` with
    /// [`RenderError::Timeout`].
    async fn render(&self, url: &Url, timeout: Duration) -> Result<String, RenderError>;

    /// Releases browser resources
    async fn shutdown(&self) {}
}

/// Renderer used when rendering is switched off
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledRenderer;

#[async_trait]
impl Renderer for DisabledRenderer {
    async fn render(&self, _url: &Url, _timeout: Duration) -> Result<String, RenderError> {
        Err(RenderError::Unavailable("rendering disabled".to_string()))
    }
}

enum BrowserSlot {
    NotLaunched,
    Ready(Browser),
    Failed(String),
}

/// Renders pages in a headless Chromium via the DevTools protocol
pub struct ChromeRenderer {
    slot: Mutex<BrowserSlot>,
    request_timeout: Duration,
}

impl ChromeRenderer {
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            slot: Mutex::new(BrowserSlot::NotLaunched),
            request_timeout,
        }
    }

    async fn launch(&self) -> Result<Browser, String> {
        let config = BrowserConfig::builder()
            .no_sandbox()
            .request_timeout(self.request_timeout)
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .build()?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(|e| e.to_string())?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(browser)
    }

    /// Opens a page, launching the browser on first use
    async fn open_page(&self, url: &Url) -> Result<Page, RenderError> {
        let mut slot = self.slot.lock().await;

        if let BrowserSlot::NotLaunched = *slot {
            *slot = match self.launch().await {
                Ok(browser) => {
                    tracing::info!("Headless browser launched");
                    BrowserSlot::Ready(browser)
                }
                Err(e) => {
                    tracing::warn!("Headless browser failed to launch, using static HTML: {}", e);
                    BrowserSlot::Failed(e)
                }
            };
        }

        match &*slot {
            BrowserSlot::Ready(browser) => browser
                .new_page(url.as_str())
                .await
                .map_err(|e| RenderError::Browser(e.to_string())),
            BrowserSlot::Failed(reason) => Err(RenderError::Unavailable(reason.clone())),
            BrowserSlot::NotLaunched => Err(RenderError::Unavailable(
                "browser not launched".to_string(),
            )),
        }
    }

    /// Waits until the document is complete and its size stops changing
    async fn settle(page: &Page, url: &Url, timeout: Duration) -> Result<String, RenderError> {
        let deadline = Instant::now() + timeout;
        let timed_out = || RenderError::Timeout {
            url: url.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        };

        tokio::time::timeout_at(deadline, page.wait_for_navigation())
            .await
            .map_err(|_| timed_out())?
            .map_err(|e| RenderError::Browser(e.to_string()))?;

        let mut last_len: Option<usize> = None;
        loop {
            if Instant::now() >= deadline {
                return Err(timed_out());
            }

            let state: String = page
                .evaluate("document.readyState")
                .await
                .map_err(|e| RenderError::Browser(e.to_string()))?
                .into_value()
                .map_err(|e| RenderError::Browser(e.to_string()))?;

            if state == "complete" {
                let html = page
                    .content()
                    .await
                    .map_err(|e| RenderError::Browser(e.to_string()))?;
                if last_len == Some(html.len()) {
                    return Ok(html);
                }
                last_len = Some(html.len());
            }

            sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl Renderer for ChromeRenderer {
    async fn render(&self, url: &Url, timeout: Duration) -> Result<String, RenderError> {
        let page = self.open_page(url).await?;
        let result = Self::settle(&page, url, timeout).await;

        if let Err(e) = page.close().await {
            tracing::debug!("Failed to close page for {}: {}", url, e);
        }

        result
    }

    async fn shutdown(&self) {
        let mut slot = self.slot.lock().await;
        if let BrowserSlot::Ready(mut browser) =
            std::mem::replace(&mut *slot, BrowserSlot::NotLaunched)
        {
            if let Err(e) = browser.close().await {
                tracing::debug!("Failed to close headless browser: {}", e);
            }
            let _ = browser.wait().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_renderer_is_unavailable() {
        let url = Url::parse("http://example.com/").unwrap();
        let result = DisabledRenderer.render(&url, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(RenderError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_shutdown_without_launch_is_noop() {
        let renderer = ChromeRenderer::new(Duration::from_secs(1));
        renderer.shutdown().await;
        assert!(matches!(*renderer.slot.lock().await, BrowserSlot::NotLaunched));
    }
}
