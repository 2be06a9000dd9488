//! HTTP fetcher implementation
//!
//! This module handles all network retrieval for the crawler, including:
//! - Building the HTTP client with the configured user agent
//! - GET requests with bounded redirects
//! - Retry with exponential backoff for transient failures
//! - Falling back to a headless render when static HTML looks incomplete

use crate::config::{FetchConfig, RenderConfig};
use crate::crawler::classify::essence;
use crate::crawler::parser::needs_render;
use crate::crawler::render::Renderer;
use crate::url::CanonicalUrl;
use crate::{FetchError, RenderError};
use reqwest::{redirect::Policy, Client, StatusCode};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use url::Url;

/// Redirect hops followed before a fetch fails
const MAX_REDIRECTS: usize = 10;

/// Upper bound on a single backoff delay
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// How the bytes of a resource were obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderMode {
    /// Plain HTTP response body
    Static,
    /// DOM serialized by the headless browser
    Dynamic,
}

impl RenderMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Dynamic => "dynamic",
        }
    }
}

/// A retrieved resource; immutable once created
#[derive(Debug, Clone)]
pub struct FetchedResource {
    /// Identity of the resource
    pub url: CanonicalUrl,
    /// URL the response actually came from, after redirects
    pub final_url: Url,
    pub bytes: Vec<u8>,
    /// Declared Content-Type header, verbatim
    pub content_type: Option<String>,
    pub status: u16,
    pub render_mode: RenderMode,
    /// Why a needed render was not used, if it was not
    pub render_fallback: Option<String>,
    pub elapsed: Duration,
}

/// Raw outcome of a successful HTTP exchange
struct HttpResponse {
    final_url: Url,
    status: u16,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The fetch configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &FetchConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_millis(config.timeout_ms))
        .connect_timeout(Duration::from_millis(config.timeout_ms.min(10_000)))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Delay before retry number `attempt` (0-based)
///
/// `base * 2^attempt`, capped at 30 seconds.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt);
    base.saturating_mul(factor).min(MAX_BACKOFF)
}

/// Statuses worth retrying
fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

/// Maps a reqwest error onto the fetch taxonomy
fn classify_reqwest_error(url: &Url, error: reqwest::Error) -> FetchError {
    if error.is_redirect() || error.is_builder() {
        return FetchError::Failure {
            url: url.to_string(),
            status: None,
            message: error.to_string(),
        };
    }

    let message = if error.is_timeout() {
        "request timeout".to_string()
    } else if error.is_connect() {
        format!("connection failed: {}", error)
    } else {
        error.to_string()
    };

    FetchError::Transient {
        url: url.to_string(),
        status: None,
        message,
    }
}

/// Retrieves resources over HTTP, rendering incomplete HTML when enabled
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
    render: RenderConfig,
    renderer: Arc<dyn Renderer>,
    render_permits: Arc<Semaphore>,
}

impl Fetcher {
    /// Creates a fetcher
    ///
    /// Render sessions are capped by their own semaphore, independent of how
    /// many fetches are in flight.
    pub fn new(
        client: Client,
        config: FetchConfig,
        render: RenderConfig,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        let render_permits = Arc::new(Semaphore::new(render.max_concurrent.max(1) as usize));
        Self {
            client,
            config,
            render,
            renderer,
            render_permits,
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn renderer(&self) -> &Arc<dyn Renderer> {
        &self.renderer
    }

    /// Fetches a resource
    ///
    /// # Request Flow
    ///
    /// 1. GET `location`, following at most 10 redirects
    /// 2. On a transient failure, back off and retry up to `max-retries` times
    /// 3. If the body is HTML and looks incomplete, render it headlessly
    /// 4. If rendering fails or times out, keep the static body and note why
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | Timeout, connection or body error | Retry with backoff |
    /// | HTTP 408 / 429 / 5xx | Retry with backoff |
    /// | Other HTTP 4xx | Immediate failure |
    /// | Redirect chain > 10 | Immediate failure |
    ///
    /// # Arguments
    ///
    /// * `url` - Identity of the resource
    /// * `location` - Absolute URL to request
    pub async fn fetch(
        &self,
        url: &CanonicalUrl,
        location: &Url,
    ) -> Result<FetchedResource, FetchError> {
        let started = Instant::now();
        let response = self.fetch_with_retry(location).await?;

        let mut resource = FetchedResource {
            url: url.clone(),
            final_url: response.final_url,
            bytes: response.bytes,
            content_type: response.content_type,
            status: response.status,
            render_mode: RenderMode::Static,
            render_fallback: None,
            elapsed: Duration::ZERO,
        };

        if self.render.enabled && self.should_render(&resource) {
            match self.render_dynamic(&resource.final_url).await {
                Ok(dom) => {
                    tracing::debug!("Rendered {} ({} bytes)", url, dom.len());
                    resource.bytes = dom.into_bytes();
                    resource.render_mode = RenderMode::Dynamic;
                }
                Err(e) => {
                    tracing::warn!("Using static HTML for {}: {}", url, e);
                    resource.render_fallback = Some(e.to_string());
                }
            }
        }

        resource.elapsed = started.elapsed();
        Ok(resource)
    }

    fn should_render(&self, resource: &FetchedResource) -> bool {
        let is_html = resource
            .content_type
            .as_deref()
            .map(|ct| matches!(essence(ct).as_str(), "text/html" | "application/xhtml+xml"))
            .unwrap_or(false);

        is_html
            && needs_render(
                &String::from_utf8_lossy(&resource.bytes),
                self.render.min_static_bytes,
            )
    }

    async fn render_dynamic(&self, url: &Url) -> Result<String, RenderError> {
        let _permit = self
            .render_permits
            .acquire()
            .await
            .map_err(|e| RenderError::Unavailable(e.to_string()))?;

        let timeout = Duration::from_millis(self.render.timeout_ms);
        // The renderer bounds its own wait; this also covers browser start-up
        let hard_limit = timeout + Duration::from_millis(self.config.timeout_ms);

        match tokio::time::timeout(hard_limit, self.renderer.render(url, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(RenderError::Timeout {
                url: url.to_string(),
                timeout_ms: self.render.timeout_ms,
            }),
        }
    }

    async fn fetch_with_retry(&self, url: &Url) -> Result<HttpResponse, FetchError> {
        let base = Duration::from_millis(self.config.backoff_base_ms);
        let mut attempt: u32 = 0;

        loop {
            match self.attempt(url).await {
                Ok(response) => return Ok(response),
                Err(FetchError::Transient { message, .. }) if attempt < self.config.max_retries => {
                    let delay = backoff_delay(base, attempt);
                    tracing::debug!(
                        "Transient error for {} ({}), retry {} in {:?}",
                        url,
                        message,
                        attempt + 1,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(FetchError::Transient {
                    url,
                    status,
                    message,
                }) => {
                    return Err(FetchError::Failure {
                        url,
                        status,
                        message: format!("{} (gave up after {} attempts)", message, attempt + 1),
                    })
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt(&self, url: &Url) -> Result<HttpResponse, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| classify_reqwest_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            let message = format!("HTTP {}", status);
            return Err(if is_transient_status(status) {
                FetchError::Transient {
                    url: url.to_string(),
                    status: Some(status.as_u16()),
                    message,
                }
            } else {
                FetchError::Failure {
                    url: url.to_string(),
                    status: Some(status.as_u16()),
                    message,
                }
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let final_url = response.url().clone();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify_reqwest_error(url, e))?;

        Ok(HttpResponse {
            final_url,
            status: status.as_u16(),
            content_type,
            bytes: bytes.to_vec(),
        })
    }
}
