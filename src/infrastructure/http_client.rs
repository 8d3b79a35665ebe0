//! HTTP client for web crawling with rate limiting and error handling
//!
//! Provides a robust HTTP client designed for polite scraping: a shared
//! rate limiter, bounded retries with exponential backoff, and a clear
//! split between retryable and fatal failures.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, direct::NotKeyed},
};
use reqwest::{Client, StatusCode, header::{HeaderMap, HeaderValue, USER_AGENT}};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Transport-level failure after the retry budget is spent, or an
/// immediately fatal HTTP status.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("retries exhausted for {url} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    #[error("invalid client configuration: {0}")]
    Configuration(String),
}

/// HTTP client configuration for crawling.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HttpClientConfig {
    pub user_agent: String,
    /// Per-attempt request timeout.
    pub timeout_seconds: u64,
    /// Total attempts per URL, first try included.
    pub max_retries: u32,
    /// Base delay for exponential backoff between attempts.
    pub retry_base_delay_ms: u64,
    pub max_requests_per_second: u32,
    pub follow_redirects: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (compatible; tenderwatch/0.2)".to_string(),
            timeout_seconds: 20,
            max_retries: 3,
            retry_base_delay_ms: 1000,
            max_requests_per_second: 2,
            follow_redirects: true,
        }
    }
}

/// Fetch seam used by the crawl engine and the enricher.
///
/// The production implementation is [`HttpClient`]; tests inject fakes so
/// crawl decisions can be exercised without a network.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch a URL and return its body as text.
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError>;
}

/// Rate-limited HTTP client with a bounded retry policy.
pub struct HttpClient {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    config: HttpClientConfig,
}

impl HttpClient {
    /// Create a new HTTP client with the given configuration.
    pub fn new(config: HttpClientConfig) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| FetchError::Configuration(format!("invalid user agent: {e}")))?,
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(headers)
            .cookie_store(true)
            .gzip(true)
            .redirect(if config.follow_redirects {
                reqwest::redirect::Policy::limited(10)
            } else {
                reqwest::redirect::Policy::none()
            })
            .build()
            .map_err(|e| FetchError::Configuration(format!("failed to build client: {e}")))?;

        let quota = Quota::per_second(
            NonZeroU32::new(config.max_requests_per_second)
                .ok_or_else(|| FetchError::Configuration("rate limit must be > 0".into()))?,
        );
        let rate_limiter = RateLimiter::direct(quota);

        Ok(Self { client, rate_limiter, config })
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Statuses worth another attempt. Everything else fails immediately:
    /// a 404 or 403 will not get better by asking again.
    fn is_retryable(status: StatusCode) -> bool {
        matches!(
            status,
            StatusCode::INTERNAL_SERVER_ERROR
                | StatusCode::BAD_GATEWAY
                | StatusCode::SERVICE_UNAVAILABLE
                | StatusCode::GATEWAY_TIMEOUT
        )
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.retry_base_delay_ms;
        let exponential = base.saturating_mul(2_u64.pow(attempt.saturating_sub(1)));
        let jitter = fastrand::u64(0..=base / 4);
        Duration::from_millis(exponential + jitter)
    }

    async fn fetch_once(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport { url: url.to_string(), source: e })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { status: status.as_u16(), url: url.to_string() });
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::Transport { url: url.to_string(), source: e })
    }
}

#[async_trait]
impl PageFetcher for HttpClient {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let mut last_error: Option<FetchError> = None;

        for attempt in 1..=self.config.max_retries {
            self.rate_limiter.until_ready().await;
            info!("HTTP GET (attempt {}/{}): {}", attempt, self.config.max_retries, url);

            match self.fetch_once(url).await {
                Ok(body) => {
                    debug!("Fetched {} ({} chars) on attempt {}", url, body.len(), attempt);
                    return Ok(body);
                }
                Err(FetchError::Status { status, url: u }) => {
                    let code = StatusCode::from_u16(status)
                        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                    if !Self::is_retryable(code) {
                        warn!("Non-retryable HTTP {} for {}", status, u);
                        return Err(FetchError::Status { status, url: u });
                    }
                    warn!("HTTP {} on attempt {} for {}", status, attempt, u);
                    last_error = Some(FetchError::Status { status, url: u });
                }
                Err(e) => {
                    warn!("Network error on attempt {} for {}: {}", attempt, url, e);
                    last_error = Some(e);
                }
            }

            if attempt < self.config.max_retries {
                sleep(self.backoff_delay(attempt)).await;
            }
        }

        Err(FetchError::RetriesExhausted {
            url: url.to_string(),
            attempts: self.config.max_retries,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".to_string()),
        })
    }
}
