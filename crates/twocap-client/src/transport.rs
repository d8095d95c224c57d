//! Transport layer: raw request/response exchanges with the service
//!
//! Delivery retry lives here and only here. A response that arrives is
//! handed back as-is; deciding whether a task is ready is the poller's job.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};
use twocap_core::{CaptchaError, ClientConfig, RawResponse, Result, RetryConfig};

/// Per-request timeout for the HTTP client
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Service endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Task submission (`in.php`)
    CreateTask,
    /// Result polling, bad-solve reports and balance (`res.php`)
    TaskResult,
    /// Public status page (`public_statistics`)
    QueueStats,
}

impl Endpoint {
    /// Path relative to the service base URL
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::CreateTask => "in.php",
            Endpoint::TaskResult => "res.php",
            Endpoint::QueueStats => "public_statistics",
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "/{}", self.path())
    }
}

/// A fetched HTML page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub status: u16,
    pub body: String,
}

/// Trait for exchanging requests with the service (allows mocking in tests)
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `params` to a JSON endpoint and decode the `{status, request}` reply
    async fn post(&self, endpoint: Endpoint, params: &[(String, String)]) -> Result<RawResponse>;

    /// GET an HTML page; the status code is returned, not interpreted
    async fn get(&self, endpoint: Endpoint) -> Result<Page>;
}

/// Exponential backoff for delivery failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per request, including the first
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each subsequent retry
    pub backoff_factor: Duration,
    /// Upper bound on any single delay
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// A policy that sends each request once
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based): `factor * 2^(retry-1)`
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.backoff_factor
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }

    /// Delay before retry number `retry`, preferring a server `Retry-After`
    /// hint; both are capped at `max_backoff`
    pub fn delay_with_hint(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        retry_after
            .map(|hint| hint.min(self.max_backoff))
            .unwrap_or_else(|| self.delay_for(retry))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_factor: Duration::from_secs(config.backoff_factor_secs),
            max_backoff: Duration::from_secs(config.max_backoff_secs),
        }
    }
}

/// HTTP transport backed by a pooled reqwest client
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl HttpTransport {
    /// Create a transport for `base_url` (e.g. `https://2captcha.com/`)
    pub fn new(base_url: impl Into<String>, retry: RetryPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| CaptchaError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self {
            client,
            base_url,
            retry,
        })
    }

    /// Create a transport from client configuration
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::new(config.base_url(), RetryPolicy::from(&config.retry))
    }

    pub fn url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base_url, endpoint.path())
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Send a request, retrying connection failures, timeouts, 429 and 5xx
    ///
    /// Returns the last response received once retries run out, so callers
    /// still see the final status code.
    async fn send_with_retry<F>(&self, endpoint: Endpoint, build: F) -> Result<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder + Send + Sync,
    {
        let mut attempt = 1;

        loop {
            debug!("Sending request to {} (attempt {})", endpoint, attempt);
            let can_retry = attempt < self.retry.max_attempts;

            match build().send().await {
                Ok(response) => {
                    let status = response.status();
                    let retryable = status.is_server_error() || status.as_u16() == 429;
                    if !retryable || !can_retry {
                        return Ok(response);
                    }

                    let retry_after = response
                        .headers()
                        .get("retry-after")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.trim().parse::<u64>().ok())
                        .map(Duration::from_secs);
                    let wait = self.retry.delay_with_hint(attempt, retry_after);

                    warn!(
                        "{} returned {}. Waiting {:?} before retry {}/{}",
                        endpoint,
                        status,
                        wait,
                        attempt,
                        self.retry.max_attempts - 1
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) if can_retry && (e.is_connect() || e.is_timeout() || e.is_request()) => {
                    let wait = self.retry.delay_for(attempt);
                    warn!(
                        "Request to {} failed ({}). Waiting {:?} before retry {}/{}",
                        endpoint,
                        e,
                        wait,
                        attempt,
                        self.retry.max_attempts - 1
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    return Err(CaptchaError::Transport(format!(
                        "Request to {} failed after {} attempt(s): {}",
                        endpoint, attempt, e
                    )));
                }
            }

            attempt += 1;
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, endpoint: Endpoint, params: &[(String, String)]) -> Result<RawResponse> {
        let url = self.url(endpoint);
        let response = self
            .send_with_retry(endpoint, || self.client.post(&url).query(params))
            .await?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CaptchaError::Transport(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(CaptchaError::Transport(format!(
                "{} returned HTTP {}: {}",
                endpoint, status, body
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            CaptchaError::InvalidResponse(format!("{} returned malformed JSON ({}): {}", endpoint, e, body))
        })
    }

    async fn get(&self, endpoint: Endpoint) -> Result<Page> {
        let url = self.url(endpoint);
        let response = self
            .send_with_retry(endpoint, || self.client.get(&url))
            .await?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| CaptchaError::Transport(format!("Failed to read response body: {}", e)))?;

        Ok(Page { status, body })
    }
}

/// A request recorded by [`MockTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub endpoint: Endpoint,
    pub params: Vec<(String, String)>,
}

impl Call {
    /// Value of a parameter, if it was sent
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

type MockKey = (Endpoint, Option<String>);
type MockReply = std::result::Result<RawResponse, String>;

/// Scripted transport for testing
///
/// Replies are keyed by endpoint and the `action` parameter (`None` for the
/// creation endpoint). Each key holds a queue; the last entry repeats once
/// the queue is drained.
#[derive(Default)]
pub struct MockTransport {
    replies: Mutex<HashMap<MockKey, VecDeque<MockReply>>>,
    pages: Mutex<VecDeque<Page>>,
    calls: Mutex<Vec<Call>>,
    latency: Duration,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for `endpoint` + `action`
    pub fn with_response(self, endpoint: Endpoint, action: Option<&str>, response: RawResponse) -> Self {
        self.push(endpoint, action, Ok(response))
    }

    /// Queue a delivery failure for `endpoint` + `action`
    pub fn with_transport_failure(self, endpoint: Endpoint, action: Option<&str>, message: &str) -> Self {
        self.push(endpoint, action, Err(message.to_string()))
    }

    /// Make every request take `latency` before answering
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queue a status page
    pub fn with_page(mut self, status: u16, body: impl Into<String>) -> Self {
        self.pages
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Page {
                status,
                body: body.into(),
            });
        self
    }

    fn push(mut self, endpoint: Endpoint, action: Option<&str>, reply: MockReply) -> Self {
        self.replies
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .entry((endpoint, action.map(str::to_string)))
            .or_default()
            .push_back(reply);
        self
    }

    /// Every request made so far, in order
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of requests made to `endpoint` with the given `action`
    pub fn call_count(&self, endpoint: Endpoint, action: Option<&str>) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|c| c.endpoint == endpoint && c.param("action") == action)
            .count()
    }

    fn record(&self, endpoint: Endpoint, params: &[(String, String)]) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Call {
                endpoint,
                params: params.to_vec(),
            });
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn post(&self, endpoint: Endpoint, params: &[(String, String)]) -> Result<RawResponse> {
        self.record(endpoint, params);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let action = params
            .iter()
            .find(|(k, _)| k == "action")
            .map(|(_, v)| v.clone());
        let key = (endpoint, action);

        let mut replies = self.replies.lock().unwrap_or_else(|e| e.into_inner());
        let queue = replies.get_mut(&key).filter(|q| !q.is_empty()).ok_or_else(|| {
            CaptchaError::Transport(format!("No mock response for {} action {:?}", key.0, key.1))
        })?;

        let reply = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };

        match reply {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(CaptchaError::Transport(message)),
            None => Err(CaptchaError::Transport("Mock queue empty".to_string())),
        }
    }

    async fn get(&self, endpoint: Endpoint) -> Result<Page> {
        self.record(endpoint, &[]);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut pages = self.pages.lock().unwrap_or_else(|e| e.into_inner());
        let page = if pages.len() > 1 {
            pages.pop_front()
        } else {
            pages.front().cloned()
        };

        page.ok_or_else(|| CaptchaError::Transport(format!("No mock page for {}", endpoint)))
    }
}
