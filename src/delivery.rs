//! Bounded-retry delivery loop gated by a circuit breaker.
//!
//! One call to [`RetryingSender::send`] is one delivery of one prepared request to one
//! destination. The breaker is consulted once up front and updated exactly once at the end
//! (success or failure), except when it refuses the attempt outright.

use crate::backoff::Backoff;
use crate::circuit_breaker::CircuitBreaker;
use crate::error::{DeliveryError, ForwarderError};
use crate::sleeper::{Sleeper, TokioSleeper};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Pool and connect settings for the shared outbound client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpClientSettings {
    pub connect_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: Duration,
    /// Concurrent requests allowed to one host; enforced by [`RetryingSender`].
    pub max_connections_per_host: usize,
}

impl Default for HttpClientSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            pool_max_idle_per_host: 100,
            pool_idle_timeout: Duration::from_secs(90),
            max_connections_per_host: DEFAULT_MAX_CONNECTIONS_PER_HOST,
        }
    }
}

pub const DEFAULT_MAX_CONNECTIONS_PER_HOST: usize = 250;

/// Longest error-response body kept on a `ClientError` / `UnexpectedStatus`.
pub const MAX_ERROR_BODY: usize = 1024;

/// Build the one `reqwest::Client` shared by every provider.
///
/// No overall timeout is set here; each attempt carries its own.
pub fn build_http_client(settings: &HttpClientSettings) -> Result<reqwest::Client, ForwarderError> {
    reqwest::Client::builder()
        .connect_timeout(settings.connect_timeout)
        .pool_max_idle_per_host(settings.pool_max_idle_per_host)
        .pool_idle_timeout(settings.pool_idle_timeout)
        .build()
        .map_err(ForwarderError::HttpClient)
}

/// A prepared outbound request: where to POST, which headers, which bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl DeliveryRequest {
    /// Serialize `payload` as the JSON body and set `content-type: application/json`.
    pub fn json<T: Serialize + ?Sized>(
        url: impl Into<String>,
        payload: &T,
    ) -> Result<Self, DeliveryError> {
        Ok(Self {
            url: url.into(),
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: serde_json::to_vec(payload)?,
        })
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First value for `name`, compared case-insensitively.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Attempt budget, per-attempt timeout and backoff schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: usize,
    attempt_timeout: Duration,
    backoff: Backoff,
}

impl RetryPolicy {
    /// `max_attempts` below one is raised to one; a send always makes at least one attempt.
    pub fn new(max_attempts: usize, attempt_timeout: Duration, backoff: Backoff) -> Self {
        Self { max_attempts: max_attempts.max(1), attempt_timeout, backoff }
    }

    /// Total attempts per send, first one included.
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Deadline for one attempt, covering connect, send and reading the response.
    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Wait schedule between attempts; the wait after attempt `n` is `delay(n)`.
    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }
}

impl Default for RetryPolicy {
    /// Three attempts, 15s each, waiting 1s then 2s between them.
    fn default() -> Self {
        Self::new(3, Duration::from_secs(15), Backoff::default())
    }
}

/// One semaphore per `host:port`, created on first use.
#[derive(Debug)]
struct HostLimits {
    per_host: usize,
    hosts: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl HostLimits {
    fn new(per_host: usize) -> Self {
        Self { per_host: per_host.clamp(1, Semaphore::MAX_PERMITS), hosts: Mutex::default() }
    }

    fn for_url(&self, url: &reqwest::Url) -> Arc<Semaphore> {
        let key = format!(
            "{}:{}",
            url.host_str().unwrap_or_default(),
            url.port_or_known_default().unwrap_or_default()
        );
        let mut hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(hosts.entry(key).or_insert_with(|| Arc::new(Semaphore::new(self.per_host))))
    }
}

/// Executes the retry loop for a [`DeliveryRequest`] against one breaker.
///
/// Cheap to clone: the client is a pooled handle, and clones share the sleeper and the
/// per-host request limits.
#[derive(Debug, Clone)]
pub struct RetryingSender {
    client: reqwest::Client,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    limits: Arc<HostLimits>,
}

impl RetryingSender {
    pub fn new(client: reqwest::Client, policy: RetryPolicy) -> Self {
        Self {
            client,
            policy,
            sleeper: Arc::new(TokioSleeper),
            limits: Arc::new(HostLimits::new(DEFAULT_MAX_CONNECTIONS_PER_HOST)),
        }
    }

    /// Swap the backoff sleeper (tests use `InstantSleeper` / `TrackingSleeper`).
    pub fn with_sleeper<S: Sleeper + 'static>(mut self, sleeper: S) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Cap concurrent requests to any one host. Zero is raised to one.
    ///
    /// Attempts over the cap wait for a slot before sending. The wait aborts on cancellation.
    pub fn with_max_connections_per_host(mut self, limit: usize) -> Self {
        self.limits = Arc::new(HostLimits::new(limit));
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Deliver `request`, retrying transport failures and non-4xx error statuses.
    ///
    /// Both the in-flight request and the backoff wait abort as soon as `cancel` fires.
    pub async fn send(
        &self,
        breaker: &CircuitBreaker,
        request: &DeliveryRequest,
        cancel: &CancellationToken,
    ) -> Result<(), DeliveryError> {
        let provider = breaker.name();
        if !breaker.is_allowed() {
            debug!(provider, "Circuit open, skipping delivery");
            return Err(DeliveryError::CircuitOpen { provider: provider.to_string() });
        }

        let max_attempts = self.policy.max_attempts;
        let mut attempts = 0;
        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    breaker.record_failure();
                    return Err(DeliveryError::Cancelled { provider: provider.to_string() });
                }
                outcome = self.attempt(provider, request) => outcome,
            };
            attempts += 1;

            let err = match outcome {
                Ok(()) => {
                    breaker.record_success();
                    debug!(provider, attempts, "Event delivered");
                    return Ok(());
                }
                Err(err) if !err.is_retryable() => {
                    breaker.record_failure();
                    return Err(err);
                }
                Err(err) => err,
            };

            warn!(provider, attempt = attempts, max_attempts, error = %err, "Delivery attempt failed");

            if attempts >= max_attempts {
                breaker.record_failure();
                return Err(DeliveryError::DeliveryExhausted {
                    provider: provider.to_string(),
                    attempts,
                    last: Box::new(err),
                });
            }

            let delay = self.policy.backoff.delay(attempts);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    breaker.record_failure();
                    return Err(DeliveryError::Cancelled { provider: provider.to_string() });
                }
                _ = self.sleeper.sleep(delay) => {}
            }
        }
    }

    async fn attempt(&self, provider: &str, request: &DeliveryRequest) -> Result<(), DeliveryError> {
        let invalid = |reason: String| DeliveryError::InvalidRequest {
            provider: provider.to_string(),
            reason,
        };

        let url = reqwest::Url::parse(&request.url).map_err(|e| invalid(e.to_string()))?;
        let slots = self.limits.for_url(&url);
        let _slot = slots.acquire().await.ok();

        let mut builder = self
            .client
            .post(url)
            .timeout(self.policy.attempt_timeout)
            .body(request.body.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_builder() {
                invalid(e.to_string())
            } else {
                DeliveryError::Transport(e)
            }
        })?;
        let status = response.status();
        if status.as_u16() < 300 {
            return Ok(());
        }

        let body = error_body(provider, response).await;
        if status.is_client_error() {
            return Err(DeliveryError::ClientError {
                provider: provider.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Err(DeliveryError::UnexpectedStatus { status: status.as_u16(), body })
    }
}

/// Read at most [`MAX_ERROR_BODY`] bytes of an error response for diagnostics.
async fn error_body(provider: &str, mut response: reqwest::Response) -> String {
    let mut buf = Vec::new();
    while buf.len() < MAX_ERROR_BODY {
        match response.chunk().await {
            Ok(Some(chunk)) => buf.extend_from_slice(&chunk),
            Ok(None) => break,
            Err(e) => {
                warn!(provider, error = %e, "Failed to read error response body");
                break;
            }
        }
    }
    buf.truncate(MAX_ERROR_BODY);

    let mut body = String::from_utf8_lossy(&buf).into_owned();
    let mut end = body.len().min(MAX_ERROR_BODY);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body.truncate(end);
    body
}
