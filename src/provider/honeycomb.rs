//! Honeycomb events API provider.
//!
//! Each event becomes one POST to `{api_url}/1/events/{dataset}` carrying a single flat JSON
//! object, authenticated with the `X-Honeycomb-Team` header. The dataset is one
//! percent-encoded path segment.

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot};
use crate::delivery::{DeliveryRequest, RetryingSender};
use crate::error::DeliveryError;
use crate::event::TelemetryEvent;
use crate::provider::Provider;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

/// Registry name of the Honeycomb provider.
pub const NAME: &str = "Honeycomb";

/// Dataset used when none is configured.
pub const DEFAULT_DATASET: &str = "cli-telemetry";

const TEAM_HEADER: &str = "X-Honeycomb-Team";

/// Destination settings. Empty key or URL leaves the provider disabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoneycombConfig {
    pub api_key: String,
    pub api_url: String,
    pub dataset: String,
}

impl HoneycombConfig {
    pub fn new(
        api_key: impl Into<String>,
        api_url: impl Into<String>,
        dataset: impl Into<String>,
    ) -> Self {
        Self { api_key: api_key.into(), api_url: api_url.into(), dataset: dataset.into() }
    }

    /// Both the credential and the endpoint are set.
    pub fn is_complete(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.api_url.trim().is_empty()
    }

    /// `{api_url}/1/events/{dataset}`, keeping any path prefix on `api_url`.
    ///
    /// Fails when `api_url` is not an absolute URL that can carry a path.
    pub fn events_url(&self) -> Result<reqwest::Url, String> {
        let mut url = reqwest::Url::parse(self.api_url.trim()).map_err(|e| e.to_string())?;
        url.path_segments_mut()
            .map_err(|()| format!("{} cannot carry a path", self.api_url.trim()))?
            .pop_if_empty()
            .extend(["1", "events", self.dataset.as_str()]);
        Ok(url)
    }
}

impl Default for HoneycombConfig {
    fn default() -> Self {
        Self::new("", "", DEFAULT_DATASET)
    }
}

/// Flatten an event into the Honeycomb payload.
///
/// Later writes win: `name` and `time` first, then resource keys, then attribute keys,
/// then the optional fields that are set.
pub fn wire_payload(event: &TelemetryEvent) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("name".into(), Value::String(event.name.clone()));
    payload.insert("time".into(), Value::String(event.rfc3339_time()));

    for (key, value) in &event.resource {
        payload.insert(key.clone(), value.clone());
    }
    for (key, value) in &event.attributes {
        payload.insert(key.clone(), value.clone());
    }

    if let Some(body) = &event.body {
        payload.insert("body".into(), body.clone());
    }
    if !event.severity_text.is_empty() {
        payload.insert("severity.text".into(), Value::String(event.severity_text.clone()));
    }
    if event.severity_number != 0 {
        payload.insert("severity.number".into(), Value::from(event.severity_number));
    }
    if !event.trace_id.is_empty() {
        payload.insert("trace_id".into(), Value::String(event.trace_id.clone()));
    }
    if !event.span_id.is_empty() {
        payload.insert("span_id".into(), Value::String(event.span_id.clone()));
    }
    if event.dropped_attributes_count != 0 {
        payload.insert(
            "dropped_attributes_count".into(),
            Value::from(event.dropped_attributes_count),
        );
    }
    payload
}

/// Honeycomb provider with its own circuit breaker.
#[derive(Debug)]
pub struct HoneycombProvider {
    config: HoneycombConfig,
    sender: RetryingSender,
    breaker: CircuitBreaker,
}

impl HoneycombProvider {
    pub fn new(
        config: HoneycombConfig,
        sender: RetryingSender,
        breaker_config: CircuitBreakerConfig,
    ) -> Self {
        Self { config, sender, breaker: CircuitBreaker::new(NAME, breaker_config) }
    }

    /// Replace the breaker, e.g. one driven by a test clock.
    pub fn with_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn config(&self) -> &HoneycombConfig {
        &self.config
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Build the outbound request for one event.
    pub fn request(&self, event: &TelemetryEvent) -> Result<DeliveryRequest, DeliveryError> {
        let url = self
            .config
            .events_url()
            .map_err(|reason| DeliveryError::InvalidRequest { provider: NAME.to_string(), reason })?;
        Ok(DeliveryRequest::json(url.as_str(), &wire_payload(event))?
            .header(TEAM_HEADER, self.config.api_key.trim()))
    }
}

#[async_trait]
impl Provider for HoneycombProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn is_enabled(&self) -> bool {
        self.config.is_complete()
    }

    async fn send(
        &self,
        event: &TelemetryEvent,
        cancel: &CancellationToken,
    ) -> Result<(), DeliveryError> {
        if !self.is_enabled() {
            return Err(DeliveryError::Disabled { provider: NAME.to_string() });
        }
        let request = self.request(event)?;
        self.sender.send(&self.breaker, &request, cancel).await
    }

    fn circuit(&self) -> Option<CircuitSnapshot> {
        Some(self.breaker.snapshot())
    }
}
