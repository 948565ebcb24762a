//! Process configuration loaded from environment variables.

use crate::backoff::Backoff;
use crate::circuit_breaker::CircuitBreakerConfig;
use crate::delivery::{HttpClientSettings, RetryPolicy};
use crate::error::{ForwarderError, Result};
use crate::provider::honeycomb::{HoneycombConfig, DEFAULT_DATASET};
use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Full forwarder configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Ingress listen port (binds all interfaces)
    pub http_port: u16,

    pub honeycomb: HoneycombConfig,

    /// Attempts per provider send
    pub max_attempts: usize,

    /// Timeout applied to each individual attempt
    pub attempt_timeout: Duration,

    /// First backoff wait; doubles on each retry
    pub backoff_base: Duration,

    pub circuit: CircuitBreakerConfig,

    pub http_client: HttpClientSettings,

    /// How long shutdown waits for in-flight deliveries before cancelling them
    pub shutdown_grace: Duration,

    pub log_level: String,

    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 8080,
            honeycomb: HoneycombConfig::default(),
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(15),
            backoff_base: Duration::from_secs(1),
            circuit: CircuitBreakerConfig::default(),
            http_client: HttpClientSettings::default(),
            shutdown_grace: Duration::from_secs(10),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// Unset and empty variables both fall back to the default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Config::default();

        if let Some(port) = parse(&get, "HTTP_API_PORT")? {
            config.http_port = port;
        }

        config.honeycomb = HoneycombConfig::new(
            get("HONEYCOMB_API_KEY").unwrap_or_default(),
            get("HONEYCOMB_API_URL").unwrap_or_default(),
            get("HONEYCOMB_DATASET").unwrap_or_else(|| DEFAULT_DATASET.to_string()),
        );

        if let Some(attempts) = parse_non_zero(&get, "DELIVERY_MAX_ATTEMPTS")? {
            config.max_attempts = attempts;
        }

        if let Some(secs) = parse_non_zero(&get, "DELIVERY_ATTEMPT_TIMEOUT_SECS")? {
            config.attempt_timeout = Duration::from_secs(secs);
        }

        if let Some(ms) = parse(&get, "DELIVERY_BACKOFF_BASE_MS")? {
            config.backoff_base = Duration::from_millis(ms);
        }

        let max_failures =
            parse(&get, "CIRCUIT_MAX_FAILURES")?.unwrap_or(config.circuit.max_failures());
        let open_timeout = parse(&get, "CIRCUIT_OPEN_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(config.circuit.open_timeout());
        config.circuit = CircuitBreakerConfig::new(max_failures, open_timeout)
            .map_err(|e| ForwarderError::Config(format!("invalid circuit breaker settings: {e}")))?;

        if let Some(idle) = parse(&get, "HTTP_POOL_MAX_IDLE_PER_HOST")? {
            config.http_client.pool_max_idle_per_host = idle;
        }

        if let Some(secs) = parse(&get, "HTTP_POOL_IDLE_TIMEOUT_SECS")? {
            config.http_client.pool_idle_timeout = Duration::from_secs(secs);
        }

        if let Some(conns) = parse_non_zero(&get, "HTTP_MAX_CONNS_PER_HOST")? {
            config.http_client.max_connections_per_host = conns;
        }

        if let Some(secs) = parse(&get, "SHUTDOWN_GRACE_SECS")? {
            config.shutdown_grace = Duration::from_secs(secs);
        }

        if let Some(level) = get("LOG_LEVEL") {
            config.log_level = level;
        }

        if let Some(format) = get("LOG_FORMAT") {
            config.log_format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                other => {
                    return Err(ForwarderError::Config(format!(
                        "invalid LOG_FORMAT: {other} (expected 'json' or 'pretty')"
                    )))
                }
            };
        }

        Ok(config)
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.http_port))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            self.attempt_timeout,
            Backoff::exponential(self.backoff_base),
        )
    }
}

fn parse<T, G>(get: &G, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| ForwarderError::Config(format!("invalid {key}: {e} (got {raw:?})")))
        })
        .transpose()
}

/// Like [`parse`], but zero is rejected instead of silently disabling the setting.
fn parse_non_zero<T, G>(get: &G, key: &str) -> Result<Option<T>>
where
    T: FromStr + Default + PartialEq,
    T::Err: Display,
    G: Fn(&str) -> Option<String>,
{
    match parse::<T, G>(get, key)? {
        Some(value) if value == T::default() => Err(ForwarderError::Config(format!(
            "invalid {key}: must be greater than zero"
        ))),
        other => Ok(other),
    }
}
