#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # Telemetry Forwarder
//!
//! Accepts telemetry events over HTTP and forwards each one, without blocking the caller,
//! to every configured observability backend.
//!
//! ## Features
//!
//! - **Per-destination circuit breakers** with half-open recovery trials
//! - **Bounded retries** with exponential backoff (1s, 2s, 4s, ...) and per-attempt timeouts
//! - **Per-host request limits** shared by every provider using the same sender
//! - **Concurrent fan-out**: one task per provider, failures isolated per destination
//! - **Cancellation** of in-flight attempts and backoff waits on shutdown
//! - **Pluggable providers** via the [`Provider`] trait (Honeycomb built in)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use telemetry_forwarder::{
//!     build_http_client, CircuitBreakerConfig, FanoutDispatcher, HoneycombConfig,
//!     HttpClientSettings, ProviderRegistry, RetryPolicy, RetryingSender, TelemetryEvent,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = build_http_client(&HttpClientSettings::default())?;
//!     let sender = RetryingSender::new(client, RetryPolicy::default());
//!     let registry = ProviderRegistry::from_config(
//!         HoneycombConfig::new("api-key", "https://api.honeycomb.io", "cli-telemetry"),
//!         sender,
//!         CircuitBreakerConfig::default(),
//!     );
//!
//!     let dispatcher = FanoutDispatcher::new(registry, CancellationToken::new());
//!     let event = TelemetryEvent::named("checkout.completed").with_attribute("user", "u1");
//!     let report = dispatcher.dispatch(Arc::new(event), &CancellationToken::new()).await;
//!     println!("delivered to {:?}", report.delivered);
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod circuit_breaker;
pub mod clock;
pub mod config;
pub mod delivery;
pub mod error;
pub mod event;
pub mod fanout;
pub mod prelude;
pub mod provider;
pub mod server;
pub mod sleeper;

// Re-exports
pub use backoff::Backoff;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{Config, LogFormat};
pub use delivery::{
    build_http_client, DeliveryRequest, HttpClientSettings, RetryPolicy, RetryingSender,
    MAX_ERROR_BODY,
};
pub use error::{DeliveryError, ForwarderError};
pub use event::TelemetryEvent;
pub use fanout::{FanoutDispatcher, FanoutReport};
pub use provider::{HoneycombConfig, HoneycombProvider, Provider, ProviderRegistry, ProviderStatus};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
