//! Convenient re-exports for building and testing providers.
pub use crate::{
    backoff::{Backoff, BackoffError, MAX_BACKOFF},
    circuit_breaker::{
        CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitSnapshot, CircuitState,
    },
    clock::{Clock, ManualClock, MonotonicClock},
    delivery::{DeliveryRequest, RetryPolicy, RetryingSender},
    error::DeliveryError,
    event::TelemetryEvent,
    fanout::{FanoutDispatcher, FanoutReport},
    provider::{Provider, ProviderRegistry, ProviderStatus},
    sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper},
};
