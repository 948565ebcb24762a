//! Provider system: one adapter per downstream observability backend.
//!
//! Every provider owns its own circuit breaker and translates events into its backend's
//! wire shape before handing them to a [`RetryingSender`](crate::delivery::RetryingSender).
//! The fan-out dispatcher sends each event to every enabled provider in the registry.

pub mod honeycomb;
pub mod registry;

use crate::circuit_breaker::CircuitSnapshot;
use crate::error::DeliveryError;
use crate::event::TelemetryEvent;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub use honeycomb::{HoneycombConfig, HoneycombProvider};
pub use registry::{ProviderRegistry, ProviderStatus};

/// Provider trait - delivers events to one destination
///
/// New destinations are added by implementing this trait and registering an instance;
/// the dispatcher never needs to change.
///
/// # Example
///
/// ```ignore
/// struct StdoutProvider;
///
/// #[async_trait]
/// impl Provider for StdoutProvider {
///     fn name(&self) -> &str { "stdout" }
///     fn is_enabled(&self) -> bool { true }
///
///     async fn send(&self, event: &TelemetryEvent, _cancel: &CancellationToken)
///         -> Result<(), DeliveryError>
///     {
///         println!("{}", event.name);
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier, used as the registry key and in logs
    fn name(&self) -> &str;

    /// True when the destination's required configuration is present
    fn is_enabled(&self) -> bool;

    /// Translate and deliver one event
    ///
    /// Must not mutate the event; it is shared with every other provider's send.
    async fn send(
        &self,
        event: &TelemetryEvent,
        cancel: &CancellationToken,
    ) -> Result<(), DeliveryError>;

    /// Breaker state for status reporting, if this provider uses one
    fn circuit(&self) -> Option<CircuitSnapshot> {
        None
    }
}
