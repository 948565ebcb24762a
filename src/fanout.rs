//! Fan-out of one event to every enabled provider.
//!
//! Each provider send runs as its own task, so one slow or failing destination never holds
//! up another. [`FanoutDispatcher::dispatch`] joins all of them and reports the outcome;
//! the ingress path uses [`FanoutDispatcher::dispatch_detached`], which tracks the dispatch
//! on a [`TaskTracker`] so shutdown can wait for (or cancel) it.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::error::DeliveryError;
use crate::event::TelemetryEvent;
use crate::provider::ProviderRegistry;

/// Outcome of one fan-out.
#[derive(Debug, Default)]
pub struct FanoutReport {
    pub event: String,
    pub delivered: Vec<String>,
    pub failures: Vec<(String, DeliveryError)>,
    /// Sends whose task panicked instead of returning.
    pub panicked: usize,
}

impl FanoutReport {
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failures.len() + self.panicked
    }

    pub fn all_delivered(&self) -> bool {
        self.failures.is_empty() && self.panicked == 0
    }

    pub fn failure(&self, provider: &str) -> Option<&DeliveryError> {
        self.failures.iter().find(|(name, _)| name == provider).map(|(_, err)| err)
    }
}

/// Sends events to every enabled provider in a registry.
#[derive(Debug, Clone)]
pub struct FanoutDispatcher {
    registry: ProviderRegistry,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl FanoutDispatcher {
    /// `shutdown` is handed to every detached dispatch; cancelling it aborts their sends.
    pub fn new(registry: ProviderRegistry, shutdown: CancellationToken) -> Self {
        Self { registry, tracker: TaskTracker::new(), shutdown }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Number of detached dispatches still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Send `event` to every enabled provider concurrently and wait for all of them.
    ///
    /// Failures are logged here and collected in the report; they never abort other sends.
    pub async fn dispatch(
        &self,
        event: Arc<TelemetryEvent>,
        cancel: &CancellationToken,
    ) -> FanoutReport {
        let mut report = FanoutReport { event: event.name.clone(), ..FanoutReport::default() };
        let providers = self.registry.enabled();
        if providers.is_empty() {
            debug!(event = %event.name, "No enabled providers, dropping event");
            return report;
        }

        let mut sends = JoinSet::new();
        for provider in providers {
            let event = Arc::clone(&event);
            let cancel = cancel.clone();
            sends.spawn(async move {
                let result = provider.send(&event, &cancel).await;
                (provider.name().to_string(), result)
            });
        }

        while let Some(joined) = sends.join_next().await {
            match joined {
                Ok((provider, Ok(()))) => report.delivered.push(provider),
                Ok((provider, Err(err))) => {
                    log_failure(&provider, &event.name, &err);
                    report.failures.push((provider, err));
                }
                Err(join_err) => {
                    error!(event = %event.name, error = %join_err, "Provider send task failed");
                    report.panicked += 1;
                }
            }
        }

        debug!(
            event = %report.event,
            delivered = report.delivered.len(),
            failed = report.failures.len(),
            "Fan-out complete"
        );
        report
    }

    /// Start a tracked dispatch and return immediately.
    pub fn dispatch_detached(&self, event: TelemetryEvent) {
        let dispatcher = self.clone();
        let event = Arc::new(event);
        self.tracker.spawn(async move {
            let cancel = dispatcher.shutdown.clone();
            dispatcher.dispatch(event, &cancel).await;
        });
    }

    /// Stop accepting detached work and drain it.
    ///
    /// Waits up to `grace` for in-flight dispatches, then cancels the shutdown token and
    /// waits for the cancelled sends to settle. Returns `true` if everything finished
    /// within the grace period.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tracker.close();
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_ok() {
            info!("All in-flight deliveries finished");
            return true;
        }

        warn!(
            pending = self.tracker.len(),
            grace_secs = grace.as_secs_f64(),
            "Grace period elapsed, cancelling in-flight deliveries"
        );
        self.shutdown.cancel();
        self.tracker.wait().await;
        false
    }
}

fn log_failure(provider: &str, event: &str, err: &DeliveryError) {
    match err {
        DeliveryError::CircuitOpen { .. } | DeliveryError::Cancelled { .. } => {
            warn!(provider, event, kind = err.kind(), error = %err, "Event not delivered");
        }
        _ => {
            error!(provider, event, kind = err.kind(), error = %err, "Event delivery failed");
        }
    }
}
