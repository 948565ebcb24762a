//! Registry of configured providers.
//!
//! Populated at startup, then read concurrently by every fan-out. Reads clone `Arc`s out
//! from under the lock so no send ever runs while the lock is held.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tracing::{info, warn};

use crate::circuit_breaker::{CircuitBreakerConfig, CircuitSnapshot};
use crate::delivery::RetryingSender;
use crate::provider::{HoneycombConfig, HoneycombProvider, Provider};

/// Status row for one registered provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderStatus {
    pub name: String,
    pub enabled: bool,
    pub circuit: Option<CircuitSnapshot>,
}

/// Name → provider mapping, safe for concurrent enumeration.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: Arc<RwLock<HashMap<String, Arc<dyn Provider>>>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry").field("providers", &self.names()).finish()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry for the known destinations, each with its own breaker.
    ///
    /// Disabled providers are still registered so `/status` can report them.
    pub fn from_config(
        honeycomb: HoneycombConfig,
        sender: RetryingSender,
        breaker: CircuitBreakerConfig,
    ) -> Self {
        let registry = Self::new();
        registry.register(Arc::new(HoneycombProvider::new(honeycomb, sender, breaker)));
        registry
    }

    /// Add a provider under its name. An existing entry with that name is replaced.
    pub fn register(&self, provider: Arc<dyn Provider>) {
        let name = provider.name().to_string();
        let enabled = provider.is_enabled();
        let mut map = self.providers.write().unwrap_or_else(PoisonError::into_inner);
        if map.contains_key(&name) {
            warn!(provider = %name, "Provider replaced; last registration wins");
        }
        map.insert(name.clone(), provider);
        info!(provider = %name, enabled, "Registered provider");
    }

    /// Provider registered under `name`, if any.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.read().unwrap_or_else(PoisonError::into_inner).get(name).cloned()
    }

    /// Every registered provider, sorted by name.
    pub fn all(&self) -> Vec<Arc<dyn Provider>> {
        let mut providers: Vec<Arc<dyn Provider>> = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        providers.sort_by(|a, b| a.name().cmp(b.name()));
        providers
    }

    /// Providers eligible for fan-out.
    pub fn enabled(&self) -> Vec<Arc<dyn Provider>> {
        self.all().into_iter().filter(|p| p.is_enabled()).collect()
    }

    /// Registered names in sorted order, enabled or not.
    pub fn names(&self) -> Vec<String> {
        self.all().iter().map(|p| p.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Status of every provider sorted by name.
    pub fn snapshot(&self) -> Vec<ProviderStatus> {
        self.all()
            .iter()
            .map(|p| ProviderStatus {
                name: p.name().to_string(),
                enabled: p.is_enabled(),
                circuit: p.circuit(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitState;
    use crate::delivery::{build_http_client, HttpClientSettings, RetryPolicy};
    use crate::error::DeliveryError;
    use crate::event::TelemetryEvent;
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    struct Fixed {
        name: &'static str,
        enabled: bool,
    }

    #[async_trait]
    impl Provider for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn is_enabled(&self) -> bool {
            self.enabled
        }

        async fn send(
            &self,
            _event: &TelemetryEvent,
            _cancel: &CancellationToken,
        ) -> Result<(), DeliveryError> {
            Ok(())
        }
    }

    fn fixed(name: &'static str, enabled: bool) -> Arc<dyn Provider> {
        Arc::new(Fixed { name, enabled })
    }

    #[test]
    fn enabled_filters_and_all_is_sorted() {
        let registry = ProviderRegistry::new();
        registry.register(fixed("zeta", true));
        registry.register(fixed("alpha", false));
        registry.register(fixed("mid", true));

        assert_eq!(registry.names(), vec!["alpha", "mid", "zeta"]);
        let enabled: Vec<String> =
            registry.enabled().iter().map(|p| p.name().to_string()).collect();
        assert_eq!(enabled, vec!["mid", "zeta"]);
    }

    #[test]
    fn reregistering_replaces() {
        let registry = ProviderRegistry::new();
        registry.register(fixed("a", false));
        registry.register(fixed("a", true));

        assert_eq!(registry.len(), 1);
        assert!(registry.get("a").unwrap().is_enabled());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn snapshot_reports_circuits() {
        let client = build_http_client(&HttpClientSettings::default()).unwrap();
        let sender = RetryingSender::new(client, RetryPolicy::default());
        let registry = ProviderRegistry::from_config(
            HoneycombConfig::new("k", "https://example.test", "prod"),
            sender,
            CircuitBreakerConfig::default(),
        );
        registry.register(fixed("plain", false));

        let snapshot = registry.snapshot();

        assert_eq!(
            snapshot,
            vec![
                ProviderStatus {
                    name: "Honeycomb".into(),
                    enabled: true,
                    circuit: Some(CircuitSnapshot {
                        state: CircuitState::Closed,
                        failure_count: 0
                    }),
                },
                ProviderStatus { name: "plain".into(), enabled: false, circuit: None },
            ]
        );
    }

    #[test]
    fn unconfigured_honeycomb_is_excluded_from_fanout() {
        let client = build_http_client(&HttpClientSettings::default()).unwrap();
        let registry = ProviderRegistry::from_config(
            HoneycombConfig::default(),
            RetryingSender::new(client, RetryPolicy::default()),
            CircuitBreakerConfig::default(),
        );

        assert_eq!(registry.len(), 1);
        assert!(registry.enabled().is_empty());
    }

    #[test]
    fn concurrent_reads_while_registering() {
        let registry = ProviderRegistry::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    if i % 2 == 0 {
                        registry.register(fixed("shared", true));
                    }
                    registry.enabled().len()
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap() <= 1);
        }
        assert_eq!(registry.len(), 1);
    }
}
