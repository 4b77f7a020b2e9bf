//! Prometheus counters for membership and discovery

use anyhow::Result;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Control plane counters, cheap to clone; clones share one registry
#[derive(Clone)]
pub struct ControlPlaneMetrics {
    /// Discovery lookups by service
    pub lookups_total: IntCounterVec,
    /// Lookups that found no usable endpoint, by service
    pub lookup_failures_total: IntCounterVec,
    /// Membership lists served from the local cache
    pub address_cache_hits_total: IntCounter,
    /// Membership lists fetched from the coordinator
    pub address_cache_misses_total: IntCounter,
    /// Child-change notifications applied to the cache
    pub watch_events_total: IntCounter,
    /// Registration attempts by outcome
    pub registrations_total: IntCounterVec,
    /// Registry nodes removed at shutdown
    pub deregistrations_total: IntCounter,
    pub registry: Arc<Registry>,
}

impl ControlPlaneMetrics {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let lookups_total = IntCounterVec::new(
            Opts::new("rpc_discovery_lookups_total", "Service discovery lookups"),
            &["service"],
        )?;
        let lookup_failures_total = IntCounterVec::new(
            Opts::new(
                "rpc_discovery_lookup_failures_total",
                "Lookups that found no usable endpoint",
            ),
            &["service"],
        )?;
        let address_cache_hits_total = IntCounter::new(
            "rpc_address_cache_hits_total",
            "Membership lists served from the local cache",
        )?;
        let address_cache_misses_total = IntCounter::new(
            "rpc_address_cache_misses_total",
            "Membership lists fetched from the coordinator",
        )?;
        let watch_events_total = IntCounter::new(
            "rpc_watch_events_total",
            "Child-change notifications applied to the address cache",
        )?;
        let registrations_total = IntCounterVec::new(
            Opts::new("rpc_registrations_total", "Registry node creations by outcome"),
            &["outcome"],
        )?;
        let deregistrations_total = IntCounter::new(
            "rpc_deregistrations_total",
            "Registry nodes removed at shutdown",
        )?;

        registry.register(Box::new(lookups_total.clone()))?;
        registry.register(Box::new(lookup_failures_total.clone()))?;
        registry.register(Box::new(address_cache_hits_total.clone()))?;
        registry.register(Box::new(address_cache_misses_total.clone()))?;
        registry.register(Box::new(watch_events_total.clone()))?;
        registry.register(Box::new(registrations_total.clone()))?;
        registry.register(Box::new(deregistrations_total.clone()))?;

        Ok(Self {
            lookups_total,
            lookup_failures_total,
            address_cache_hits_total,
            address_cache_misses_total,
            watch_events_total,
            registrations_total,
            deregistrations_total,
            registry,
        })
    }

    /// Gather all metrics in Prometheus text format
    pub fn gather(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = vec![];
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_registry() {
        let metrics = ControlPlaneMetrics::new().expect("Failed to create metrics");
        let clone = metrics.clone();
        clone.lookups_total.with_label_values(&["OrderServicev1"]).inc();
        clone.address_cache_hits_total.inc();

        assert_eq!(
            metrics
                .lookups_total
                .with_label_values(&["OrderServicev1"])
                .get(),
            1
        );
        let text = metrics.gather().expect("Failed to gather metrics");
        assert!(text.contains("# TYPE rpc_discovery_lookups_total counter"));
        assert!(text.contains("rpc_address_cache_hits_total 1"));
    }
}
