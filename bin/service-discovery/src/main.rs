use anyhow::{Context, Result};
use rpc_api::{RpcRequest, ServiceIdentity};
use rpc_core::telemetry::init_tracing;
use rpc_core::config::CoordinatorConfig;
use rpc_core::{Endpoint, RpcConfig};
use rpc_registry::{InMemoryConnector, InMemoryCoordinator, RpcContext, ServiceDiscovery};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Address this process publishes its services under
const PROVIDER_ADDRESS_ENV: &str = "RPC_PROVIDER_ADDRESS";
/// Comma separated `interface:group:version` entries to publish
const PUBLISH_ENV: &str = "RPC_PUBLISH";
/// Comma separated `interface:group:version` entries to resolve periodically
const RESOLVE_ENV: &str = "RPC_RESOLVE";

const RESOLVE_INTERVAL: Duration = Duration::from_secs(30);

struct PublishedService;

#[tokio::main]
async fn main() -> Result<()> {
    let config = RpcConfig::from_env().context("loading configuration")?;
    init_tracing(&config.logging);

    info!("Starting service-discovery daemon...");

    let address = match std::env::var(PROVIDER_ADDRESS_ENV) {
        Ok(value) => Endpoint::parse(&value)?,
        Err(_) => Endpoint::new("127.0.0.1", 9998),
    };
    let published = identities_from_env(PUBLISH_ENV)?;
    let resolved = identities_from_env(RESOLVE_ENV)?;

    // The daemon always runs its own embedded coordinator
    if let Some(ignored) = ignored_coordinator_address(&config.coordinator) {
        warn!(
            "Coordinator address {} is not used, the daemon runs an embedded coordinator",
            ignored
        );
    }
    let coordinator = InMemoryCoordinator::new();
    let context = RpcContext::new(config, Arc::new(InMemoryConnector::new(coordinator)))?;
    context.start().await?;

    let provider = context.service_provider(address.clone())?;
    for identity in &published {
        if let Err(e) = provider
            .publish_service(identity, Arc::new(PublishedService))
            .await
        {
            warn!("Publishing {} failed: {}", identity, e);
        }
    }
    info!(
        "Serving {} services at {}",
        provider.service_count().await,
        address
    );

    let discovery = context.service_discovery()?;
    let mut interval = tokio::time::interval(RESOLVE_INTERVAL);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                for identity in &resolved {
                    let request = RpcRequest::new(identity, "ping");
                    match discovery.lookup_service(&request).await {
                        Ok(endpoint) => info!("{} resolved to {}", identity, endpoint),
                        Err(e) => error!("Error resolving {}: {}", identity, e),
                    }
                }
                if let Ok(text) = context.metrics().gather() {
                    debug!("Metrics:\n{}", text);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down service-discovery daemon...");
                break;
            }
        }
    }

    let report = context.shutdown(&address).await;
    if !report.is_complete() {
        warn!("{} registrations could not be removed", report.failed.len());
    }
    Ok(())
}

/// A configured coordinator address other than the default, which this
/// daemon cannot honour
fn ignored_coordinator_address(config: &CoordinatorConfig) -> Option<&str> {
    (config.address != CoordinatorConfig::default().address).then_some(config.address.as_str())
}

fn identities_from_env(key: &str) -> Result<Vec<ServiceIdentity>> {
    match std::env::var(key) {
        Ok(value) => parse_identities(&value),
        Err(_) => Ok(Vec::new()),
    }
}

/// Parse `interface:group:version` entries; group and version may be omitted
fn parse_identities(value: &str) -> Result<Vec<ServiceIdentity>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let mut parts = entry.split(':');
            let interface = parts.next().unwrap_or_default();
            let group = parts.next().unwrap_or_default();
            let version = parts.next().unwrap_or_default();
            if interface.is_empty() || parts.next().is_some() {
                anyhow::bail!("invalid service entry: {}", entry);
            }
            Ok(ServiceIdentity::new(interface, group, version))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_identities() {
        let identities = parse_identities("OrderService::v1, BillingService:eu:v2,Audit").unwrap();
        let names: Vec<String> = identities.iter().map(|i| i.service_name()).collect();
        assert_eq!(names, vec!["OrderServicev1", "BillingServiceeuv2", "Audit"]);
    }

    #[test]
    fn test_parse_identities_rejects_bad_entries() {
        assert!(parse_identities(":g:v").is_err());
        assert!(parse_identities("a:b:c:d").is_err());
        assert!(parse_identities("").unwrap().is_empty());
    }

    #[test]
    fn test_non_default_coordinator_address_is_reported() {
        let mut config = CoordinatorConfig::default();
        assert_eq!(ignored_coordinator_address(&config), None);

        config.address = "zk-1.internal:2181".to_string();
        assert_eq!(ignored_coordinator_address(&config), Some("zk-1.internal:2181"));
    }
}
