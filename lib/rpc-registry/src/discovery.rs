//! Resolving a request to one provider endpoint

use async_trait::async_trait;
use rpc_api::RpcRequest;
use rpc_balance::LoadBalance;
use rpc_core::{Endpoint, Result, RpcError};
use std::sync::Arc;
use tracing::{info, warn};

use crate::metrics::ControlPlaneMetrics;
use crate::store::MembershipStore;

/// Finds an endpoint able to serve a request
#[async_trait]
pub trait ServiceDiscovery: Send + Sync {
    async fn lookup_service(&self, request: &RpcRequest) -> Result<Endpoint>;
}

/// Discovery over the membership store, choosing among members with a
/// load balancing strategy
pub struct ZkServiceDiscovery {
    store: Arc<MembershipStore>,
    load_balance: Arc<dyn LoadBalance>,
    metrics: ControlPlaneMetrics,
}

impl ZkServiceDiscovery {
    pub fn new(
        store: Arc<MembershipStore>,
        load_balance: Arc<dyn LoadBalance>,
        metrics: ControlPlaneMetrics,
    ) -> Self {
        Self {
            store,
            load_balance,
            metrics,
        }
    }
}

#[async_trait]
impl ServiceDiscovery for ZkServiceDiscovery {
    async fn lookup_service(&self, request: &RpcRequest) -> Result<Endpoint> {
        let service_name = request.rpc_service_name();
        self.metrics
            .lookups_total
            .with_label_values(&[service_name.as_str()])
            .inc();

        let selected = match self.store.list_children(&service_name).await {
            Some(addresses) if !addresses.is_empty() => {
                self.load_balance.select_service_address(&addresses, request)
            }
            _ => None,
        };

        let Some(address) = selected else {
            warn!("No provider available for {}", service_name);
            self.metrics
                .lookup_failures_total
                .with_label_values(&[service_name.as_str()])
                .inc();
            return Err(RpcError::ServiceNotFound(service_name));
        };

        info!("Discovered service address for {}: [{}]", service_name, address);
        Endpoint::parse(&address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::CoordinationClient;
    use crate::memory::{InMemoryConnector, InMemoryCoordinator};
    use rpc_api::ServiceIdentity;
    use rpc_balance::RoundRobinLoadBalance;
    use rpc_core::config::CoordinatorConfig;

    async fn discovery_with(members: &[&str]) -> (ZkServiceDiscovery, ControlPlaneMetrics) {
        let coordinator = InMemoryCoordinator::new();
        let session = coordinator.session();
        session.create_persistent("/my-rpc/OrderServicev1").await.unwrap();
        for member in members {
            session
                .create_persistent(&format!("/my-rpc/OrderServicev1/{}", member))
                .await
                .unwrap();
        }

        let metrics = ControlPlaneMetrics::new().unwrap();
        let store = Arc::new(MembershipStore::new(
            Arc::new(InMemoryConnector::new(coordinator)),
            &CoordinatorConfig::default(),
            metrics.clone(),
        ));
        let discovery =
            ZkServiceDiscovery::new(store, Arc::new(RoundRobinLoadBalance::new()), metrics.clone());
        (discovery, metrics)
    }

    fn order_request() -> RpcRequest {
        RpcRequest::new(&ServiceIdentity::new("OrderService", "", "v1"), "placeOrder")
    }

    #[tokio::test]
    async fn test_lookup_returns_parsed_endpoint() {
        let (discovery, metrics) = discovery_with(&["10.0.0.1:8080"]).await;

        let endpoint = discovery.lookup_service(&order_request()).await.unwrap();
        assert_eq!(endpoint, Endpoint::new("10.0.0.1", 8080));
        assert_eq!(
            metrics.lookups_total.with_label_values(&["OrderServicev1"]).get(),
            1
        );
    }

    #[tokio::test]
    async fn test_lookup_without_members_is_not_found() {
        let (discovery, metrics) = discovery_with(&[]).await;

        let result = discovery.lookup_service(&order_request()).await;
        assert!(matches!(result, Err(RpcError::ServiceNotFound(name)) if name == "OrderServicev1"));
        assert_eq!(
            metrics
                .lookup_failures_total
                .with_label_values(&["OrderServicev1"])
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn test_lookup_unknown_service_is_not_found() {
        let (discovery, _) = discovery_with(&["10.0.0.1:8080"]).await;
        let request = RpcRequest::new(&ServiceIdentity::new("BillingService", "", "v1"), "charge");

        assert!(matches!(
            discovery.lookup_service(&request).await,
            Err(RpcError::ServiceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_member_is_invalid_address() {
        let (discovery, _) = discovery_with(&["not-an-address"]).await;

        assert!(matches!(
            discovery.lookup_service(&order_request()).await,
            Err(RpcError::InvalidAddress(_))
        ));
    }
}
