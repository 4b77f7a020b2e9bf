//! Local table of service implementations exposed by this process

use rpc_api::ServiceIdentity;
use rpc_core::{Endpoint, Result, RpcError};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::registry::ServiceRegistry;

/// A service implementation as held by the provider
pub type ServiceObject = Arc<dyn Any + Send + Sync>;

/// ServiceProvider keeps the implementations this process serves and
/// publishes them to the registry
pub struct ServiceProvider {
    // Map of rpc service name to implementation
    services: Arc<RwLock<HashMap<String, ServiceObject>>>,
    registry: Arc<dyn ServiceRegistry>,
    address: Endpoint,
}

impl ServiceProvider {
    pub fn new(registry: Arc<dyn ServiceRegistry>, address: Endpoint) -> Self {
        Self {
            services: Arc::new(RwLock::new(HashMap::new())),
            registry,
            address,
        }
    }

    /// Address published for every service of this provider
    pub fn address(&self) -> &Endpoint {
        &self.address
    }

    /// Add a service locally. Returns `false` when the name was already taken;
    /// the first implementation is kept.
    pub async fn add_service(&self, identity: &ServiceIdentity, service: ServiceObject) -> bool {
        let service_name = identity.service_name();
        let mut services = self.services.write().await;
        if services.contains_key(&service_name) {
            debug!("Service already added: {}", service_name);
            return false;
        }
        services.insert(service_name.clone(), service);
        info!("Add service: {}", service_name);
        true
    }

    /// Add a service and register it at this provider's address.
    ///
    /// The service stays usable locally when registration fails; the error
    /// is returned so the caller can decide whether that matters.
    pub async fn publish_service(
        &self,
        identity: &ServiceIdentity,
        service: ServiceObject,
    ) -> Result<()> {
        self.add_service(identity, service).await;

        let service_name = identity.service_name();
        self.registry
            .register_service(&service_name, &self.address)
            .await
            .map_err(|e| {
                warn!(
                    "{} is served locally but not discoverable: {}",
                    service_name, e
                );
                e
            })
    }

    /// Get a service implementation by rpc service name
    pub async fn get_service(&self, rpc_service_name: &str) -> Result<ServiceObject> {
        let services = self.services.read().await;
        services
            .get(rpc_service_name)
            .cloned()
            .ok_or_else(|| RpcError::ServiceNotFound(rpc_service_name.to_string()))
    }

    /// Get a service implementation as its concrete type
    pub async fn get_service_as<T: Send + Sync + 'static>(
        &self,
        rpc_service_name: &str,
    ) -> Result<Arc<T>> {
        self.get_service(rpc_service_name)
            .await?
            .downcast::<T>()
            .map_err(|_| {
                RpcError::InvalidArgument(format!(
                    "service {} is not a {}",
                    rpc_service_name,
                    std::any::type_name::<T>()
                ))
            })
    }

    /// Names of all services added so far
    pub async fn service_names(&self) -> Vec<String> {
        let services = self.services.read().await;
        let mut names: Vec<String> = services.keys().cloned().collect();
        names.sort();
        names
    }

    /// Get count of added services
    pub async fn service_count(&self) -> usize {
        let services = self.services.read().await;
        services.len()
    }
}
