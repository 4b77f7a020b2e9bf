//! Wiring of the control plane for one process

use rpc_balance::LoadBalance;
use rpc_core::{Endpoint, ExtensionLoader, ExtensionTable, Result, RpcConfig, RpcError, Serializer};
use std::sync::Arc;
use tracing::info;

use crate::coordination::Connector;
use crate::discovery::ZkServiceDiscovery;
use crate::metrics::ControlPlaneMetrics;
use crate::provider::ServiceProvider;
use crate::registry::{self, ServiceRegistry};
use crate::store::{ClearReport, MembershipStore};

/// RpcContext owns the extension loader, the membership store and the
/// metrics, and hands out the capabilities selected by configuration.
pub struct RpcContext {
    config: RpcConfig,
    extensions: Arc<ExtensionLoader>,
    membership: Arc<MembershipStore>,
    metrics: ControlPlaneMetrics,
}

impl RpcContext {
    pub fn new(config: RpcConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        config.validate()?;

        let metrics = ControlPlaneMetrics::new()
            .map_err(|e| RpcError::Configuration(format!("metrics registry: {}", e)))?;
        let membership = Arc::new(MembershipStore::new(
            connector,
            &config.coordinator,
            metrics.clone(),
        ));

        let mut table = ExtensionTable::new();
        rpc_core::serialize::register_builtin(&mut table);
        rpc_balance::register_builtin(&mut table, &config.load_balance);
        registry::register_builtin(&mut table, &membership);
        for dir in &config.extensions.search_path {
            table.add_search_directory(dir.clone());
        }

        Ok(Self {
            config,
            extensions: Arc::new(ExtensionLoader::new(table)),
            membership,
            metrics,
        })
    }

    /// Connect to the coordinator. An error here should stop the process.
    pub async fn start(&self) -> Result<()> {
        info!(
            "Starting RPC context against coordinator {} under {}",
            self.config.coordinator.address,
            self.membership.root_path()
        );
        self.membership.connect().await
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    pub fn extensions(&self) -> &Arc<ExtensionLoader> {
        &self.extensions
    }

    pub fn membership(&self) -> &Arc<MembershipStore> {
        &self.membership
    }

    pub fn metrics(&self) -> &ControlPlaneMetrics {
        &self.metrics
    }

    /// The configured message serializer
    pub fn serializer(&self) -> Result<Arc<dyn Serializer>> {
        self.extensions
            .resolve::<dyn Serializer>(&self.config.extensions.serializer)
    }

    /// The configured load balancing strategy
    pub fn load_balance(&self) -> Result<Arc<dyn LoadBalance>> {
        self.extensions
            .resolve::<dyn LoadBalance>(&self.config.extensions.load_balance)
    }

    /// The configured service registry
    pub fn service_registry(&self) -> Result<Arc<dyn ServiceRegistry>> {
        self.extensions
            .resolve::<dyn ServiceRegistry>(&self.config.extensions.registry)
    }

    /// Discovery over the membership store using the configured strategy
    pub fn service_discovery(&self) -> Result<ZkServiceDiscovery> {
        Ok(ZkServiceDiscovery::new(
            Arc::clone(&self.membership),
            self.load_balance()?,
            self.metrics.clone(),
        ))
    }

    /// A provider publishing through the configured registry at `address`
    pub fn service_provider(&self, address: Endpoint) -> Result<ServiceProvider> {
        Ok(ServiceProvider::new(self.service_registry()?, address))
    }

    /// Remove every node this process registered for `address`
    pub async fn shutdown(&self, address: &Endpoint) -> ClearReport {
        info!("Clearing registrations of {}", address);
        self.membership.clear_all(address).await
    }
}
