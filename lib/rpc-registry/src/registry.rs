//! Publishing provider endpoints

use async_trait::async_trait;
use rpc_core::{Capability, Endpoint, ExtensionTable, Result};
use std::sync::Arc;
use tracing::debug;

use crate::store::MembershipStore;

/// Type name of the coordinator-backed registry
pub const ZK_SERVICE_REGISTRY: &str = "rpc.registry.ZkServiceRegistry";

/// Makes a provider endpoint discoverable under a service name
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    async fn register_service(&self, rpc_service_name: &str, address: &Endpoint) -> Result<()>;
}

impl Capability for dyn ServiceRegistry {
    const TYPE_NAME: &'static str = "rpc.registry.ServiceRegistry";
}

/// Registry writing persistent member nodes through the membership store
pub struct ZkServiceRegistry {
    store: Arc<MembershipStore>,
}

impl ZkServiceRegistry {
    pub fn new(store: Arc<MembershipStore>) -> Self {
        Self { store }
    }
}

/// Declare the registry capability and register the coordinator-backed
/// implementation over `store`
pub fn register_builtin(table: &mut ExtensionTable, store: &Arc<MembershipStore>) {
    let store = Arc::clone(store);
    table
        .declare::<dyn ServiceRegistry>()
        .register::<ZkServiceRegistry, dyn ServiceRegistry>(
            ZK_SERVICE_REGISTRY,
            move || ZkServiceRegistry::new(Arc::clone(&store)),
            |registry| registry,
        )
        .embed::<dyn ServiceRegistry>(include_str!(
            "../resources/META-INF/extensions/rpc.registry.ServiceRegistry"
        ));
}

#[async_trait]
impl ServiceRegistry for ZkServiceRegistry {
    async fn register_service(&self, rpc_service_name: &str, address: &Endpoint) -> Result<()> {
        let path = self.store.member_path(rpc_service_name, address);
        debug!("Registering {} at {}", rpc_service_name, path);
        self.store.ensure_node(&path).await
    }
}
