//! Load balancing strategies for choosing one endpoint per call

use rpc_api::RpcRequest;
use rpc_core::config::LoadBalanceConfig;
use rpc_core::{Capability, ExtensionTable, ServiceAddresses};

use crate::consistent_hash::ConsistentHashLoadBalance;
use crate::random::RandomLoadBalance;
use crate::round_robin::RoundRobinLoadBalance;

/// Type name of the consistent hash strategy
pub const CONSISTENT_HASH: &str = "rpc.loadbalance.ConsistentHashLoadBalance";
/// Type name of the random strategy
pub const RANDOM: &str = "rpc.loadbalance.RandomLoadBalance";
/// Type name of the round-robin strategy
pub const ROUND_ROBIN: &str = "rpc.loadbalance.RoundRobinLoadBalance";

/// Strategy selecting one address from a service's membership list
pub trait LoadBalance: Send + Sync {
    /// Select an address for `request`.
    ///
    /// An empty list yields `None`; a single address is returned without
    /// consulting the strategy.
    fn select_service_address(
        &self,
        addresses: &ServiceAddresses,
        request: &RpcRequest,
    ) -> Option<String> {
        match addresses.len() {
            0 => None,
            1 => addresses.first().cloned(),
            _ => self.do_select(addresses, request),
        }
    }

    /// Strategy logic, called with at least two addresses
    fn do_select(&self, addresses: &ServiceAddresses, request: &RpcRequest) -> Option<String>;
}

impl Capability for dyn LoadBalance {
    const TYPE_NAME: &'static str = "rpc.loadbalance.LoadBalance";
}

/// Declare the load balance capability and register the built-in strategies
pub fn register_builtin(table: &mut ExtensionTable, config: &LoadBalanceConfig) {
    let replica_count = config.replica_count;

    table
        .declare::<dyn LoadBalance>()
        .register::<ConsistentHashLoadBalance, dyn LoadBalance>(
            CONSISTENT_HASH,
            move || ConsistentHashLoadBalance::with_replicas(replica_count),
            |lb| lb,
        )
        .register::<RandomLoadBalance, dyn LoadBalance>(RANDOM, RandomLoadBalance::new, |lb| lb)
        .register::<RoundRobinLoadBalance, dyn LoadBalance>(
            ROUND_ROBIN,
            RoundRobinLoadBalance::new,
            |lb| lb,
        )
        .embed::<dyn LoadBalance>(include_str!(
            "../resources/META-INF/extensions/rpc.loadbalance.LoadBalance"
        ));
}
