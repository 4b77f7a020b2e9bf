use rpc_api::RpcRequest;
use rpc_core::ServiceAddresses;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::load_balancer::LoadBalance;

/// Round-robin: distribute requests evenly across endpoints
#[derive(Debug, Default)]
pub struct RoundRobinLoadBalance {
    counter: AtomicUsize,
}

impl RoundRobinLoadBalance {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalance for RoundRobinLoadBalance {
    fn do_select(&self, addresses: &ServiceAddresses, _request: &RpcRequest) -> Option<String> {
        if addresses.is_empty() {
            return None;
        }
        let current = self.counter.fetch_add(1, Ordering::SeqCst);
        addresses.get(current % addresses.len()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpc_api::ServiceIdentity;
    use std::sync::Arc;

    #[test]
    fn test_round_robin_cycles() {
        let lb = RoundRobinLoadBalance::new();
        let addresses = Arc::new(vec!["a:1".to_string(), "b:2".to_string(), "c:3".to_string()]);
        let request = RpcRequest::new(&ServiceIdentity::new("OrderService", "", "v1"), "get");

        let picks: Vec<String> = (0..6)
            .filter_map(|_| lb.select_service_address(&addresses, &request))
            .collect();
        assert_eq!(picks, vec!["a:1", "b:2", "c:3", "a:1", "b:2", "c:3"]);
    }
}
