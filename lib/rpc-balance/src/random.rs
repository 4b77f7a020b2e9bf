use rand::Rng;
use rpc_api::RpcRequest;
use rpc_core::ServiceAddresses;

use crate::load_balancer::LoadBalance;

/// Uniform random choice over the membership list
#[derive(Debug, Default)]
pub struct RandomLoadBalance;

impl RandomLoadBalance {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalance for RandomLoadBalance {
    fn do_select(&self, addresses: &ServiceAddresses, _request: &RpcRequest) -> Option<String> {
        if addresses.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..addresses.len());
        addresses.get(index).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpc_api::ServiceIdentity;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_random_covers_all_addresses() {
        let lb = RandomLoadBalance::new();
        let addresses = Arc::new(vec!["a:1".to_string(), "b:2".to_string(), "c:3".to_string()]);
        let request = RpcRequest::new(&ServiceIdentity::new("OrderService", "", "v1"), "get");

        let seen: HashSet<String> = (0..500)
            .filter_map(|_| lb.select_service_address(&addresses, &request))
            .collect();
        assert_eq!(seen.len(), 3);
    }
}
