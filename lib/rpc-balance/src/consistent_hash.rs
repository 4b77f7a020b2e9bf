//! Consistent hashing with virtual nodes
//!
//! Every endpoint is placed on a 32-bit ring `replica_count` times. Each
//! MD5 digest of `endpoint + i` yields four positions, so an endpoint costs
//! `replica_count / 4` digests. A request hashes to a key and is served by
//! the first position at or after it, wrapping to the start of the ring.
//!
//! One ring is kept per service. It is rebuilt when the membership list
//! handed in is a different `Arc` than the one it was built from; a list
//! with equal contents but a new allocation still triggers a rebuild. The
//! new ring replaces the old one in a single map insert, so concurrent
//! readers see either the old or the new ring, never a partial one.

use dashmap::DashMap;
use md5::{Digest, Md5};
use rpc_api::RpcRequest;
use rpc_core::ServiceAddresses;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::load_balancer::LoadBalance;

/// Virtual nodes per endpoint unless configured otherwise
pub const DEFAULT_REPLICA_COUNT: usize = 160;

/// Consistent hash strategy keeping one ring per service
pub struct ConsistentHashLoadBalance {
    replica_count: usize,
    selectors: DashMap<String, Arc<ConsistentHashSelector>>,
}

impl Default for ConsistentHashLoadBalance {
    fn default() -> Self {
        Self::with_replicas(DEFAULT_REPLICA_COUNT)
    }
}

impl ConsistentHashLoadBalance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a strategy placing `replica_count` virtual nodes per endpoint
    pub fn with_replicas(replica_count: usize) -> Self {
        Self {
            replica_count,
            selectors: DashMap::new(),
        }
    }

    /// The ring currently used for a service
    pub fn selector(&self, service_name: &str) -> Option<Arc<ConsistentHashSelector>> {
        self.selectors.get(service_name).map(|s| Arc::clone(s.value()))
    }

    fn selector_for(
        &self,
        service_name: &str,
        addresses: &ServiceAddresses,
    ) -> Arc<ConsistentHashSelector> {
        if let Some(current) = self.selector(service_name) {
            if current.is_built_from(addresses) {
                return current;
            }
        }

        let selector = Arc::new(ConsistentHashSelector::new(
            Arc::clone(addresses),
            self.replica_count,
        ));
        debug!(
            "Rebuilt hash ring for {} with {} virtual nodes",
            service_name,
            selector.len()
        );
        self.selectors
            .insert(service_name.to_string(), Arc::clone(&selector));
        selector
    }
}

impl LoadBalance for ConsistentHashLoadBalance {
    fn do_select(&self, addresses: &ServiceAddresses, request: &RpcRequest) -> Option<String> {
        let service_name = request.rpc_service_name();
        let selector = self.selector_for(&service_name, addresses);
        selector
            .select(&request_key(&service_name, request))
            .map(str::to_string)
    }
}

/// Hash key of a request: service name followed by its parameters
pub fn request_key(service_name: &str, request: &RpcRequest) -> String {
    let parameters = serde_json::to_string(&request.parameters).unwrap_or_default();
    format!("{}{}", service_name, parameters)
}

/// One virtual-node ring, built from a single membership snapshot
#[derive(Debug)]
pub struct ConsistentHashSelector {
    virtual_invokers: BTreeMap<u32, String>,
    addresses: ServiceAddresses,
}

impl ConsistentHashSelector {
    pub fn new(addresses: ServiceAddresses, replica_count: usize) -> Self {
        let mut virtual_invokers = BTreeMap::new();

        for invoker in addresses.iter() {
            for i in 0..replica_count / 4 {
                let digest = md5(&format!("{}{}", invoker, i));
                for h in 0..4 {
                    virtual_invokers.insert(hash(&digest, h), invoker.clone());
                }
            }
        }

        Self {
            virtual_invokers,
            addresses,
        }
    }

    /// Whether this ring was built from exactly this list instance
    pub fn is_built_from(&self, addresses: &ServiceAddresses) -> bool {
        Arc::ptr_eq(&self.addresses, addresses)
    }

    /// Number of virtual nodes on the ring
    pub fn len(&self) -> usize {
        self.virtual_invokers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.virtual_invokers.is_empty()
    }

    /// Endpoint serving `key`
    pub fn select(&self, key: &str) -> Option<&str> {
        self.select_for_key(hash(&md5(key), 0))
    }

    /// Endpoint owning the first position at or after `hash`, wrapping around
    pub fn select_for_key(&self, hash: u32) -> Option<&str> {
        self.virtual_invokers
            .range(hash..)
            .next()
            .or_else(|| self.virtual_invokers.iter().next())
            .map(|(_, invoker)| invoker.as_str())
    }
}

fn md5(key: &str) -> [u8; 16] {
    let mut digest = [0u8; 16];
    digest.copy_from_slice(&Md5::digest(key.as_bytes()));
    digest
}

// Four little-endian 32-bit values per 128-bit digest
fn hash(digest: &[u8; 16], index: usize) -> u32 {
    let offset = index * 4;
    u32::from_le_bytes([
        digest[offset],
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ])
}
