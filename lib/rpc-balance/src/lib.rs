//! Routing strategies
//!
//! Each strategy maps a service's membership list and a request to one
//! endpoint. Strategies are resolved by name through the capability
//! registry; [`register_builtin`] makes `random`, `roundRobin`,
//! `consistentHash` and the default `loadBalance` available.
pub mod consistent_hash;
pub mod load_balancer;
pub mod random;
pub mod round_robin;

pub use consistent_hash::{ConsistentHashLoadBalance, ConsistentHashSelector};
pub use load_balancer::{register_builtin, LoadBalance};
pub use random::RandomLoadBalance;
pub use round_robin::RoundRobinLoadBalance;
