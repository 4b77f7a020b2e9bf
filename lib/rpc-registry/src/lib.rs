//! Service registration and discovery over a coordination service
//!
//! Providers publish `host:port` nodes under `{root}/{service}`; consumers
//! list, cache and watch those nodes and pick one member per call with a
//! load balancing strategy.
pub mod context;
pub mod coordination;
pub mod discovery;
pub mod memory;
pub mod metrics;
pub mod provider;
pub mod registry;
pub mod session;
pub mod store;

pub use context::RpcContext;
pub use coordination::{
    ChildWatch, ChildrenChanged, CoordinationClient, CoordinationError, Connector, SessionState,
};
pub use discovery::{ServiceDiscovery, ZkServiceDiscovery};
pub use memory::{InMemoryConnector, InMemoryCoordinator, InMemorySession};
pub use metrics::ControlPlaneMetrics;
pub use provider::{ServiceObject, ServiceProvider};
pub use registry::{ServiceRegistry, ZkServiceRegistry};
pub use session::SessionManager;
pub use store::{ClearReport, MembershipStore};
