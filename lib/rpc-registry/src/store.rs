//! Membership store
//!
//! Providers publish themselves as persistent nodes at
//! `{root}/{service}/{host:port}`. Consumers read the children of
//! `{root}/{service}` once, cache the list and keep it current through a
//! child watch. Every cache update stores a freshly allocated list so
//! strategies keyed on list identity notice the change.

use dashmap::{DashMap, DashSet};
use futures::stream::{self, StreamExt};
use rpc_core::config::CoordinatorConfig;
use rpc_core::{Endpoint, Result, RpcError, ServiceAddresses};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::coordination::{CoordinationClient, CoordinationError, Connector};
use crate::metrics::ControlPlaneMetrics;
use crate::session::SessionManager;

/// Concurrent deletions issued by [`MembershipStore::clear_all`]
const CLEAR_CONCURRENCY: usize = 16;

/// Outcome of a shutdown cleanup
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClearReport {
    pub deleted: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl ClearReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct MembershipStore {
    session: SessionManager,
    root_path: String,
    service_addresses: Arc<DashMap<String, ServiceAddresses>>,
    registered_paths: DashSet<String>,
    watched: DashSet<String>,
    metrics: ControlPlaneMetrics,
}

impl MembershipStore {
    pub fn new(
        connector: Arc<dyn Connector>,
        config: &CoordinatorConfig,
        metrics: ControlPlaneMetrics,
    ) -> Self {
        Self {
            session: SessionManager::new(connector, config),
            root_path: config.root_path.trim_end_matches('/').to_string(),
            service_addresses: Arc::new(DashMap::new()),
            registered_paths: DashSet::new(),
            watched: DashSet::new(),
            metrics,
        }
    }

    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    /// Path holding the members of a service
    pub fn service_path(&self, service_name: &str) -> String {
        format!("{}/{}", self.root_path, service_name)
    }

    /// Path of one member of a service
    pub fn member_path(&self, service_name: &str, address: &Endpoint) -> String {
        format!("{}/{}", self.service_path(service_name), address)
    }

    /// Open the coordinator session. Failure here is fatal to startup.
    pub async fn connect(&self) -> Result<()> {
        self.session.client().await.map(|_| ())
    }

    /// Create a persistent node (and its parents) unless it already exists.
    ///
    /// Errors are logged before being returned.
    pub async fn ensure_node(&self, path: &str) -> Result<()> {
        if self.registered_paths.contains(path) {
            info!("The node already exists. The node is:[{}]", path);
            return Ok(());
        }

        let outcome = match self.session.client().await {
            Ok(client) => Self::create_if_missing(&*client, path).await,
            Err(e) => Err(e.to_string()),
        };

        match outcome {
            Ok(()) => {
                self.registered_paths.insert(path.to_string());
                self.metrics.registrations_total.with_label_values(&["ok"]).inc();
                Ok(())
            }
            Err(reason) => {
                let failure = RpcError::RegistrationFailure {
                    path: path.to_string(),
                    reason,
                };
                error!("{}", failure);
                self.metrics.registrations_total.with_label_values(&["failed"]).inc();
                Err(failure)
            }
        }
    }

    async fn create_if_missing(
        client: &dyn CoordinationClient,
        path: &str,
    ) -> std::result::Result<(), String> {
        match client.exists(path).await {
            Ok(true) => {
                info!("The node already exists. The node is:[{}]", path);
                Ok(())
            }
            Ok(false) => match client.create_persistent(path).await {
                Ok(()) => {
                    info!("The node was created successfully. The node is:[{}]", path);
                    Ok(())
                }
                Err(CoordinationError::NodeExists(_)) => {
                    info!("The node already exists. The node is:[{}]", path);
                    Ok(())
                }
                Err(e) => Err(e.to_string()),
            },
            Err(e) => Err(e.to_string()),
        }
    }

    /// Current members of a service.
    ///
    /// Served from the cache when present; otherwise fetched from the
    /// coordinator, cached and watched. A fetch never replaces a list that
    /// another caller or the watch stored in the meantime. When the watch
    /// cannot be registered the fetched list is returned but not kept, so the
    /// next call fetches and tries to watch again. Any failure is logged and
    /// yields `None`.
    pub async fn list_children(&self, service_name: &str) -> Option<ServiceAddresses> {
        if let Some(cached) = self.service_addresses.get(service_name) {
            self.metrics.address_cache_hits_total.inc();
            return Some(Arc::clone(cached.value()));
        }
        self.metrics.address_cache_misses_total.inc();

        let path = self.service_path(service_name);
        let client = match self.session.client().await {
            Ok(client) => client,
            Err(e) => {
                error!("get children nodes for path [{}] fail: {}", path, e);
                return None;
            }
        };

        match client.get_children(&path).await {
            Ok(children) => {
                let addresses = Arc::clone(
                    self.service_addresses
                        .entry(service_name.to_string())
                        .or_insert_with(|| Arc::new(children))
                        .value(),
                );
                if !self.register_watcher(&*client, service_name, &path).await {
                    self.service_addresses
                        .remove_if(service_name, |_, cached| Arc::ptr_eq(cached, &addresses));
                }
                Some(addresses)
            }
            Err(e) => {
                error!("get children nodes for path [{}] fail: {}", path, e);
                None
            }
        }
    }

    // true when a watch is in place for the service afterwards
    async fn register_watcher(
        &self,
        client: &dyn CoordinationClient,
        service_name: &str,
        path: &str,
    ) -> bool {
        if !self.watched.insert(service_name.to_string()) {
            return true;
        }

        match client.watch_children(path).await {
            Ok(mut events) => {
                let cache = Arc::clone(&self.service_addresses);
                let metrics = self.metrics.clone();
                let service_name = service_name.to_string();

                tokio::spawn(async move {
                    while let Some(event) = events.recv().await {
                        debug!(
                            "Members of {} changed: {:?}",
                            event.path, event.children
                        );
                        cache.insert(service_name.clone(), Arc::new(event.children));
                        metrics.watch_events_total.inc();
                    }
                    debug!("Watch on {} ended", service_name);
                });
                true
            }
            Err(e) => {
                self.watched.remove(service_name);
                let failure = RpcError::WatchFailure {
                    path: path.to_string(),
                    reason: e.to_string(),
                };
                error!("{}", failure);
                false
            }
        }
    }

    /// The cached list of a service without touching the coordinator
    pub fn cached(&self, service_name: &str) -> Option<ServiceAddresses> {
        self.service_addresses
            .get(service_name)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Paths this process has registered and not yet removed
    pub fn registered_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.registered_paths.iter().map(|p| p.key().clone()).collect();
        paths.sort();
        paths
    }

    /// Delete every registered node whose last segment is `address`.
    ///
    /// Deletions run concurrently; individual failures are logged and
    /// reported without stopping the others. A node already gone counts as
    /// deleted.
    pub async fn clear_all(&self, address: &Endpoint) -> ClearReport {
        let suffix = format!("/{}", address);
        let targets: Vec<String> = self
            .registered_paths
            .iter()
            .map(|p| p.key().clone())
            .filter(|p| p.ends_with(&suffix))
            .collect();

        let mut report = ClearReport::default();
        if targets.is_empty() {
            return report;
        }

        let client = match self.session.client().await {
            Ok(client) => client,
            Err(e) => {
                error!("clear registry for {} fail: {}", address, e);
                report.failed = targets.into_iter().map(|p| (p, e.to_string())).collect();
                return report;
            }
        };

        let outcomes: Vec<_> = stream::iter(targets)
            .map(|path| {
                let client = Arc::clone(&client);
                async move {
                    let outcome = client.delete(&path).await;
                    (path, outcome)
                }
            })
            .buffer_unordered(CLEAR_CONCURRENCY)
            .collect()
            .await;

        for (path, outcome) in outcomes {
            match outcome {
                Ok(()) | Err(CoordinationError::NoNode(_)) => {
                    self.registered_paths.remove(&path);
                    self.metrics.deregistrations_total.inc();
                    report.deleted.push(path);
                }
                Err(e) => {
                    error!("clear registry for path [{}] fail: {}", path, e);
                    report.failed.push((path, e.to_string()));
                }
            }
        }

        report.deleted.sort();
        info!(
            "All registered services on the server are cleared: {:?}",
            report.deleted
        );
        report
    }
}
