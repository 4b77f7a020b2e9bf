//! Embedded coordination service
//!
//! `InMemoryCoordinator` keeps the namespace in process. It backs the
//! daemon when no external coordinator is configured and lets tests drive
//! membership changes, outages and session loss deterministically.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::coordination::{
    ChildWatch, ChildrenChanged, CoordinationClient, CoordinationError, Connector, SessionState,
};

/// In-process hierarchical namespace with child watches
#[derive(Default)]
pub struct InMemoryCoordinator {
    nodes: RwLock<BTreeSet<String>>,
    watchers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<ChildrenChanged>>>>,
    unreachable: AtomicBool,
    children_fetches: AtomicUsize,
}

impl InMemoryCoordinator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Open a client session on this namespace
    pub fn session(self: &Arc<Self>) -> Arc<InMemorySession> {
        Arc::new(InMemorySession {
            coordinator: Arc::clone(self),
            state: AtomicU8::new(STARTED),
        })
    }

    /// Simulate an outage: every operation fails with a connection loss
    pub fn set_reachable(&self, reachable: bool) {
        self.unreachable.store(!reachable, Ordering::SeqCst);
    }

    pub fn is_reachable(&self) -> bool {
        !self.unreachable.load(Ordering::SeqCst)
    }

    /// Number of child listings served
    pub fn children_fetches(&self) -> usize {
        self.children_fetches.load(Ordering::SeqCst)
    }

    /// Every node path, sorted
    pub async fn paths(&self) -> Vec<String> {
        self.nodes.read().await.iter().cloned().collect()
    }

    fn check_reachable(&self) -> Result<(), CoordinationError> {
        if self.is_reachable() {
            Ok(())
        } else {
            Err(CoordinationError::ConnectionLoss("coordinator unreachable".to_string()))
        }
    }

    async fn exists(&self, path: &str) -> Result<bool, CoordinationError> {
        self.check_reachable()?;
        Ok(self.nodes.read().await.contains(path))
    }

    async fn create_persistent(&self, path: &str) -> Result<(), CoordinationError> {
        self.check_reachable()?;
        validate_path(path)?;

        let mut created = Vec::new();
        {
            let mut nodes = self.nodes.write().await;
            if nodes.contains(path) {
                return Err(CoordinationError::NodeExists(path.to_string()));
            }
            for (i, _) in path.match_indices('/').skip(1) {
                let parent = &path[..i];
                if nodes.insert(parent.to_string()) {
                    created.push(parent.to_string());
                }
            }
            nodes.insert(path.to_string());
            created.push(path.to_string());
        }

        debug!("Created node {}", path);
        for node in created {
            self.notify_parent_of(&node).await;
        }
        Ok(())
    }

    async fn get_children(&self, path: &str) -> Result<Vec<String>, CoordinationError> {
        self.check_reachable()?;
        self.children_fetches.fetch_add(1, Ordering::SeqCst);

        let nodes = self.nodes.read().await;
        if !nodes.contains(path) {
            return Err(CoordinationError::NoNode(path.to_string()));
        }
        Ok(children_of(&nodes, path))
    }

    async fn delete(&self, path: &str) -> Result<(), CoordinationError> {
        self.check_reachable()?;
        {
            let mut nodes = self.nodes.write().await;
            if !nodes.contains(path) {
                return Err(CoordinationError::NoNode(path.to_string()));
            }
            if !children_of(&nodes, path).is_empty() {
                return Err(CoordinationError::NotEmpty(path.to_string()));
            }
            nodes.remove(path);
        }

        debug!("Deleted node {}", path);
        self.notify_parent_of(path).await;
        Ok(())
    }

    fn watch_children(&self, path: &str) -> Result<ChildWatch, CoordinationError> {
        self.check_reachable()?;
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut watchers) = self.watchers.lock() {
            watchers.entry(path.to_string()).or_default().push(tx);
        }
        Ok(rx)
    }

    async fn notify_parent_of(&self, path: &str) {
        let parent = match path.rfind('/') {
            Some(0) | None => return,
            Some(i) => &path[..i],
        };

        let children = children_of(&*self.nodes.read().await, parent);
        if let Ok(mut watchers) = self.watchers.lock() {
            if let Some(senders) = watchers.get_mut(parent) {
                let event = ChildrenChanged {
                    path: parent.to_string(),
                    children,
                };
                senders.retain(|tx| tx.send(event.clone()).is_ok());
            }
        }
    }
}

fn validate_path(path: &str) -> Result<(), CoordinationError> {
    if !path.starts_with('/') || path.ends_with('/') || path.contains("//") {
        return Err(CoordinationError::NoNode(path.to_string()));
    }
    Ok(())
}

fn children_of(nodes: &BTreeSet<String>, path: &str) -> Vec<String> {
    let prefix = format!("{}/", path);
    nodes
        .range(prefix.clone()..)
        .take_while(|node| node.starts_with(&prefix))
        .map(|node| &node[prefix.len()..])
        .filter(|rest| !rest.contains('/'))
        .map(str::to_string)
        .collect()
}

const LATENT: u8 = 0;
const STARTED: u8 = 1;
const STOPPED: u8 = 2;

/// Client session on an [`InMemoryCoordinator`]
pub struct InMemorySession {
    coordinator: Arc<InMemoryCoordinator>,
    state: AtomicU8,
}

impl InMemorySession {
    /// Close the session; it reports `Stopped` from now on
    pub fn close(&self) {
        self.state.store(STOPPED, Ordering::SeqCst);
    }

    fn check_open(&self) -> Result<(), CoordinationError> {
        match self.state() {
            SessionState::Started => Ok(()),
            _ => Err(CoordinationError::SessionClosed),
        }
    }
}

#[async_trait]
impl CoordinationClient for InMemorySession {
    fn state(&self) -> SessionState {
        match self.state.load(Ordering::SeqCst) {
            LATENT => SessionState::Latent,
            STARTED => SessionState::Started,
            _ => SessionState::Stopped,
        }
    }

    async fn block_until_connected(&self, timeout: Duration) -> bool {
        if self.state() == SessionState::Started && self.coordinator.is_reachable() {
            return true;
        }
        tokio::time::sleep(timeout).await;
        self.state() == SessionState::Started && self.coordinator.is_reachable()
    }

    async fn exists(&self, path: &str) -> Result<bool, CoordinationError> {
        self.check_open()?;
        self.coordinator.exists(path).await
    }

    async fn create_persistent(&self, path: &str) -> Result<(), CoordinationError> {
        self.check_open()?;
        self.coordinator.create_persistent(path).await
    }

    async fn get_children(&self, path: &str) -> Result<Vec<String>, CoordinationError> {
        self.check_open()?;
        self.coordinator.get_children(path).await
    }

    async fn delete(&self, path: &str) -> Result<(), CoordinationError> {
        self.check_open()?;
        self.coordinator.delete(path).await
    }

    async fn watch_children(&self, path: &str) -> Result<ChildWatch, CoordinationError> {
        self.check_open()?;
        self.coordinator.watch_children(path)
    }
}

/// Connector handing out sessions on one embedded coordinator
pub struct InMemoryConnector {
    coordinator: Arc<InMemoryCoordinator>,
    failures_remaining: AtomicU32,
    attempts: AtomicU32,
    sessions: Mutex<Vec<Arc<InMemorySession>>>,
}

impl InMemoryConnector {
    pub fn new(coordinator: Arc<InMemoryCoordinator>) -> Self {
        Self {
            coordinator,
            failures_remaining: AtomicU32::new(0),
            attempts: AtomicU32::new(0),
            sessions: Mutex::new(Vec::new()),
        }
    }

    /// Make the next `count` connection attempts fail
    pub fn fail_next(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Connection attempts made so far
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Sessions opened so far
    pub fn session_count(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Most recently opened session
    pub fn last_session(&self) -> Option<Arc<InMemorySession>> {
        self.sessions.lock().ok().and_then(|s| s.last().cloned())
    }
}

#[async_trait]
impl Connector for InMemoryConnector {
    async fn connect(&self, address: &str) -> Result<Arc<dyn CoordinationClient>, CoordinationError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(CoordinationError::ConnectionLoss(format!(
                "connection to {} refused",
                address
            )));
        }

        let session = self.coordinator.session();
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.push(Arc::clone(&session));
        }
        debug!("Opened embedded coordinator session for {}", address);
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_makes_parents() {
        let coordinator = InMemoryCoordinator::new();
        let session = coordinator.session();
        session
            .create_persistent("/my-rpc/OrderServicev1/10.0.0.1:8080")
            .await
            .unwrap();

        assert_eq!(
            coordinator.paths().await,
            vec![
                "/my-rpc",
                "/my-rpc/OrderServicev1",
                "/my-rpc/OrderServicev1/10.0.0.1:8080"
            ]
        );
        assert_eq!(
            session.get_children("/my-rpc/OrderServicev1").await.unwrap(),
            vec!["10.0.0.1:8080"]
        );
        assert!(matches!(
            session.create_persistent("/my-rpc/OrderServicev1/10.0.0.1:8080").await,
            Err(CoordinationError::NodeExists(_))
        ));
    }

    #[tokio::test]
    async fn test_children_are_direct_only() {
        let coordinator = InMemoryCoordinator::new();
        let session = coordinator.session();
        session.create_persistent("/a/b/c").await.unwrap();
        session.create_persistent("/a/bb").await.unwrap();

        assert_eq!(session.get_children("/a").await.unwrap(), vec!["b", "bb"]);
        assert!(matches!(
            session.get_children("/missing").await,
            Err(CoordinationError::NoNode(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_rules() {
        let coordinator = InMemoryCoordinator::new();
        let session = coordinator.session();
        session.create_persistent("/a/b").await.unwrap();

        assert!(matches!(session.delete("/a").await, Err(CoordinationError::NotEmpty(_))));
        session.delete("/a/b").await.unwrap();
        assert!(matches!(session.delete("/a/b").await, Err(CoordinationError::NoNode(_))));
        assert!(!session.exists("/a/b").await.unwrap());
    }

    #[tokio::test]
    async fn test_watch_reports_child_changes() {
        let coordinator = InMemoryCoordinator::new();
        let session = coordinator.session();
        session.create_persistent("/svc").await.unwrap();

        let mut watch = session.watch_children("/svc").await.unwrap();
        session.create_persistent("/svc/a:1").await.unwrap();
        session.create_persistent("/svc/b:2").await.unwrap();
        session.delete("/svc/a:1").await.unwrap();

        assert_eq!(watch.recv().await.unwrap().children, vec!["a:1"]);
        assert_eq!(watch.recv().await.unwrap().children, vec!["a:1", "b:2"]);
        assert_eq!(watch.recv().await.unwrap().children, vec!["b:2"]);
    }

    #[tokio::test]
    async fn test_outage_and_closed_session() {
        let coordinator = InMemoryCoordinator::new();
        let session = coordinator.session();

        coordinator.set_reachable(false);
        assert!(matches!(
            session.exists("/a").await,
            Err(CoordinationError::ConnectionLoss(_))
        ));
        assert!(!session.block_until_connected(Duration::from_millis(5)).await);

        coordinator.set_reachable(true);
        session.close();
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(matches!(session.exists("/a").await, Err(CoordinationError::SessionClosed)));
    }

    #[tokio::test]
    async fn test_connector_failures() {
        let connector = InMemoryConnector::new(InMemoryCoordinator::new());
        connector.fail_next(1);

        assert!(connector.connect("127.0.0.1:2181").await.is_err());
        assert!(connector.connect("127.0.0.1:2181").await.is_ok());
        assert_eq!(connector.attempts(), 2);
        assert_eq!(connector.session_count(), 1);
    }
}
