//! Boundary to the coordination service
//!
//! The coordination service is a hierarchical namespace (ZooKeeper-like)
//! with persistent nodes, child listing, deletion and child-change watches.
//! Everything the framework needs from it goes through [`CoordinationClient`];
//! sessions are opened by a [`Connector`].

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinationError {
    #[error("Node already exists: {0}")]
    NodeExists(String),

    #[error("No such node: {0}")]
    NoNode(String),

    #[error("Node has children: {0}")]
    NotEmpty(String),

    #[error("Connection lost: {0}")]
    ConnectionLoss(String),

    #[error("Session closed")]
    SessionClosed,
}

/// Lifecycle of a client session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Created but not started
    Latent,
    /// Usable
    Started,
    /// Closed; a new session is needed
    Stopped,
}

/// Children of a watched node after a change
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChildrenChanged {
    pub path: String,
    pub children: Vec<String>,
}

/// Stream of child-change notifications for one path
pub type ChildWatch = mpsc::UnboundedReceiver<ChildrenChanged>;

/// A session with the coordination service
#[async_trait]
pub trait CoordinationClient: Send + Sync {
    fn state(&self) -> SessionState;

    /// Wait until the session is connected; `false` when `timeout` elapses first
    async fn block_until_connected(&self, timeout: Duration) -> bool;

    async fn exists(&self, path: &str) -> Result<bool, CoordinationError>;

    /// Create a persistent node, creating missing parents
    async fn create_persistent(&self, path: &str) -> Result<(), CoordinationError>;

    async fn get_children(&self, path: &str) -> Result<Vec<String>, CoordinationError>;

    async fn delete(&self, path: &str) -> Result<(), CoordinationError>;

    /// Subscribe to changes of the children of `path`
    async fn watch_children(&self, path: &str) -> Result<ChildWatch, CoordinationError>;
}

/// Opens sessions against a coordination service connect string
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, address: &str) -> Result<Arc<dyn CoordinationClient>, CoordinationError>;
}
