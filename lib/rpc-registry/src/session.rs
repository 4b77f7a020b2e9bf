//! Lazily created, shared coordinator session

use rpc_core::config::{CoordinatorConfig, RetryPolicy};
use rpc_core::{Result, RpcError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::coordination::{CoordinationClient, Connector, SessionState};

/// Owns the single session used by the membership store.
///
/// The session is opened on first use and reopened whenever the current one
/// is no longer `Started`. Callers racing on a fresh manager share one
/// session.
pub struct SessionManager {
    connector: Arc<dyn Connector>,
    address: String,
    retry: RetryPolicy,
    connect_timeout: Duration,
    client: Mutex<Option<Arc<dyn CoordinationClient>>>,
}

impl SessionManager {
    pub fn new(connector: Arc<dyn Connector>, config: &CoordinatorConfig) -> Self {
        Self {
            connector,
            address: config.address.clone(),
            retry: config.retry.clone(),
            connect_timeout: config.connect_timeout(),
            client: Mutex::new(None),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// The current session, opening a new one when needed
    pub async fn client(&self) -> Result<Arc<dyn CoordinationClient>> {
        let mut slot = self.client.lock().await;

        if let Some(client) = slot.as_ref() {
            match client.state() {
                SessionState::Started => return Ok(Arc::clone(client)),
                state => warn!(
                    "Coordinator session is {:?}, reconnecting to {}",
                    state, self.address
                ),
            }
        }

        let client = self.establish().await?;
        *slot = Some(Arc::clone(&client));
        Ok(client)
    }

    async fn establish(&self) -> Result<Arc<dyn CoordinationClient>> {
        let mut retry_count = 0;

        let client = loop {
            let failure = match tokio::time::timeout(
                self.connect_timeout,
                self.connector.connect(&self.address),
            )
            .await
            {
                Ok(Ok(client)) => break client,
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("no answer within {:?}", self.connect_timeout),
            };

            if retry_count >= self.retry.max_retries {
                error!(
                    "Giving up on coordinator {} after {} attempts: {}",
                    self.address,
                    retry_count + 1,
                    failure
                );
                return Err(RpcError::SessionUnavailable(format!(
                    "{}: {}",
                    self.address, failure
                )));
            }

            let backoff = self.retry.backoff_duration(retry_count);
            warn!(
                "Connecting to coordinator {} failed ({}), retry {} in {:?}",
                self.address,
                failure,
                retry_count + 1,
                backoff
            );
            tokio::time::sleep(backoff).await;
            retry_count += 1;
        };

        if !client.block_until_connected(self.connect_timeout).await {
            error!(
                "Coordinator session to {} not connected within {:?}",
                self.address, self.connect_timeout
            );
            return Err(RpcError::SessionUnavailable(format!(
                "{}: not connected within {:?}",
                self.address, self.connect_timeout
            )));
        }

        info!("Connected to coordinator at {}", self.address);
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryConnector, InMemoryCoordinator};

    fn config() -> CoordinatorConfig {
        CoordinatorConfig {
            connect_timeout_secs: 1,
            retry: RetryPolicy {
                base_sleep_ms: 1,
                max_retries: 3,
                max_sleep_ms: 4,
            },
            ..CoordinatorConfig::default()
        }
    }

    fn manager(connector: &Arc<InMemoryConnector>) -> SessionManager {
        SessionManager::new(Arc::clone(connector) as Arc<dyn Connector>, &config())
    }

    #[tokio::test]
    async fn test_session_is_reused() {
        let connector = Arc::new(InMemoryConnector::new(InMemoryCoordinator::new()));
        let sessions = manager(&connector);

        let first = sessions.client().await.unwrap();
        let second = sessions.client().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(connector.session_count(), 1);
    }

    #[tokio::test]
    async fn test_retries_until_connected() {
        let connector = Arc::new(InMemoryConnector::new(InMemoryCoordinator::new()));
        connector.fail_next(2);

        manager(&connector).client().await.unwrap();
        assert_eq!(connector.attempts(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let connector = Arc::new(InMemoryConnector::new(InMemoryCoordinator::new()));
        connector.fail_next(10);

        let result = manager(&connector).client().await;
        assert!(matches!(result, Err(RpcError::SessionUnavailable(_))));
        assert_eq!(connector.attempts(), 4);
    }

    #[tokio::test]
    async fn test_stopped_session_is_replaced() {
        let connector = Arc::new(InMemoryConnector::new(InMemoryCoordinator::new()));
        let sessions = manager(&connector);

        sessions.client().await.unwrap();
        connector.last_session().unwrap().close();

        let replacement = sessions.client().await.unwrap();
        assert_eq!(replacement.state(), SessionState::Started);
        assert_eq!(connector.session_count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_first_use_opens_one_session() {
        let connector = Arc::new(InMemoryConnector::new(InMemoryCoordinator::new()));
        let sessions = Arc::new(manager(&connector));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sessions = Arc::clone(&sessions);
                tokio::spawn(async move { sessions.client().await.is_ok() })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap());
        }
        assert_eq!(connector.session_count(), 1);
    }
}
