//! Framework configuration
//!
//! Loaded from a YAML document; every field has a default so an empty
//! document (or no document at all) yields a usable configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::{Result, RpcError};

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "RPC_CONFIG";
/// Environment variable overriding the coordinator address
pub const COORDINATOR_ADDRESS_ENV: &str = "RPC_COORDINATOR_ADDRESS";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub extensions: ExtensionConfig,
    #[serde(default)]
    pub load_balance: LoadBalanceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Coordination service connection settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Connect string of the coordination service
    #[serde(default = "default_coordinator_address")]
    pub address: String,

    /// Namespace root under which services are published
    #[serde(default = "default_root_path")]
    pub root_path: String,

    /// How long startup waits for the session to connect
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Backoff used while opening the session
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            address: default_coordinator_address(),
            root_path: default_root_path(),
            connect_timeout_secs: default_connect_timeout(),
            retry: RetryPolicy::default(),
        }
    }
}

impl CoordinatorConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn default_coordinator_address() -> String {
    "127.0.0.1:2181".to_string()
}
fn default_root_path() -> String {
    "/my-rpc".to_string()
}
fn default_connect_timeout() -> u64 {
    30
}

/// Bounded exponential backoff
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Sleep before the first retry
    #[serde(default = "default_base_sleep")]
    pub base_sleep_ms: u64,

    /// Maximum number of retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Upper bound for a single sleep
    #[serde(default = "default_max_sleep")]
    pub max_sleep_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_sleep_ms: default_base_sleep(),
            max_retries: default_max_retries(),
            max_sleep_ms: default_max_sleep(),
        }
    }
}

impl RetryPolicy {
    /// Calculate backoff duration for the given retry count
    pub fn backoff_duration(&self, retry_count: u32) -> Duration {
        let exponential = 2u64.saturating_pow(retry_count);
        let backoff_ms = self
            .base_sleep_ms
            .saturating_mul(exponential)
            .min(self.max_sleep_ms);
        Duration::from_millis(backoff_ms)
    }
}

fn default_base_sleep() -> u64 {
    1000
}
fn default_max_retries() -> u32 {
    3
}
fn default_max_sleep() -> u64 {
    30_000
}

/// Capability selection and resource search path
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtensionConfig {
    /// Extra directories scanned for `META-INF/extensions/<capability>` files
    #[serde(default)]
    pub search_path: Vec<PathBuf>,

    /// Routing strategy extension name
    #[serde(default = "default_load_balance")]
    pub load_balance: String,

    /// Serializer extension name
    #[serde(default = "default_serializer")]
    pub serializer: String,

    /// Service registry extension name
    #[serde(default = "default_registry")]
    pub registry: String,
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            search_path: Vec::new(),
            load_balance: default_load_balance(),
            serializer: default_serializer(),
            registry: default_registry(),
        }
    }
}

fn default_load_balance() -> String {
    "loadBalance".to_string()
}
fn default_serializer() -> String {
    "json".to_string()
}
fn default_registry() -> String {
    "zk".to_string()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoadBalanceConfig {
    /// Virtual nodes per endpoint on the consistent hash ring
    #[serde(default = "default_replica_count")]
    pub replica_count: usize,
}

impl Default for LoadBalanceConfig {
    fn default() -> Self {
        Self {
            replica_count: default_replica_count(),
        }
    }
}

fn default_replica_count() -> usize {
    160
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl RpcConfig {
    /// Parse a YAML document
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: RpcConfig = if text.trim().is_empty() {
            RpcConfig::default()
        } else {
            serde_yaml::from_str(text)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&text)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load from the file named by `RPC_CONFIG`, then apply environment overrides
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::load(path)?,
            Err(_) => {
                debug!("{} not set, using default configuration", CONFIG_PATH_ENV);
                RpcConfig::default()
            }
        };

        if let Ok(address) = std::env::var(COORDINATOR_ADDRESS_ENV) {
            debug!("Coordinator address overridden to {}", address);
            config.coordinator.address = address;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the framework cannot run with
    pub fn validate(&self) -> Result<()> {
        if !self.coordinator.root_path.starts_with('/') {
            return Err(RpcError::Configuration(format!(
                "root path must be absolute: {}",
                self.coordinator.root_path
            )));
        }

        for (key, value) in [
            ("extensions.load_balance", &self.extensions.load_balance),
            ("extensions.serializer", &self.extensions.serializer),
            ("extensions.registry", &self.extensions.registry),
        ] {
            if value.trim().is_empty() {
                return Err(RpcError::Configuration(format!("{} must not be blank", key)));
            }
        }

        let replicas = self.load_balance.replica_count;
        if replicas == 0 || replicas % 4 != 0 {
            return Err(RpcError::Configuration(format!(
                "replica count must be a positive multiple of 4, got {}",
                replicas
            )));
        }

        Ok(())
    }
}
