use thiserror::Error;

pub type Result<T> = std::result::Result<T, RpcError>;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No such extension {name} for capability {capability}")]
    ExtensionNotFound { capability: String, name: String },

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Coordination session unavailable: {0}")]
    SessionUnavailable(String),

    #[error("Failed to register {path}: {reason}")]
    RegistrationFailure { path: String, reason: String },

    #[error("Failed to watch {path}: {reason}")]
    WatchFailure { path: String, reason: String },

    #[error("Invalid endpoint address: {0}")]
    InvalidAddress(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Frame error: {0}")]
    Frame(#[from] rpc_api::FrameError),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
