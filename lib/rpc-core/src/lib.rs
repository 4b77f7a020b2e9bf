//! Core building blocks of the RPC control plane
//!
//! This library provides:
//! - Capability registry resolving named implementations of pluggable traits
//! - Message serializers exposed as a capability
//! - Endpoint address parsing
//! - Configuration, error taxonomy and tracing setup

pub mod config;
pub mod endpoint;
pub mod error;
pub mod extension;
pub mod serialize;
pub mod telemetry;

pub use config::RpcConfig;
pub use endpoint::{Endpoint, ServiceAddresses};
pub use error::{Result, RpcError};
pub use extension::{Capability, ExtensionLoader, ExtensionTable};
pub use serialize::Serializer;
