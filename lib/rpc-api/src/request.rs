use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identity::ServiceIdentity;

/// RpcRequest describes one remote call
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcRequest {
    /// Unique id of this call
    pub request_id: String,

    /// Interface the caller wants to invoke
    pub interface_name: String,

    /// Method on that interface
    pub method_name: String,

    /// Actual argument values
    #[serde(default)]
    pub parameters: Vec<Value>,

    /// Declared argument types, parallel to `parameters`
    #[serde(default)]
    pub param_types: Vec<String>,

    /// Service group
    #[serde(default)]
    pub group: String,

    /// Service version
    #[serde(default)]
    pub version: String,
}

impl RpcRequest {
    /// Create a request for a method on the given service, with a fresh request id
    pub fn new(identity: &ServiceIdentity, method_name: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            interface_name: identity.interface_name.clone(),
            method_name: method_name.into(),
            parameters: Vec::new(),
            param_types: Vec::new(),
            group: identity.group.clone(),
            version: identity.version.clone(),
        }
    }

    /// Append an argument with its declared type
    pub fn with_parameter(mut self, param_type: impl Into<String>, value: Value) -> Self {
        self.param_types.push(param_type.into());
        self.parameters.push(value);
        self
    }

    /// The identity of the service this request targets
    pub fn identity(&self) -> ServiceIdentity {
        ServiceIdentity::new(
            self.interface_name.clone(),
            self.group.clone(),
            self.version.clone(),
        )
    }

    /// The discovery key of the target service
    pub fn rpc_service_name(&self) -> String {
        self.identity().service_name()
    }
}
