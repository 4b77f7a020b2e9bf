use serde::{Deserialize, Serialize};
use std::fmt;

/// ServiceIdentity names a logical service: interface + group + version.
///
/// The concatenated form is the key used both when a provider publishes an
/// endpoint and when a consumer discovers one, so two identities with the
/// same triple always share an endpoint set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceIdentity {
    /// Fully-qualified interface name
    pub interface_name: String,

    /// Service group, empty when unused
    #[serde(default)]
    pub group: String,

    /// Service version, empty when unused
    #[serde(default)]
    pub version: String,
}

impl ServiceIdentity {
    /// Create a new service identity
    pub fn new(
        interface_name: impl Into<String>,
        group: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            interface_name: interface_name.into(),
            group: group.into(),
            version: version.into(),
        }
    }

    /// The registration and discovery key for this service
    pub fn service_name(&self) -> String {
        format!("{}{}{}", self.interface_name, self.group, self.version)
    }
}

impl fmt::Display for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.service_name())
    }
}
