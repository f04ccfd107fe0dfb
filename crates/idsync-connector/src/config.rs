//! Connector instance configuration
//!
//! Describes one configured connector instance: which bundle implements it,
//! which capabilities it declares and its connector-specific properties.

use serde::{Deserialize, Serialize};

use crate::capability::{Capability, CapabilitySet};
use crate::error::{ConnectorError, ConnectorResult};

/// Configuration of one connector instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorInstanceConfig {
    /// Unique instance name, referenced by resources.
    pub name: String,

    /// Human readable name.
    #[serde(default)]
    pub display_name: String,

    /// Bundle providing the implementation.
    #[serde(default)]
    pub bundle_name: String,

    /// Bundle version.
    #[serde(default)]
    pub version: String,

    /// Connector class inside the bundle.
    #[serde(default)]
    pub connector_name: String,

    /// Declared capabilities.
    #[serde(default)]
    pub capabilities: CapabilitySet,

    /// Connector-specific properties.
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl ConnectorInstanceConfig {
    /// Create a configuration without capabilities.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            bundle_name: String::new(),
            version: String::new(),
            connector_name: String::new(),
            capabilities: CapabilitySet::new(),
            properties: serde_json::Map::new(),
        }
    }

    /// Load a configuration from JSON.
    pub fn from_json(json: &str) -> ConnectorResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            ConnectorError::InvalidConfiguration {
                message: format!("malformed connector instance: {e}"),
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Set the declared capabilities.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Declare one more capability.
    #[must_use]
    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    /// Set a connector property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ConnectorResult<()> {
        if self.name.trim().is_empty() {
            return Err(ConnectorError::InvalidConfiguration {
                message: "connector instance name is required".to_string(),
            });
        }
        Ok(())
    }
}
