//! Engine configuration

use serde::{Deserialize, Serialize};

use idsync_connector::operation::{OperationOptions, ACCOUNT};

/// Propagation engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagationConfig {
    /// Object class identities are provisioned as.
    #[serde(default = "default_object_class")]
    pub object_class: String,

    /// Longer execution messages are truncated.
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,

    /// Attributes read back when probing for a remote object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes_to_get: Option<Vec<String>>,
}

fn default_object_class() -> String {
    ACCOUNT.to_string()
}

fn default_max_message_length() -> usize {
    4096
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            object_class: default_object_class(),
            max_message_length: default_max_message_length(),
            attributes_to_get: None,
        }
    }
}

impl PropagationConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the object class.
    #[must_use]
    pub fn with_object_class(mut self, object_class: impl Into<String>) -> Self {
        self.object_class = object_class.into();
        self
    }

    /// Set the maximum execution message length.
    #[must_use]
    pub fn with_max_message_length(mut self, max: usize) -> Self {
        self.max_message_length = max;
        self
    }

    /// Restrict the attributes read when probing.
    #[must_use]
    pub fn with_attributes_to_get(mut self, names: Vec<String>) -> Self {
        self.attributes_to_get = Some(names);
        self
    }

    /// Options used for connector calls.
    pub fn operation_options(&self) -> OperationOptions {
        match &self.attributes_to_get {
            Some(names) => OperationOptions::new().with_attributes_to_get(names.clone()),
            None => OperationOptions::new(),
        }
    }
}
