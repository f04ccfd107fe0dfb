//! External resource configuration
//!
//! Resources and their attribute mappings are configuration: loaded from
//! JSON, never modified by the engine.

use serde::{Deserialize, Serialize};

use idsync_connector::{OperationType, PropagationMode, TraceLevel};

/// Where the value of a mapping entry comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MappingSource {
    /// A plain attribute, by schema name.
    Plain,
    /// A derived attribute, by schema name.
    Derived,
    /// A virtual attribute, by name.
    Virtual,
    /// The identity's username.
    Username,
    /// The identity's internal id.
    IdentityId,
    /// The clear-text credential supplied with the request.
    Credential,
}

impl MappingSource {
    /// Whether the source is looked up by internal attribute name.
    #[must_use]
    pub fn is_named(&self) -> bool {
        matches!(
            self,
            MappingSource::Plain | MappingSource::Derived | MappingSource::Virtual
        )
    }
}

/// One row of a resource's schema mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeMapping {
    pub source: MappingSource,

    /// Internal attribute name; ignored for unnamed sources.
    #[serde(default)]
    pub int_attr_name: String,

    /// External attribute name; may be absent on the account id entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext_attr_name: Option<String>,

    /// This entry yields the account id.
    #[serde(default)]
    pub account_id: bool,

    /// This entry yields the credential.
    #[serde(default)]
    pub credential: bool,

    /// The external attribute holds several values.
    #[serde(default)]
    pub multivalue: bool,
}

impl AttributeMapping {
    /// Create an entry mapping `source` to `ext_attr_name`.
    pub fn new(source: MappingSource, int_attr_name: impl Into<String>, ext_attr_name: impl Into<String>) -> Self {
        Self {
            source,
            int_attr_name: int_attr_name.into(),
            ext_attr_name: Some(ext_attr_name.into()),
            account_id: false,
            credential: false,
            multivalue: false,
        }
    }

    /// Mark as the account id entry.
    #[must_use]
    pub fn as_account_id(mut self) -> Self {
        self.account_id = true;
        self
    }

    /// Mark as the credential entry.
    #[must_use]
    pub fn as_credential(mut self) -> Self {
        self.credential = true;
        self
    }

    /// Mark as multivalued.
    #[must_use]
    pub fn as_multivalue(mut self) -> Self {
        self.multivalue = true;
        self
    }

    /// Name to use in logs.
    #[must_use]
    pub fn describe(&self) -> String {
        let internal = if self.source.is_named() {
            self.int_attr_name.as_str()
        } else {
            match self.source {
                MappingSource::Username => "username",
                MappingSource::IdentityId => "id",
                _ => "credential",
            }
        };
        format!(
            "{} -> {}",
            internal,
            self.ext_attr_name.as_deref().unwrap_or("<account id>")
        )
    }
}

/// A target system an identity can be provisioned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalResource {
    /// Unique resource name.
    pub name: String,

    /// Lower runs earlier.
    #[serde(default)]
    pub priority: i32,

    #[serde(default)]
    pub propagation_mode: PropagationMode,

    #[serde(default)]
    pub create_trace_level: TraceLevel,

    #[serde(default)]
    pub update_trace_level: TraceLevel,

    #[serde(default)]
    pub delete_trace_level: TraceLevel,

    /// A synchronous failure on a primary resource aborts the batch.
    #[serde(default)]
    pub primary: bool,

    /// `${...}` template computing the external name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_link: Option<String>,

    /// Name of the connector instance serving this resource.
    pub connector: String,

    #[serde(default)]
    pub mappings: Vec<AttributeMapping>,
}

impl ExternalResource {
    /// Create a synchronous, non-primary resource tracing everything.
    pub fn new(name: impl Into<String>, connector: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: 0,
            propagation_mode: PropagationMode::default(),
            create_trace_level: TraceLevel::default(),
            update_trace_level: TraceLevel::default(),
            delete_trace_level: TraceLevel::default(),
            primary: false,
            account_link: None,
            connector: connector.into(),
            mappings: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: PropagationMode) -> Self {
        self.propagation_mode = mode;
        self
    }

    /// Use the same trace level for every operation type.
    #[must_use]
    pub fn with_trace_level(mut self, level: TraceLevel) -> Self {
        self.create_trace_level = level;
        self.update_trace_level = level;
        self.delete_trace_level = level;
        self
    }

    #[must_use]
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    #[must_use]
    pub fn with_account_link(mut self, expression: impl Into<String>) -> Self {
        self.account_link = Some(expression.into());
        self
    }

    #[must_use]
    pub fn with_mapping(mut self, mapping: AttributeMapping) -> Self {
        self.mappings.push(mapping);
        self
    }

    /// Trace level for an operation type.
    #[must_use]
    pub fn trace_level(&self, operation: OperationType) -> TraceLevel {
        match operation {
            OperationType::Create => self.create_trace_level,
            OperationType::Update => self.update_trace_level,
            OperationType::Delete => self.delete_trace_level,
        }
    }

    /// Whether this resource maps any of the given virtual attributes.
    pub fn maps_virtual<'a>(&self, names: impl IntoIterator<Item = &'a String>) -> bool {
        let names: Vec<&String> = names.into_iter().collect();
        self.mappings.iter().any(|m| {
            m.source == MappingSource::Virtual && names.iter().any(|n| **n == m.int_attr_name)
        })
    }
}
