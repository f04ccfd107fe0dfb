//! Propagation error types

use thiserror::Error;

use idsync_connector::ConnectorError;

use crate::ids::IdentityId;

/// Errors surfaced by the propagation engine.
#[derive(Debug, Error)]
pub enum PropagationError {
    /// The identity does not exist.
    #[error("Identity not found: {id}")]
    IdentityNotFound { id: IdentityId },

    /// A resource named in the operation set is unknown.
    #[error("Resource not found: {name}")]
    ResourceNotFound { name: String },

    /// No connector instance could be loaded for a resource.
    #[error("Connector not found for resource {resource}")]
    ConnectorNotFound { resource: String },

    /// No account id could be resolved from the resource mapping.
    #[error("Missing account id specification for {resource}")]
    MissingAccountId { resource: String },

    /// A primary resource failed synchronously; the batch was aborted.
    #[error("Propagation to primary resource {resource} failed: {message}")]
    PrimaryResourceFailed { resource: String, message: String },

    /// Connector error.
    #[error("Connector error: {0}")]
    Connector(#[from] ConnectorError),

    /// Collaborator store error.
    #[error("Store error: {message}")]
    Store { message: String },

    /// Configuration could not be parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

impl PropagationError {
    /// Create a store error.
    pub fn store(message: impl Into<String>) -> Self {
        PropagationError::Store {
            message: message.into(),
        }
    }

    /// Whether this error aborted the whole request before any task ran.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            PropagationError::IdentityNotFound { .. }
                | PropagationError::ResourceNotFound { .. }
                | PropagationError::ConnectorNotFound { .. }
        )
    }
}

/// Result type for propagation operations.
pub type PropagationResult<T> = Result<T, PropagationError>;

/// Failure to produce an external attribute from one mapping entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    /// The source attribute has no value on the identity.
    #[error("no value for {attribute}")]
    NoValue { attribute: String },

    /// An expression could not be evaluated.
    #[error("invalid expression '{expression}': {message}")]
    Expression { expression: String, message: String },

    /// The mapping refers to a schema the identity model does not know.
    #[error("unknown attribute {name}")]
    UnknownAttribute { name: String },
}
