//! # Connector side of identity propagation
//!
//! Abstractions for talking to external resources during propagation.
//!
//! ## Architecture
//!
//! Connectors implement capability-style SPI traits:
//!
//! - [`Connector`] - Base trait all connectors implement
//! - [`SchemaDiscovery`] - Report the external schema
//! - [`CreateOp`], [`UpdateOp`], [`DeleteOp`] - Mutating operations
//! - [`SearchOp`] - Read objects
//! - [`SyncOp`] - Read the change log
//!
//! Which of those operations a configured instance accepts, and in which
//! propagation mode, is declared by its [`CapabilitySet`]. The
//! [`ConnectorGateway`] enforces that declaration: an undeclared call is a
//! silent no-op reported through [`AttemptedOperations`].
//!
//! ## Example
//!
//! ```ignore
//! use idsync_connector::prelude::*;
//!
//! let config = ConnectorInstanceConfig::new("ldap")
//!     .with_capability(Capability::OnePhaseCreate)
//!     .with_capability(Capability::Search);
//! let registry = ConnectorRegistry::new();
//! let gateway = registry.register(config, Arc::new(my_ldap_connector)).await?;
//!
//! let mut attempted = AttemptedOperations::new();
//! let attrs = AttributeSet::new().with(NAME, "uid=jdoe,ou=people");
//! gateway
//!     .create(PropagationMode::Sync, ACCOUNT, attrs, &OperationOptions::new(), &mut attempted)
//!     .await?;
//! ```

pub mod capability;
pub mod config;
pub mod error;
pub mod gateway;
pub mod operation;
pub mod registry;
pub mod schema;
pub mod traits;
pub mod types;

pub use capability::{required_capability, Capability, CapabilitySet};
pub use config::ConnectorInstanceConfig;
pub use error::{ConnectorError, ConnectorResult};
pub use gateway::{AttemptedOperations, ConnectorGateway};
pub use registry::ConnectorRegistry;
pub use traits::{
    Connector, CreateOp, DeleteOp, FullConnector, SchemaDiscovery, SearchOp, SyncOp, UpdateOp,
};
pub use types::{OperationType, PropagationMode, TraceLevel};

/// Prelude module for convenient imports.
///
/// ```
/// use idsync_connector::prelude::*;
/// ```
pub mod prelude {
    // Types and enums
    pub use crate::types::{OperationType, PropagationMode, TraceLevel};

    // Capabilities
    pub use crate::capability::{required_capability, Capability, CapabilitySet};

    // Error handling
    pub use crate::error::{ConnectorError, ConnectorResult};

    // Traits
    pub use crate::traits::{
        Connector, CreateOp, DeleteOp, FullConnector, SchemaDiscovery, SearchOp, SyncOp, UpdateOp,
    };

    // Schema
    pub use crate::schema::{AttributeDataType, ObjectClass, Schema, SchemaAttribute};

    // Operations
    pub use crate::operation::{
        AttributeSet, AttributeValue, ConnectorObject, GuardedString, OperationOptions, SyncDelta,
        SyncDeltaType, SyncToken, Uid, ACCOUNT, ENABLE, NAME, PASSWORD, UID,
    };

    // Configuration
    pub use crate::config::ConnectorInstanceConfig;

    // Gateway and registry
    pub use crate::gateway::{AttemptedOperations, ConnectorGateway};
    pub use crate::registry::ConnectorRegistry;
}

// Re-export async_trait for connector implementors
pub use async_trait::async_trait;
