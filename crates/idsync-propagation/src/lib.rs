//! # Propagation engine
//!
//! Provisions identities to external resources and keeps them in sync.
//!
//! The engine decides which operation runs on which resource and in what
//! order, maps identity attributes onto each resource's attribute model and
//! drives the connectors through their capability-gated gateways.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐    ┌──────────────────┐    ┌──────────────────┐
//! │ OperationSet  │───►│ PropagationManager│───►│ ConnectorGateway │
//! │ (what/where)  │    │  build + execute  │    │ (capabilities)   │
//! └───────────────┘    └────────┬─────────┘    └──────────────────┘
//!                               │
//!                  ┌────────────┼────────────┐
//!                  ▼            ▼            ▼
//!           AttributeMapper  TaskStore   ExecStatus
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use idsync_propagation::prelude::*;
//!
//! let manager = PropagationManager::new(identities, resources, registry, task_store);
//!
//! let op_set = OperationSet::new()
//!     .with(OperationType::Create, "LDAP")
//!     .with(OperationType::Create, "DB");
//! let build = manager
//!     .create_tasks(identity_id, Some(true), op_set, Some("password"), &[], None)
//!     .await?;
//! let report = manager.execute(&build.tasks).await?;
//! ```

pub mod config;
pub mod error;
pub mod execution;
pub mod expression;
pub mod identity;
pub mod ids;
pub mod manager;
pub mod mapper;
pub mod operation_set;
pub mod resource;
pub mod store;
pub mod task;

pub use config::PropagationConfig;
pub use error::{MappingError, PropagationError, PropagationResult};
pub use execution::{ExecStatus, TaskExecution};
pub use identity::{
    AttrValue, DerivedSchema, Identity, PlainAttribute, PlainSchema, VirtualAttribute,
    VirtualAttributeMod,
};
pub use ids::{ExecutionId, IdentityId, TaskId};
pub use manager::{PropagationManager, PropagationReport, TaskOutcome};
pub use mapper::{AttributeMapper, MappedAttributes, PreparedAttributes, PreparedEntry, SkippedMapping};
pub use operation_set::OperationSet;
pub use resource::{AttributeMapping, ExternalResource, MappingSource};
pub use store::{
    ConnectorLoader, IdentityStore, InMemoryIdentityStore, InMemoryResourceDirectory,
    InMemoryTaskStore, ResourceDirectory, TaskStore, TransactionalTaskStore,
};
pub use task::{PropagationTask, TaskBuild};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::PropagationConfig;
    pub use crate::error::{MappingError, PropagationError, PropagationResult};
    pub use crate::execution::{ExecStatus, TaskExecution};
    pub use crate::identity::{AttrValue, DerivedSchema, Identity, PlainSchema, VirtualAttributeMod};
    pub use crate::ids::{ExecutionId, IdentityId, TaskId};
    pub use crate::manager::{PropagationManager, PropagationReport, TaskOutcome};
    pub use crate::operation_set::OperationSet;
    pub use crate::resource::{AttributeMapping, ExternalResource, MappingSource};
    pub use crate::store::{
        ConnectorLoader, IdentityStore, InMemoryIdentityStore, InMemoryResourceDirectory,
        InMemoryTaskStore, ResourceDirectory, TaskStore, TransactionalTaskStore,
    };
    pub use crate::task::{PropagationTask, TaskBuild};

    pub use idsync_connector::prelude::*;
}
