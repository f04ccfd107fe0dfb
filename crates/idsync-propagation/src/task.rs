//! Propagation tasks
//!
//! A task is one (resource, operation) unit of work with its attributes
//! already prepared. Tasks are built once and executed immediately.

use serde::{Deserialize, Serialize};

use idsync_connector::operation::AttributeSet;
use idsync_connector::{OperationType, PropagationMode, TraceLevel};

use crate::ids::{IdentityId, TaskId};
use crate::mapper::SkippedMapping;
use crate::resource::ExternalResource;

/// One unit of propagation work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagationTask {
    pub id: TaskId,
    pub identity_id: IdentityId,
    pub resource: ExternalResource,
    pub operation: OperationType,
    pub mode: PropagationMode,
    /// Account id resolved from the resource mapping.
    pub account_id: String,
    /// Account id the resource previously knew the identity by.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_account_id: Option<String>,
    pub attributes: AttributeSet,
    /// The identity itself is being removed: a DELETE is carried out even if
    /// the identity still lists the resource.
    #[serde(default)]
    pub detached: bool,
}

impl PropagationTask {
    /// Create a task in the resource's propagation mode.
    pub fn new(
        identity_id: IdentityId,
        resource: ExternalResource,
        operation: OperationType,
        account_id: impl Into<String>,
        attributes: AttributeSet,
    ) -> Self {
        Self {
            id: TaskId::new(),
            identity_id,
            mode: resource.propagation_mode,
            resource,
            operation,
            account_id: account_id.into(),
            old_account_id: None,
            attributes,
            detached: false,
        }
    }

    #[must_use]
    pub fn with_old_account_id(mut self, old_account_id: Option<String>) -> Self {
        self.old_account_id = old_account_id;
        self
    }

    /// Unbind the task from its identity's current resource assignments.
    #[must_use]
    pub fn detached(mut self) -> Self {
        self.detached = true;
        self
    }

    pub fn resource_name(&self) -> &str {
        &self.resource.name
    }

    /// Account id used to look the remote object up.
    pub fn lookup_account_id(&self) -> &str {
        self.old_account_id.as_deref().unwrap_or(&self.account_id)
    }

    /// Trace level governing this task's outcome.
    pub fn trace_level(&self) -> TraceLevel {
        self.resource.trace_level(self.operation)
    }

    /// Whether a failure of this task aborts the batch.
    pub fn is_blocking(&self) -> bool {
        self.resource.primary && self.mode.is_synchronous()
    }
}

/// Tasks built from an operation set.
#[derive(Debug, Clone, Default)]
pub struct TaskBuild {
    /// Tasks in execution order.
    pub tasks: Vec<PropagationTask>,
    /// Resources left out because no account id could be resolved.
    pub skipped: Vec<String>,
    /// Mapping entries that produced nothing, per resource.
    pub unmapped: Vec<(String, SkippedMapping)>,
}

impl TaskBuild {
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Resource names in execution order.
    pub fn resource_order(&self) -> Vec<&str> {
        self.tasks.iter().map(PropagationTask::resource_name).collect()
    }
}
