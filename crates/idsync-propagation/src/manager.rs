//! Propagation manager
//!
//! Builds propagation tasks from an operation set and runs them, in order,
//! against the resources' connectors.
//!
//! ## Flow
//!
//! ```text
//! OperationSet ──purge──► tasks by (operation, priority) ──► probe ──► create/update/delete
//!                                                                          │
//!                                  trace level ◄── status ◄────────────────┘
//! ```
//!
//! A failed task is recorded (subject to its trace level) and the batch goes
//! on, unless the resource is primary and synchronous, in which case the
//! batch stops with [`PropagationError::PrimaryResourceFailed`]. Connector
//! calls already made are never undone.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use idsync_connector::operation::{
    AttributeSet, AttributeValue, ConnectorObject, OperationOptions, Uid, NAME, UID,
};
use idsync_connector::{AttemptedOperations, ConnectorGateway, OperationType};

use crate::config::PropagationConfig;
use crate::error::{PropagationError, PropagationResult};
use crate::execution::{truncate_message, ExecStatus, TaskExecution};
use crate::identity::{Identity, VirtualAttributeMod};
use crate::ids::{IdentityId, TaskId};
use crate::mapper::{AttributeMapper, SkippedMapping};
use crate::operation_set::OperationSet;
use crate::resource::ExternalResource;
use crate::store::{ConnectorLoader, IdentityStore, ResourceDirectory, TaskStore};
use crate::task::{PropagationTask, TaskBuild};

/// Outcome of running one task.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub task_id: TaskId,
    pub resource: String,
    pub operation: OperationType,
    pub status: ExecStatus,
    pub message: Option<String>,
    /// Operations that actually reached the connector.
    pub attempted: AttemptedOperations,
    /// Whether the execution was persisted.
    pub recorded: bool,
    pub execution: TaskExecution,
}

impl TaskOutcome {
    pub fn is_successful(&self) -> bool {
        self.status.is_successful()
    }
}

/// Outcomes of a batch, in execution order.
#[derive(Debug, Clone, Default)]
pub struct PropagationReport {
    pub outcomes: Vec<TaskOutcome>,
}

impl PropagationReport {
    /// Whether every task succeeded (or was submitted).
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(TaskOutcome::is_successful)
    }

    /// Failed outcomes.
    pub fn failed(&self) -> impl Iterator<Item = &TaskOutcome> {
        self.outcomes.iter().filter(|o| !o.is_successful())
    }

    /// Outcome for a resource, if a task ran on it.
    pub fn outcome(&self, resource: &str) -> Option<&TaskOutcome> {
        self.outcomes.iter().find(|o| o.resource == resource)
    }

    /// Resource names in execution order.
    pub fn resource_order(&self) -> Vec<&str> {
        self.outcomes.iter().map(|o| o.resource.as_str()).collect()
    }
}

/// Decides what runs where, and runs it.
pub struct PropagationManager {
    identities: Arc<dyn IdentityStore>,
    resources: Arc<dyn ResourceDirectory>,
    connectors: Arc<dyn ConnectorLoader>,
    task_store: Arc<dyn TaskStore>,
    mapper: AttributeMapper,
    config: PropagationConfig,
}

impl PropagationManager {
    /// Create a manager over its collaborators.
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        resources: Arc<dyn ResourceDirectory>,
        connectors: Arc<dyn ConnectorLoader>,
        task_store: Arc<dyn TaskStore>,
    ) -> Self {
        Self {
            identities,
            resources,
            connectors,
            task_store,
            mapper: AttributeMapper::new(),
            config: PropagationConfig::default(),
        }
    }

    /// Create with custom configuration.
    #[must_use]
    pub fn with_config(mut self, config: PropagationConfig) -> Self {
        self.config = config;
        self
    }

    /// Current configuration.
    pub fn config(&self) -> &PropagationConfig {
        &self.config
    }

    async fn find_identity(&self, id: IdentityId) -> PropagationResult<Identity> {
        self.identities
            .find_identity(id)
            .await?
            .ok_or(PropagationError::IdentityNotFound { id })
    }

    /// Tasks creating an identity on the resources of `op_set`.
    ///
    /// Supplied virtual attribute values are applied first. The resource
    /// performing a sync, if any, is not propagated back to.
    #[instrument(skip(self, op_set, credential, virtual_values))]
    pub async fn create_tasks(
        &self,
        identity_id: IdentityId,
        enable: Option<bool>,
        mut op_set: OperationSet,
        credential: Option<&str>,
        virtual_values: &[VirtualAttributeMod],
        sync_resource: Option<&str>,
    ) -> PropagationResult<TaskBuild> {
        let identity = if virtual_values.is_empty() {
            self.find_identity(identity_id).await?
        } else {
            self.identities
                .fill_virtual(identity_id, &BTreeSet::new(), virtual_values)
                .await?
                .0
        };

        if op_set.is_empty() {
            return Ok(TaskBuild::default());
        }
        if let Some(sync_resource) = sync_resource {
            op_set.remove(OperationType::Create, sync_resource);
        }

        self.provision(&identity, credential, enable, op_set).await
    }

    /// Tasks updating an identity.
    ///
    /// Every associated resource mapping a changed virtual attribute gets an
    /// update. On top of that, `op_set` is merged in; when it is empty every
    /// associated resource is updated.
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip(self, credential, virtual_to_remove, virtual_to_update, op_set))]
    pub async fn update_tasks(
        &self,
        identity_id: IdentityId,
        credential: Option<&str>,
        virtual_to_remove: &BTreeSet<String>,
        virtual_to_update: &[VirtualAttributeMod],
        enable: Option<bool>,
        op_set: OperationSet,
        sync_resource: Option<&str>,
    ) -> PropagationResult<TaskBuild> {
        let (identity, changed) = self
            .identities
            .fill_virtual(identity_id, virtual_to_remove, virtual_to_update)
            .await?;

        let mut local = OperationSet::new();
        if !changed.is_empty() {
            for resource in self.resources.find_all_by_priority().await? {
                if identity.resources.contains(&resource.name) && resource.maps_virtual(changed.iter()) {
                    local.add(OperationType::Update, resource.name);
                }
            }
        }

        if op_set.is_empty() {
            local.add_all(OperationType::Update, identity.resources.iter().cloned());
        } else {
            local.merge(&op_set);
        }

        if let Some(sync_resource) = sync_resource {
            local.remove_everywhere(sync_resource);
        }

        self.provision(&identity, credential, enable, local).await
    }

    /// Tasks deleting an identity from every associated resource.
    #[instrument(skip(self))]
    pub async fn delete_tasks(
        &self,
        identity_id: IdentityId,
        sync_resource: Option<&str>,
    ) -> PropagationResult<TaskBuild> {
        let identity = self.find_identity(identity_id).await?;

        let mut op_set = OperationSet::new();
        op_set.add_all(OperationType::Delete, identity.resources.iter().cloned());
        if let Some(sync_resource) = sync_resource {
            op_set.remove(OperationType::Delete, sync_resource);
        }

        self.build_tasks(&identity, None, None, op_set, true).await
    }

    /// Build tasks for `op_set`: creates first, then updates, then deletes,
    /// each group in resource priority order.
    ///
    /// Fails as a whole when a named resource or its connector is unknown.
    /// A resource whose account id cannot be resolved is skipped.
    #[instrument(skip(self, identity, credential, op_set), fields(identity = %identity.id))]
    pub async fn provision(
        &self,
        identity: &Identity,
        credential: Option<&str>,
        enable: Option<bool>,
        op_set: OperationSet,
    ) -> PropagationResult<TaskBuild> {
        self.build_tasks(identity, credential, enable, op_set, false)
            .await
    }

    /// `detached` marks tasks removing the identity itself, whose deletes are
    /// never turned into updates.
    async fn build_tasks(
        &self,
        identity: &Identity,
        credential: Option<&str>,
        enable: Option<bool>,
        mut op_set: OperationSet,
        detached: bool,
    ) -> PropagationResult<TaskBuild> {
        op_set.purge();

        let resources = self.resources.find_all_by_priority().await?;
        self.check_resources(&resources, &op_set).await?;

        let mut build = TaskBuild::default();
        for operation in OperationType::all() {
            let pending = op_set.get(*operation);
            for resource in resources.iter().filter(|r| pending.contains(&r.name)) {
                match self.build_task(identity, credential, enable, &op_set, resource, *operation) {
                    Ok((task, unmapped)) => {
                        let task = if detached { task.detached() } else { task };
                        build
                            .unmapped
                            .extend(unmapped.into_iter().map(|s| (resource.name.clone(), s)));
                        build.tasks.push(task);
                    }
                    Err(e) => {
                        warn!(
                            resource = %resource.name,
                            operation = %operation,
                            error = %e,
                            "Task not built"
                        );
                        build.skipped.push(resource.name.clone());
                    }
                }
            }
        }

        debug!(
            tasks = build.tasks.len(),
            skipped = build.skipped.len(),
            "Propagation tasks built"
        );
        Ok(build)
    }

    async fn check_resources(
        &self,
        resources: &[ExternalResource],
        op_set: &OperationSet,
    ) -> PropagationResult<()> {
        let names: BTreeSet<&String> = OperationType::all()
            .iter()
            .flat_map(|op| op_set.get(*op).iter())
            .collect();

        for name in names {
            let resource = resources
                .iter()
                .find(|r| &r.name == name)
                .ok_or_else(|| PropagationError::ResourceNotFound { name: name.clone() })?;
            if self.connectors.load(resource).await.is_none() {
                return Err(PropagationError::ConnectorNotFound {
                    resource: name.clone(),
                });
            }
        }
        Ok(())
    }

    fn build_task(
        &self,
        identity: &Identity,
        credential: Option<&str>,
        enable: Option<bool>,
        op_set: &OperationSet,
        resource: &ExternalResource,
        operation: OperationType,
    ) -> PropagationResult<(PropagationTask, Vec<SkippedMapping>)> {
        let prepared = self
            .mapper
            .prepare_resource(resource, identity, credential, enable)?;

        let attributes = match operation {
            OperationType::Delete => {
                let mut attributes = AttributeSet::new();
                if let Some(name) = prepared.attributes.name() {
                    attributes.set(NAME, name);
                }
                attributes
            }
            _ => prepared.attributes,
        };

        let task = PropagationTask::new(
            identity.id,
            resource.clone(),
            operation,
            prepared.account_id,
            attributes,
        )
        .with_old_account_id(op_set.old_account_id(&resource.name).map(str::to_string));

        Ok((task, prepared.skipped))
    }

    /// Run tasks in order.
    ///
    /// Stops at the first failure on a primary, synchronous resource.
    #[instrument(skip(self, tasks), fields(tasks = tasks.len()))]
    pub async fn execute(&self, tasks: &[PropagationTask]) -> PropagationResult<PropagationReport> {
        let mut report = PropagationReport::default();

        for task in tasks {
            let outcome = self.execute_task(task).await;

            if task.is_blocking() && !outcome.is_successful() {
                let message = outcome.message.clone().unwrap_or_default();
                error!(
                    resource = %task.resource.name,
                    message = %message,
                    "Propagation to primary resource failed, aborting"
                );
                return Err(PropagationError::PrimaryResourceFailed {
                    resource: task.resource.name.clone(),
                    message,
                });
            }

            report.outcomes.push(outcome);
        }

        Ok(report)
    }

    /// Run one task and record its execution when its trace level says so.
    ///
    /// Never fails: errors end up in the outcome status and message.
    #[instrument(
        skip(self, task),
        fields(
            resource = %task.resource.name,
            operation = %task.operation,
            account_id = %task.account_id
        )
    )]
    pub async fn execute_task(&self, task: &PropagationTask) -> TaskOutcome {
        let mut execution = TaskExecution::start(task.id);
        let mut attempted = AttemptedOperations::new();
        debug!("Execution started");

        let result = match self.connectors.load(&task.resource).await {
            Some(gateway) => self.dispatch(&gateway, task, &mut attempted).await,
            None => {
                // Counted as attempted so the failure gets traced.
                attempted.insert(task.operation);
                Err(PropagationError::ConnectorNotFound {
                    resource: task.resource.name.clone(),
                })
            }
        };

        let message = match &result {
            Ok(()) => None,
            Err(PropagationError::Connector(ce)) => {
                error!(
                    resource = %task.resource.name,
                    error = %ce,
                    error_code = ce.error_code(),
                    transient = ce.is_transient(),
                    "Exception during provision"
                );
                Some(truncate_message(ce.execution_message(), self.config.max_message_length))
            }
            Err(e) => {
                error!(resource = %task.resource.name, error = %e, "Exception during provision");
                Some(truncate_message(e.to_string(), self.config.max_message_length))
            }
        };

        let status = ExecStatus::outcome(task.mode, result.is_ok());
        execution.finish(status, message.clone());
        debug!(status = %status, "Execution finished");

        let recorded = if attempted.is_empty() {
            debug!("Nothing attempted, execution not recorded");
            false
        } else if execution.should_record(task.trace_level()) {
            self.record(task, &execution).await
        } else {
            false
        };

        TaskOutcome {
            task_id: task.id,
            resource: task.resource.name.clone(),
            operation: task.operation,
            status,
            message,
            attempted,
            recorded,
            execution,
        }
    }

    async fn dispatch(
        &self,
        gateway: &ConnectorGateway,
        task: &PropagationTask,
        attempted: &mut AttemptedOperations,
    ) -> PropagationResult<()> {
        let object_class = self.config.object_class.as_str();
        let options = self.config.operation_options();
        let lookup = Uid::from_value(task.lookup_account_id());

        let remote = match gateway
            .get_object(Some(task.mode), Some(task.operation), object_class, &lookup, &options)
            .await
        {
            Ok(remote) => remote,
            Err(e) => {
                debug!(error = %e, "Object lookup failed, to be ignored");
                None
            }
        };

        match (task.operation, remote) {
            (OperationType::Create | OperationType::Update, Some(remote)) => {
                self.update_existing(gateway, task, &remote, task.attributes.clone(), &options, attempted)
                    .await?;
            }
            (OperationType::Create | OperationType::Update, None) => {
                let mut attributes = task.attributes.clone();
                let account_id = task.account_id.as_str();
                if !account_id.trim().is_empty()
                    && attributes.name() != Some(account_id)
                    && !attributes.has(UID)
                {
                    attributes.set(UID, account_id);
                }
                gateway
                    .create(task.mode, object_class, attributes, &options, attempted)
                    .await?;
            }
            (OperationType::Delete, Some(remote)) => match self.still_assigned(task).await? {
                Some(identity) => {
                    debug!("Identity still assigned to the resource, updating instead of deleting");
                    let attributes = match self
                        .mapper
                        .prepare_resource(&task.resource, &identity, None, None)
                    {
                        Ok(prepared) => prepared.attributes,
                        Err(e) => {
                            debug!(error = %e, "Attributes not prepared, using the task's");
                            task.attributes.clone()
                        }
                    };
                    self.update_existing(gateway, task, &remote, attributes, &options, attempted)
                        .await?;
                }
                None => {
                    gateway
                        .delete(task.mode, object_class, &remote.uid, &options, attempted)
                        .await?;
                }
            },
            (OperationType::Delete, None) => {
                info!("Object not found on resource, nothing to delete");
            }
        }

        Ok(())
    }

    /// The identity behind a non-detached task, if it still lists the task's
    /// resource.
    async fn still_assigned(&self, task: &PropagationTask) -> PropagationResult<Option<Identity>> {
        if task.detached {
            return Ok(None);
        }
        let identity = self.identities.find_identity(task.identity_id).await?;
        Ok(identity.filter(|i| i.resources.contains(&task.resource.name)))
    }

    /// Update a remote object with the attributes that differ from it.
    ///
    /// No connector call is made when nothing differs. An attribute the
    /// remote object lacks counts as null.
    async fn update_existing(
        &self,
        gateway: &ConnectorGateway,
        task: &PropagationTask,
        remote: &ConnectorObject,
        mut attributes: AttributeSet,
        options: &OperationOptions,
        attempted: &mut AttemptedOperations,
    ) -> PropagationResult<()> {
        // An unchanged name is not a rename.
        if attributes.name() == Some(remote.name.as_str()) && remote.uid.value() != remote.name {
            attributes.remove(NAME);
        }

        let changed: AttributeSet = attributes
            .iter()
            .filter(|(name, value)| remote.attribute(name).unwrap_or(AttributeValue::Null) != **value)
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        if changed.is_empty() {
            debug!(uid = %remote.uid, "Remote object up to date, nothing to propagate");
            return Ok(());
        }

        debug!(uid = %remote.uid, attributes = changed.len(), "Updating remote object");
        gateway
            .update(
                task.mode,
                self.config.object_class.as_str(),
                &remote.uid,
                changed,
                options,
                attempted,
            )
            .await?;
        Ok(())
    }

    async fn record(&self, task: &PropagationTask, execution: &TaskExecution) -> bool {
        let saved = match self.task_store.save_task(task).await {
            Ok(()) => self.task_store.save_execution(execution).await,
            Err(e) => Err(e),
        };
        match saved {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to record execution");
                false
            }
        }
    }
}
