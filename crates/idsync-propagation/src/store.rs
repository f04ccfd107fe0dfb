//! Collaborator contracts
//!
//! The engine reads identities and resources and writes task records through
//! these traits. In-memory implementations are provided for embedding and
//! tests.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use idsync_connector::{ConnectorGateway, ConnectorRegistry};

use crate::error::{PropagationError, PropagationResult};
use crate::execution::TaskExecution;
use crate::identity::{Identity, VirtualAttributeMod};
use crate::ids::IdentityId;
use crate::resource::ExternalResource;
use crate::task::PropagationTask;

/// Read access to identities.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Find an identity by id.
    async fn find_identity(&self, id: IdentityId) -> PropagationResult<Option<Identity>>;

    /// Apply virtual attribute changes and return the updated identity with
    /// the names of the attributes that changed.
    async fn fill_virtual(
        &self,
        id: IdentityId,
        to_remove: &BTreeSet<String>,
        mods: &[VirtualAttributeMod],
    ) -> PropagationResult<(Identity, BTreeSet<String>)>;
}

/// Read access to resource configuration.
#[async_trait]
pub trait ResourceDirectory: Send + Sync {
    /// Every resource, lowest priority first.
    async fn find_all_by_priority(&self) -> PropagationResult<Vec<ExternalResource>>;

    /// Find a resource by name.
    async fn find(&self, name: &str) -> PropagationResult<Option<ExternalResource>>;
}

/// Resolves the connector serving a resource.
#[async_trait]
pub trait ConnectorLoader: Send + Sync {
    /// The live gateway for a resource, `None` when none is configured.
    async fn load(&self, resource: &ExternalResource) -> Option<Arc<ConnectorGateway>>;
}

#[async_trait]
impl ConnectorLoader for ConnectorRegistry {
    async fn load(&self, resource: &ExternalResource) -> Option<Arc<ConnectorGateway>> {
        self.get(&resource.connector).await
    }
}

/// Durable storage for traced tasks and their executions.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn save_task(&self, task: &PropagationTask) -> PropagationResult<()>;

    async fn save_execution(&self, execution: &TaskExecution) -> PropagationResult<()>;
}

/// Identities kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryIdentityStore {
    identities: RwLock<HashMap<IdentityId, Identity>>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an identity.
    pub async fn insert(&self, identity: Identity) {
        self.identities.write().await.insert(identity.id, identity);
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn find_identity(&self, id: IdentityId) -> PropagationResult<Option<Identity>> {
        Ok(self.identities.read().await.get(&id).cloned())
    }

    async fn fill_virtual(
        &self,
        id: IdentityId,
        to_remove: &BTreeSet<String>,
        mods: &[VirtualAttributeMod],
    ) -> PropagationResult<(Identity, BTreeSet<String>)> {
        let mut identities = self.identities.write().await;
        let identity = identities
            .get_mut(&id)
            .ok_or(PropagationError::IdentityNotFound { id })?;
        let changed = identity.apply_virtual_changes(to_remove, mods);
        debug!(identity = %id, changed = ?changed, "Virtual attributes filled");
        Ok((identity.clone(), changed))
    }
}

/// Resources kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryResourceDirectory {
    resources: RwLock<Vec<ExternalResource>>,
}

impl InMemoryResourceDirectory {
    pub fn new(resources: Vec<ExternalResource>) -> Self {
        Self {
            resources: RwLock::new(resources),
        }
    }

    /// Load a JSON array of resources.
    pub fn from_json(json: &str) -> PropagationResult<Self> {
        let resources: Vec<ExternalResource> = serde_json::from_str(json)?;
        Ok(Self::new(resources))
    }

    /// Insert or replace a resource.
    pub async fn insert(&self, resource: ExternalResource) {
        let mut resources = self.resources.write().await;
        resources.retain(|r| r.name != resource.name);
        resources.push(resource);
    }
}

#[async_trait]
impl ResourceDirectory for InMemoryResourceDirectory {
    async fn find_all_by_priority(&self) -> PropagationResult<Vec<ExternalResource>> {
        let mut resources = self.resources.read().await.clone();
        resources.sort_by_key(|r| r.priority);
        Ok(resources)
    }

    async fn find(&self, name: &str) -> PropagationResult<Option<ExternalResource>> {
        Ok(self
            .resources
            .read()
            .await
            .iter()
            .find(|r| r.name == name)
            .cloned())
    }
}

/// Task records kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: Mutex<Vec<PropagationTask>>,
    executions: Mutex<Vec<TaskExecution>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn tasks(&self) -> Vec<PropagationTask> {
        self.tasks.lock().await.clone()
    }

    pub async fn executions(&self) -> Vec<TaskExecution> {
        self.executions.lock().await.clone()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn save_task(&self, task: &PropagationTask) -> PropagationResult<()> {
        self.tasks.lock().await.push(task.clone());
        Ok(())
    }

    async fn save_execution(&self, execution: &TaskExecution) -> PropagationResult<()> {
        self.executions.lock().await.push(execution.clone());
        Ok(())
    }
}

enum PendingWrite {
    Task(PropagationTask),
    Execution(TaskExecution),
}

/// Buffers writes until [`commit`](Self::commit).
///
/// Models the transactional boundary around task building and recording:
/// after [`rollback`](Self::rollback) nothing is stored, although any
/// connector call made meanwhile has already reached its resource.
pub struct TransactionalTaskStore {
    inner: Arc<dyn TaskStore>,
    pending: Mutex<Vec<PendingWrite>>,
}

impl TransactionalTaskStore {
    pub fn new(inner: Arc<dyn TaskStore>) -> Self {
        Self {
            inner,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Number of buffered writes.
    pub async fn pending(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Flush buffered writes to the inner store, in order.
    pub async fn commit(&self) -> PropagationResult<()> {
        let writes: Vec<PendingWrite> = std::mem::take(&mut *self.pending.lock().await);
        debug!(writes = writes.len(), "Committing task records");
        for write in writes {
            match write {
                PendingWrite::Task(task) => self.inner.save_task(&task).await?,
                PendingWrite::Execution(execution) => self.inner.save_execution(&execution).await?,
            }
        }
        Ok(())
    }

    /// Drop buffered writes.
    pub async fn rollback(&self) {
        let dropped = std::mem::take(&mut *self.pending.lock().await).len();
        debug!(writes = dropped, "Rolled back task records");
    }
}

#[async_trait]
impl TaskStore for TransactionalTaskStore {
    async fn save_task(&self, task: &PropagationTask) -> PropagationResult<()> {
        self.pending
            .lock()
            .await
            .push(PendingWrite::Task(task.clone()));
        Ok(())
    }

    async fn save_execution(&self, execution: &TaskExecution) -> PropagationResult<()> {
        self.pending
            .lock()
            .await
            .push(PendingWrite::Execution(execution.clone()));
        Ok(())
    }
}
