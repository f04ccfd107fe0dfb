//! Propagation Manager Tests
//!
//! End-to-end tests for `PropagationManager` covering:
//! - Task ordering by operation type and resource priority
//! - Primary/synchronous abort vs. continue-on-failure
//! - Trace levels and recording
//! - Capability gating
//! - Create vs. update decision, rename handling, changed-only updates
//! - Delete re-checked against the identity's current resources
//! - Transaction rollback with at-least-once delivery

use async_trait::async_trait;
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use idsync_connector::error::{ConnectorError, ConnectorResult};
use idsync_connector::operation::{
    AttributeSet, AttributeValue, ConnectorObject, OperationOptions, SyncDelta, SyncToken, Uid,
    ENABLE, NAME, PASSWORD, UID,
};
use idsync_connector::schema::{AttributeDataType, Schema};
use idsync_connector::traits::{
    Connector, CreateOp, DeleteOp, SchemaDiscovery, SearchOp, SyncOp, UpdateOp,
};
use idsync_connector::{
    Capability, CapabilitySet, ConnectorInstanceConfig, ConnectorRegistry, OperationType,
    PropagationMode, TraceLevel,
};
use idsync_propagation::{
    AttributeMapping, ExecStatus, ExternalResource, Identity, IdentityId, InMemoryIdentityStore,
    InMemoryResourceDirectory, InMemoryTaskStore, MappingSource, OperationSet, PlainSchema,
    PropagationConfig, PropagationError, PropagationManager, PropagationResult, PropagationTask,
    TaskExecution, TaskStore, TransactionalTaskStore, VirtualAttributeMod,
};

type Journal = Arc<Mutex<Vec<String>>>;

// =============================================================================
// Manual Mock Connector Implementation
// =============================================================================

/// Mock connector keeping its objects in memory.
///
/// Every mutating call is appended to a journal shared by all connectors of a
/// test, so cross-resource ordering can be asserted.
pub struct TestConnector {
    name: String,
    journal: Journal,
    objects: Mutex<HashMap<String, ConnectorObject>>,
    fail_create: AtomicBool,
    fail_update: AtomicBool,
    fail_search: AtomicBool,
    create_calls: AtomicUsize,
    update_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    search_calls: AtomicUsize,
    last_attributes: Mutex<Option<AttributeSet>>,
    last_uid: Mutex<Option<Uid>>,
}

impl TestConnector {
    fn new(name: &str, journal: Journal) -> Self {
        Self {
            name: name.to_string(),
            journal,
            objects: Mutex::new(HashMap::new()),
            fail_create: AtomicBool::new(false),
            fail_update: AtomicBool::new(false),
            fail_search: AtomicBool::new(false),
            create_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            search_calls: AtomicUsize::new(0),
            last_attributes: Mutex::new(None),
            last_uid: Mutex::new(None),
        }
    }

    fn with_create_error(self) -> Self {
        self.fail_create.store(true, Ordering::SeqCst);
        self
    }

    fn with_update_error(self) -> Self {
        self.fail_update.store(true, Ordering::SeqCst);
        self
    }

    fn with_search_error(self) -> Self {
        self.fail_search.store(true, Ordering::SeqCst);
        self
    }

    fn with_object(self, uid: &str, name: &str) -> Self {
        self.with_object_attributes(uid, name, AttributeSet::new())
    }

    fn with_object_attributes(self, uid: &str, name: &str, attributes: AttributeSet) -> Self {
        let object = ConnectorObject::new("__ACCOUNT__", Uid::from_value(uid), name)
            .with_attributes(attributes);
        self.objects
            .lock()
            .unwrap()
            .insert(uid.to_string(), object);
        self
    }

    fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    fn last_attributes(&self) -> AttributeSet {
        self.last_attributes.lock().unwrap().clone().unwrap()
    }

    fn last_uid(&self) -> Uid {
        self.last_uid.lock().unwrap().clone().unwrap()
    }

    fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    fn log(&self, operation: &str) {
        self.journal
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.name, operation));
    }

    fn refused(&self, operation: &str) -> ConnectorError {
        ConnectorError::connection_failed_with_source(
            format!("{operation} failed"),
            std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("{}: Connection refused", self.name),
            ),
        )
    }
}

#[async_trait]
impl Connector for TestConnector {
    fn display_name(&self) -> &str {
        &self.name
    }

    async fn test(&self) -> ConnectorResult<()> {
        Ok(())
    }
}

#[async_trait]
impl SchemaDiscovery for TestConnector {
    async fn schema(&self) -> ConnectorResult<Schema> {
        Ok(Schema::new())
    }
}

#[async_trait]
impl CreateOp for TestConnector {
    async fn create(
        &self,
        object_class: &str,
        attributes: AttributeSet,
        _options: &OperationOptions,
    ) -> ConnectorResult<Uid> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.log("create");
        *self.last_attributes.lock().unwrap() = Some(attributes.clone());

        if self.fail_create.load(Ordering::SeqCst) {
            return Err(self.refused("create"));
        }

        let name = attributes.name().unwrap_or_default().to_string();
        let uid = attributes.uid().map(str::to_string).unwrap_or_else(|| name.clone());
        let object = ConnectorObject::new(object_class, Uid::from_value(uid.clone()), name)
            .with_attributes(attributes);
        self.objects.lock().unwrap().insert(uid.clone(), object);
        Ok(Uid::from_value(uid))
    }
}

#[async_trait]
impl UpdateOp for TestConnector {
    async fn update(
        &self,
        _object_class: &str,
        uid: &Uid,
        attributes: AttributeSet,
        _options: &OperationOptions,
    ) -> ConnectorResult<Uid> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.log("update");
        *self.last_attributes.lock().unwrap() = Some(attributes.clone());
        *self.last_uid.lock().unwrap() = Some(uid.clone());

        if self.fail_update.load(Ordering::SeqCst) {
            return Err(self.refused("update"));
        }

        let mut objects = self.objects.lock().unwrap();
        let object = objects
            .get_mut(uid.value())
            .ok_or_else(|| ConnectorError::ObjectNotFound {
                identifier: uid.value().to_string(),
            })?;
        if let Some(name) = attributes.name() {
            object.name = name.to_string();
        }
        for (name, value) in attributes.iter() {
            object.attributes.set(name.clone(), value.clone());
        }
        Ok(uid.clone())
    }
}

#[async_trait]
impl DeleteOp for TestConnector {
    async fn delete(
        &self,
        _object_class: &str,
        uid: &Uid,
        _options: &OperationOptions,
    ) -> ConnectorResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.log("delete");
        self.objects.lock().unwrap().remove(uid.value());
        Ok(())
    }
}

#[async_trait]
impl SearchOp for TestConnector {
    async fn get_object(
        &self,
        _object_class: &str,
        uid: &Uid,
        _options: &OperationOptions,
    ) -> ConnectorResult<Option<ConnectorObject>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_search.load(Ordering::SeqCst) {
            return Err(ConnectorError::network("search timed out"));
        }
        Ok(self
            .objects
            .lock()
            .unwrap()
            .values()
            .find(|o| o.uid.value() == uid.value() || o.name == uid.value())
            .cloned())
    }

    async fn search(
        &self,
        _object_class: &str,
        _options: &OperationOptions,
    ) -> ConnectorResult<Vec<ConnectorObject>> {
        Ok(self.objects.lock().unwrap().values().cloned().collect())
    }
}

#[async_trait]
impl SyncOp for TestConnector {
    async fn sync(
        &self,
        _object_class: &str,
        _token: Option<&SyncToken>,
        _handler: &mut (dyn FnMut(SyncDelta) -> bool + Send),
        _options: &OperationOptions,
    ) -> ConnectorResult<()> {
        Ok(())
    }

    async fn latest_sync_token(&self, _object_class: &str) -> ConnectorResult<SyncToken> {
        Ok(SyncToken::default())
    }
}

/// Task store whose writes always fail.
struct BrokenTaskStore;

#[async_trait]
impl TaskStore for BrokenTaskStore {
    async fn save_task(&self, _task: &PropagationTask) -> PropagationResult<()> {
        Err(PropagationError::store("disk full"))
    }

    async fn save_execution(&self, _execution: &TaskExecution) -> PropagationResult<()> {
        Err(PropagationError::store("disk full"))
    }
}

// =============================================================================
// Fixtures
// =============================================================================

fn sync_capabilities() -> CapabilitySet {
    CapabilitySet::new()
        .with(Capability::OnePhaseCreate)
        .with(Capability::OnePhaseUpdate)
        .with(Capability::OnePhaseDelete)
        .with(Capability::Search)
}

fn async_capabilities() -> CapabilitySet {
    CapabilitySet::new()
        .with(Capability::TwoPhaseCreate)
        .with(Capability::TwoPhaseUpdate)
        .with(Capability::TwoPhaseDelete)
        .with(Capability::Search)
}

/// A resource served by the connector instance of the same name, lowercased,
/// with the username as account id.
fn resource(name: &str, priority: i32) -> ExternalResource {
    ExternalResource::new(name, name.to_lowercase())
        .with_priority(priority)
        .with_mapping(AttributeMapping::new(MappingSource::Username, "", "uid").as_account_id())
        .with_mapping(AttributeMapping::new(MappingSource::Plain, "email", "mail"))
}

fn jdoe() -> Identity {
    Identity::new("jdoe").with_plain(
        PlainSchema::new("email", AttributeDataType::String),
        vec!["jdoe@example.com".into()],
    )
}

struct Fixture {
    journal: Journal,
    identities: Arc<InMemoryIdentityStore>,
    directory: Arc<InMemoryResourceDirectory>,
    registry: Arc<ConnectorRegistry>,
    task_store: Arc<InMemoryTaskStore>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            journal: Arc::new(Mutex::new(Vec::new())),
            identities: Arc::new(InMemoryIdentityStore::new()),
            directory: Arc::new(InMemoryResourceDirectory::default()),
            registry: Arc::new(ConnectorRegistry::new()),
            task_store: Arc::new(InMemoryTaskStore::new()),
        }
    }

    fn connector(&self, name: &str) -> TestConnector {
        TestConnector::new(name, self.journal.clone())
    }

    async fn register(
        &self,
        instance: &str,
        capabilities: CapabilitySet,
        connector: TestConnector,
    ) -> Arc<TestConnector> {
        let connector = Arc::new(connector);
        let config = ConnectorInstanceConfig::new(instance).with_capabilities(capabilities);
        self.registry
            .register(config, connector.clone())
            .await
            .unwrap();
        connector
    }

    async fn add_resource(&self, resource: ExternalResource) {
        self.directory.insert(resource).await;
    }

    async fn add_identity(&self, identity: Identity) -> IdentityId {
        let id = identity.id;
        self.identities.insert(identity).await;
        id
    }

    fn manager(&self) -> PropagationManager {
        self.manager_with_store(self.task_store.clone())
    }

    fn manager_with_store(&self, store: Arc<dyn TaskStore>) -> PropagationManager {
        PropagationManager::new(
            self.identities.clone(),
            self.directory.clone(),
            self.registry.clone(),
            store,
        )
    }

    fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }
}

fn creates(resources: &[&str]) -> OperationSet {
    let mut op_set = OperationSet::new();
    op_set.add_all(OperationType::Create, resources.iter().copied());
    op_set
}

// =============================================================================
// Ordering
// =============================================================================

#[tokio::test]
async fn test_tasks_run_in_priority_order() {
    let fx = Fixture::new();
    fx.register("b", sync_capabilities(), fx.connector("B")).await;
    fx.register("a", sync_capabilities(), fx.connector("A")).await;
    fx.add_resource(resource("B", 2)).await;
    fx.add_resource(resource("A", 1)).await;
    let id = fx.add_identity(jdoe()).await;

    let manager = fx.manager();
    let build = manager
        .create_tasks(id, None, creates(&["B", "A"]), None, &[], None)
        .await
        .unwrap();
    assert_eq!(build.resource_order(), vec!["A", "B"]);

    let report = manager.execute(&build.tasks).await.unwrap();
    assert_eq!(report.resource_order(), vec!["A", "B"]);
    assert_eq!(fx.journal(), vec!["A:create", "B:create"]);
}

#[tokio::test]
async fn test_operation_groups_run_create_update_delete() {
    let fx = Fixture::new();
    fx.register("x", sync_capabilities(), fx.connector("X").with_object("jdoe", "jdoe"))
        .await;
    fx.register("y", sync_capabilities(), fx.connector("Y").with_object("jdoe", "jdoe"))
        .await;
    fx.register("z", sync_capabilities(), fx.connector("Z")).await;
    fx.add_resource(resource("X", 1)).await;
    fx.add_resource(resource("Y", 2)).await;
    fx.add_resource(resource("Z", 3)).await;
    let identity = jdoe();

    let op_set = OperationSet::new()
        .with(OperationType::Delete, "X")
        .with(OperationType::Update, "Y")
        .with(OperationType::Create, "Z");

    let manager = fx.manager();
    let build = manager.provision(&identity, None, None, op_set).await.unwrap();
    let operations: Vec<OperationType> = build.tasks.iter().map(|t| t.operation).collect();
    assert_eq!(
        operations,
        vec![OperationType::Create, OperationType::Update, OperationType::Delete]
    );
    assert_eq!(build.resource_order(), vec!["Z", "Y", "X"]);

    manager.execute(&build.tasks).await.unwrap();
    assert_eq!(fx.journal(), vec!["Z:create", "Y:update", "X:delete"]);
}

#[tokio::test]
async fn test_provision_purges_conflicting_operations() {
    let fx = Fixture::new();
    fx.register("r1", sync_capabilities(), fx.connector("R1")).await;
    fx.register("r2", sync_capabilities(), fx.connector("R2")).await;
    fx.add_resource(resource("R1", 1)).await;
    fx.add_resource(resource("R2", 2)).await;

    let op_set = OperationSet::new()
        .with(OperationType::Create, "R1")
        .with(OperationType::Create, "R2")
        .with(OperationType::Update, "R2")
        .with(OperationType::Delete, "R1");

    let build = fx
        .manager()
        .provision(&jdoe(), None, None, op_set)
        .await
        .unwrap();

    let pairs: Vec<(&str, OperationType)> = build
        .tasks
        .iter()
        .map(|t| (t.resource_name(), t.operation))
        .collect();
    assert_eq!(
        pairs,
        vec![("R2", OperationType::Update), ("R1", OperationType::Delete)]
    );
}

// =============================================================================
// Partial failure policy
// =============================================================================

#[tokio::test]
async fn test_primary_sync_failure_aborts_batch() {
    let fx = Fixture::new();
    let a = fx
        .register("a", sync_capabilities(), fx.connector("A").with_create_error())
        .await;
    let b = fx.register("b", sync_capabilities(), fx.connector("B")).await;
    fx.add_resource(resource("A", 1).primary()).await;
    fx.add_resource(resource("B", 2)).await;
    let id = fx.add_identity(jdoe()).await;

    let manager = fx.manager();
    let build = manager
        .create_tasks(id, None, creates(&["A", "B"]), None, &[], None)
        .await
        .unwrap();
    let result = manager.execute(&build.tasks).await;

    match result {
        Err(PropagationError::PrimaryResourceFailed { resource, message }) => {
            assert_eq!(resource, "A");
            assert_eq!(message, "A: Connection refused");
        }
        other => panic!("expected primary failure, got {other:?}"),
    }
    assert_eq!(a.create_calls(), 1);
    assert_eq!(b.create_calls(), 0);
    // The failed execution is still traced.
    assert_eq!(fx.task_store.executions().await[0].status, ExecStatus::Failure);
}

#[tokio::test]
async fn test_non_primary_failure_continues() {
    let fx = Fixture::new();
    fx.register("a", sync_capabilities(), fx.connector("A").with_create_error())
        .await;
    let b = fx.register("b", sync_capabilities(), fx.connector("B")).await;
    fx.add_resource(resource("A", 1)).await;
    fx.add_resource(resource("B", 2)).await;
    let id = fx.add_identity(jdoe()).await;

    let manager = fx.manager();
    let build = manager
        .create_tasks(id, None, creates(&["A", "B"]), None, &[], None)
        .await
        .unwrap();
    let report = manager.execute(&build.tasks).await.unwrap();

    assert_eq!(b.create_calls(), 1);
    assert!(!report.all_succeeded());
    let a_outcome = report.outcome("A").unwrap();
    assert_eq!(a_outcome.status, ExecStatus::Failure);
    assert_eq!(a_outcome.message.as_deref(), Some("A: Connection refused"));
    assert_eq!(report.outcome("B").unwrap().status, ExecStatus::Success);
}

#[tokio::test]
async fn test_async_primary_failure_continues() {
    let fx = Fixture::new();
    fx.register("a", async_capabilities(), fx.connector("A").with_create_error())
        .await;
    let b = fx.register("b", sync_capabilities(), fx.connector("B")).await;
    fx.add_resource(
        resource("A", 1)
            .primary()
            .with_mode(PropagationMode::Async),
    )
    .await;
    fx.add_resource(resource("B", 2)).await;
    let id = fx.add_identity(jdoe()).await;

    let manager = fx.manager();
    let build = manager
        .create_tasks(id, None, creates(&["A", "B"]), None, &[], None)
        .await
        .unwrap();
    let report = manager.execute(&build.tasks).await.unwrap();

    assert_eq!(report.outcome("A").unwrap().status, ExecStatus::Unsubmitted);
    assert_eq!(b.create_calls(), 1);
}

#[tokio::test]
async fn test_ldap_db_end_to_end() {
    let fx = Fixture::new();
    let ldap = fx.register("ldap", sync_capabilities(), fx.connector("LDAP")).await;
    let db = fx
        .register("db", async_capabilities(), fx.connector("DB").with_create_error())
        .await;
    fx.add_resource(resource("LDAP", 1).primary()).await;
    fx.add_resource(resource("DB", 2).with_mode(PropagationMode::Async))
        .await;
    let id = fx
        .add_identity(jdoe().with_resource("LDAP").with_resource("DB"))
        .await;

    let manager = fx.manager();
    let build = manager
        .create_tasks(id, Some(true), creates(&["LDAP", "DB"]), Some("s3cret"), &[], None)
        .await
        .unwrap();
    let report = manager.execute(&build.tasks).await.unwrap();

    assert_eq!(fx.journal(), vec!["LDAP:create", "DB:create"]);
    assert_eq!(report.outcome("LDAP").unwrap().status, ExecStatus::Success);
    assert_eq!(report.outcome("DB").unwrap().status, ExecStatus::Unsubmitted);
    assert_eq!(ldap.object_count(), 1);
    assert_eq!(db.object_count(), 0);

    let sent = ldap.last_attributes();
    assert_eq!(sent.name(), Some("jdoe"));
    assert_eq!(sent.get_string("mail"), Some("jdoe@example.com"));
    assert_eq!(sent.get(ENABLE), Some(&AttributeValue::Boolean(true)));
    // Name equals the account id: no explicit identifier.
    assert!(!sent.has(UID));
}

// =============================================================================
// Tracing
// =============================================================================

#[tokio::test]
async fn test_trace_levels() {
    let fx = Fixture::new();
    for name in ["none", "failures", "all", "failures_bad"] {
        let connector = if name == "failures_bad" {
            fx.connector(name).with_create_error()
        } else {
            fx.connector(name)
        };
        fx.register(name, sync_capabilities(), connector).await;
    }
    fx.add_resource(resource("NONE", 1).with_trace_level(TraceLevel::None))
        .await;
    fx.add_resource(resource("FAILURES", 2).with_trace_level(TraceLevel::Failures))
        .await;
    fx.add_resource(resource("ALL", 3).with_trace_level(TraceLevel::All))
        .await;
    fx.add_resource(resource("FAILURES_BAD", 4).with_trace_level(TraceLevel::Failures))
        .await;
    let id = fx.add_identity(jdoe()).await;

    let manager = fx.manager();
    let build = manager
        .create_tasks(
            id,
            None,
            creates(&["NONE", "FAILURES", "ALL", "FAILURES_BAD"]),
            None,
            &[],
            None,
        )
        .await
        .unwrap();
    let report = manager.execute(&build.tasks).await.unwrap();

    assert!(!report.outcome("NONE").unwrap().recorded);
    assert!(!report.outcome("FAILURES").unwrap().recorded);
    assert!(report.outcome("ALL").unwrap().recorded);
    assert!(report.outcome("FAILURES_BAD").unwrap().recorded);

    let tasks = fx.task_store.tasks().await;
    let recorded: Vec<&str> = tasks.iter().map(|t| t.resource_name()).collect();
    assert_eq!(recorded, vec!["ALL", "FAILURES_BAD"]);
    assert_eq!(fx.task_store.executions().await.len(), 2);
}

#[tokio::test]
async fn test_store_failure_does_not_abort() {
    let fx = Fixture::new();
    let a = fx.register("a", sync_capabilities(), fx.connector("A")).await;
    let b = fx.register("b", sync_capabilities(), fx.connector("B")).await;
    fx.add_resource(resource("A", 1).primary()).await;
    fx.add_resource(resource("B", 2)).await;
    let id = fx.add_identity(jdoe()).await;

    let manager = fx.manager_with_store(Arc::new(BrokenTaskStore));
    let build = manager
        .create_tasks(id, None, creates(&["A", "B"]), None, &[], None)
        .await
        .unwrap();
    let report = manager.execute(&build.tasks).await.unwrap();

    assert!(report.all_succeeded());
    assert!(report.outcomes.iter().all(|o| !o.recorded));
    assert_eq!(a.create_calls() + b.create_calls(), 2);
}

#[tokio::test]
async fn test_message_truncated_to_configured_length() {
    let fx = Fixture::new();
    fx.register("a", sync_capabilities(), fx.connector("A").with_create_error())
        .await;
    fx.add_resource(resource("A", 1)).await;
    let id = fx.add_identity(jdoe()).await;

    let manager = fx
        .manager()
        .with_config(PropagationConfig::new().with_max_message_length(8));
    let build = manager
        .create_tasks(id, None, creates(&["A"]), None, &[], None)
        .await
        .unwrap();
    let report = manager.execute(&build.tasks).await.unwrap();

    assert_eq!(report.outcome("A").unwrap().message.as_deref(), Some("A: Conne"));
}

// =============================================================================
// Capability gating
// =============================================================================

#[tokio::test]
async fn test_unsupported_operation_is_not_attempted() {
    let fx = Fixture::new();
    let capabilities = CapabilitySet::new()
        .with(Capability::TwoPhaseCreate)
        .with(Capability::Search);
    let a = fx.register("a", capabilities, fx.connector("A")).await;
    fx.add_resource(resource("A", 1).primary()).await;
    let id = fx.add_identity(jdoe()).await;

    let manager = fx.manager();
    let build = manager
        .create_tasks(id, None, creates(&["A"]), None, &[], None)
        .await
        .unwrap();
    let report = manager.execute(&build.tasks).await.unwrap();

    let outcome = report.outcome("A").unwrap();
    assert_eq!(a.create_calls(), 0);
    assert!(outcome.attempted.is_empty());
    assert!(!outcome.attempted.contains(OperationType::Create));
    assert_eq!(outcome.status, ExecStatus::Success);
    assert!(!outcome.recorded);
    assert!(fx.task_store.tasks().await.is_empty());
}

// =============================================================================
// Create vs. update
// =============================================================================

#[tokio::test]
async fn test_existing_object_is_updated_without_rename() {
    let fx = Fixture::new();
    let a = fx
        .register("a", sync_capabilities(), fx.connector("A").with_object("1001", "jdoe"))
        .await;
    fx.add_resource(resource("A", 1)).await;
    let id = fx.add_identity(jdoe()).await;

    let manager = fx.manager();
    let build = manager
        .create_tasks(id, None, creates(&["A"]), None, &[], None)
        .await
        .unwrap();
    manager.execute(&build.tasks).await.unwrap();

    assert_eq!(a.create_calls(), 0);
    assert_eq!(a.update_calls(), 1);
    assert_eq!(a.last_uid().value(), "1001");
    let sent = a.last_attributes();
    assert!(!sent.has(NAME));
    assert!(sent.has("mail"));
}

#[tokio::test]
async fn test_unchanged_remote_object_is_left_alone() {
    let fx = Fixture::new();
    let a = fx
        .register(
            "a",
            sync_capabilities(),
            fx.connector("A").with_object_attributes(
                "1001",
                "jdoe",
                AttributeSet::new().with("mail", "jdoe@example.com"),
            ),
        )
        .await;
    fx.add_resource(resource("A", 1)).await;
    let id = fx.add_identity(jdoe().with_resource("A")).await;

    let manager = fx.manager();
    let build = manager
        .update_tasks(id, None, &BTreeSet::new(), &[], None, OperationSet::new(), None)
        .await
        .unwrap();
    let report = manager.execute(&build.tasks).await.unwrap();

    let outcome = report.outcome("A").unwrap();
    assert_eq!(a.update_calls(), 0);
    assert_eq!(outcome.status, ExecStatus::Success);
    assert!(outcome.attempted.is_empty());
    assert!(!outcome.recorded);
}

#[tokio::test]
async fn test_update_sends_only_changed_attributes() {
    let fx = Fixture::new();
    let a = fx
        .register(
            "a",
            sync_capabilities(),
            fx.connector("A").with_object_attributes(
                "1001",
                "jdoe",
                AttributeSet::new()
                    .with("mail", "jdoe@example.com")
                    .with("cn", "Johnny"),
            ),
        )
        .await;
    fx.add_resource(
        resource("A", 1).with_mapping(AttributeMapping::new(MappingSource::Plain, "cn", "cn")),
    )
    .await;
    let identity = jdoe()
        .with_plain(
            PlainSchema::new("cn", AttributeDataType::String),
            vec!["John Doe".into()],
        )
        .with_resource("A");
    let id = fx.add_identity(identity).await;

    let manager = fx.manager();
    let build = manager
        .update_tasks(id, None, &BTreeSet::new(), &[], None, OperationSet::new(), None)
        .await
        .unwrap();
    manager.execute(&build.tasks).await.unwrap();

    assert_eq!(a.update_calls(), 1);
    let sent = a.last_attributes();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent.get_string("cn"), Some("John Doe"));
}

#[tokio::test]
async fn test_rename_uses_old_account_id() {
    let fx = Fixture::new();
    let a = fx
        .register("a", sync_capabilities(), fx.connector("A").with_object("1001", "johnd"))
        .await;
    fx.add_resource(resource("A", 1)).await;
    let id = fx.add_identity(jdoe().with_resource("A")).await;

    let mut op_set = OperationSet::new().with(OperationType::Update, "A");
    op_set.set_old_account_id("A", "johnd");

    let manager = fx.manager();
    let build = manager
        .update_tasks(id, None, &BTreeSet::new(), &[], None, op_set, None)
        .await
        .unwrap();
    assert_eq!(build.tasks[0].lookup_account_id(), "johnd");

    manager.execute(&build.tasks).await.unwrap();
    assert_eq!(a.last_uid().value(), "1001");
    assert_eq!(a.last_attributes().name(), Some("jdoe"));
}

#[tokio::test]
async fn test_account_link_creates_with_explicit_uid() {
    let fx = Fixture::new();
    let a = fx.register("a", sync_capabilities(), fx.connector("A")).await;
    fx.add_resource(resource("A", 1).with_account_link("uid=${username},ou=people"))
        .await;
    let id = fx.add_identity(jdoe()).await;

    let manager = fx.manager();
    let build = manager
        .create_tasks(id, None, creates(&["A"]), Some("s3cret"), &[], None)
        .await
        .unwrap();
    manager.execute(&build.tasks).await.unwrap();

    let sent = a.last_attributes();
    assert_eq!(sent.name(), Some("uid=jdoe,ou=people"));
    assert_eq!(sent.uid(), Some("jdoe"));
}

#[tokio::test]
async fn test_entries_sharing_external_name_send_every_value() {
    let fx = Fixture::new();
    let a = fx.register("a", sync_capabilities(), fx.connector("A")).await;
    fx.add_resource(
        resource("A", 1).with_mapping(AttributeMapping::new(MappingSource::Plain, "altmail", "mail")),
    )
    .await;
    let identity = jdoe().with_plain(
        PlainSchema::new("altmail", AttributeDataType::String),
        vec!["john@alt.example".into()],
    );
    let id = fx.add_identity(identity).await;

    let manager = fx.manager();
    let build = manager
        .create_tasks(id, None, creates(&["A"]), None, &[], None)
        .await
        .unwrap();
    manager.execute(&build.tasks).await.unwrap();

    assert_eq!(
        a.last_attributes().get_strings("mail"),
        Some(vec!["jdoe@example.com", "john@alt.example"])
    );
}

#[tokio::test]
async fn test_credential_is_sent_guarded() {
    let fx = Fixture::new();
    let a = fx.register("a", sync_capabilities(), fx.connector("A")).await;
    fx.add_resource(resource("A", 1).with_mapping(
        AttributeMapping::new(MappingSource::Credential, "", "userPassword").as_credential(),
    ))
    .await;
    let id = fx.add_identity(jdoe()).await;

    let manager = fx.manager();
    let build = manager
        .create_tasks(id, None, creates(&["A"]), Some("s3cret"), &[], None)
        .await
        .unwrap();
    manager.execute(&build.tasks).await.unwrap();

    let sent = a.last_attributes();
    let password = sent.get(PASSWORD).and_then(AttributeValue::as_guarded).unwrap();
    assert_eq!(password.expose(), "s3cret");
    assert!(!format!("{:?}", build.tasks[0]).contains("s3cret"));
}

#[tokio::test]
async fn test_probe_failure_falls_back_to_create() {
    let fx = Fixture::new();
    let a = fx
        .register(
            "a",
            sync_capabilities(),
            fx.connector("A").with_object("jdoe", "jdoe").with_search_error(),
        )
        .await;
    fx.add_resource(resource("A", 1)).await;
    let id = fx.add_identity(jdoe()).await;

    let manager = fx.manager();
    let build = manager
        .create_tasks(id, None, creates(&["A"]), None, &[], None)
        .await
        .unwrap();
    let report = manager.execute(&build.tasks).await.unwrap();

    assert_eq!(a.update_calls(), 0);
    assert_eq!(a.create_calls(), 1);
    assert!(report.outcome("A").unwrap().attempted.contains(OperationType::Create));
}

#[tokio::test]
async fn test_update_failure_on_existing_object() {
    let fx = Fixture::new();
    fx.register(
        "a",
        sync_capabilities(),
        fx.connector("A").with_object("jdoe", "jdoe").with_update_error(),
    )
    .await;
    fx.add_resource(resource("A", 1)).await;
    let id = fx.add_identity(jdoe().with_resource("A")).await;

    let manager = fx.manager();
    let build = manager
        .update_tasks(id, None, &BTreeSet::new(), &[], None, OperationSet::new(), None)
        .await
        .unwrap();
    let report = manager.execute(&build.tasks).await.unwrap();

    let outcome = report.outcome("A").unwrap();
    assert_eq!(outcome.status, ExecStatus::Failure);
    assert!(outcome.attempted.contains(OperationType::Update));
}

// =============================================================================
// Delete
// =============================================================================

#[tokio::test]
async fn test_delete_missing_object_is_noop() {
    let fx = Fixture::new();
    let a = fx.register("a", sync_capabilities(), fx.connector("A")).await;
    fx.add_resource(resource("A", 1)).await;
    let id = fx.add_identity(jdoe().with_resource("A")).await;

    let manager = fx.manager();
    let build = manager.delete_tasks(id, None).await.unwrap();
    let report = manager.execute(&build.tasks).await.unwrap();

    let outcome = report.outcome("A").unwrap();
    assert_eq!(outcome.status, ExecStatus::Success);
    assert!(outcome.attempted.is_empty());
    assert_eq!(a.delete_calls(), 0);
}

#[tokio::test]
async fn test_delete_of_still_assigned_resource_updates_instead() {
    let fx = Fixture::new();
    let a = fx
        .register("a", sync_capabilities(), fx.connector("A").with_object("1001", "jdoe"))
        .await;
    fx.add_resource(resource("A", 1)).await;
    // Still assigned to A, e.g. through another membership.
    let id = fx.add_identity(jdoe().with_resource("A")).await;

    let op_set = OperationSet::new().with(OperationType::Delete, "A");
    let manager = fx.manager();
    let build = manager
        .update_tasks(id, None, &BTreeSet::new(), &[], None, op_set, None)
        .await
        .unwrap();
    assert_eq!(build.tasks[0].operation, OperationType::Delete);

    let report = manager.execute(&build.tasks).await.unwrap();
    let outcome = report.outcome("A").unwrap();
    assert_eq!(a.delete_calls(), 0);
    assert_eq!(a.update_calls(), 1);
    assert_eq!(a.last_attributes().get_string("mail"), Some("jdoe@example.com"));
    assert!(outcome.attempted.contains(OperationType::Update));
    assert!(!outcome.attempted.contains(OperationType::Delete));
    assert_eq!(a.object_count(), 1);
}

#[tokio::test]
async fn test_delete_of_unassigned_resource() {
    let fx = Fixture::new();
    let a = fx
        .register("a", sync_capabilities(), fx.connector("A").with_object("jdoe", "jdoe"))
        .await;
    fx.add_resource(resource("A", 1)).await;
    let id = fx.add_identity(jdoe()).await;

    let op_set = OperationSet::new().with(OperationType::Delete, "A");
    let manager = fx.manager();
    let build = manager
        .update_tasks(id, None, &BTreeSet::new(), &[], None, op_set, None)
        .await
        .unwrap();
    manager.execute(&build.tasks).await.unwrap();

    assert_eq!(a.delete_calls(), 1);
    assert_eq!(a.object_count(), 0);
}

#[tokio::test]
async fn test_delete_tasks_skip_sync_resource() {
    let fx = Fixture::new();
    let a = fx
        .register("a", sync_capabilities(), fx.connector("A").with_object("jdoe", "jdoe"))
        .await;
    let b = fx
        .register("b", sync_capabilities(), fx.connector("B").with_object("jdoe", "jdoe"))
        .await;
    fx.add_resource(resource("A", 1)).await;
    fx.add_resource(resource("B", 2)).await;
    let id = fx
        .add_identity(jdoe().with_resource("A").with_resource("B"))
        .await;

    let manager = fx.manager();
    let build = manager.delete_tasks(id, Some("B")).await.unwrap();
    assert_eq!(build.resource_order(), vec!["A"]);
    assert_eq!(build.tasks[0].attributes.len(), 1);

    manager.execute(&build.tasks).await.unwrap();
    assert_eq!(a.delete_calls(), 1);
    assert_eq!(a.object_count(), 0);
    assert_eq!(b.delete_calls(), 0);
}

// =============================================================================
// Task building
// =============================================================================

#[tokio::test]
async fn test_missing_account_id_skips_only_that_resource() {
    let fx = Fixture::new();
    fx.register("ldap", sync_capabilities(), fx.connector("LDAP")).await;
    fx.register("db", sync_capabilities(), fx.connector("DB")).await;
    fx.add_resource(resource("LDAP", 1)).await;
    fx.add_resource(
        ExternalResource::new("DB", "db").with_mapping(
            AttributeMapping::new(MappingSource::Plain, "phone", "phone").as_account_id(),
        ),
    )
    .await;
    let id = fx.add_identity(jdoe()).await;

    let build = fx
        .manager()
        .create_tasks(id, None, creates(&["LDAP", "DB"]), None, &[], None)
        .await
        .unwrap();

    assert_eq!(build.resource_order(), vec!["LDAP"]);
    assert_eq!(build.skipped, vec!["DB".to_string()]);
}

#[tokio::test]
async fn test_unknown_resource_aborts_request() {
    let fx = Fixture::new();
    fx.register("ldap", sync_capabilities(), fx.connector("LDAP")).await;
    fx.add_resource(resource("LDAP", 1)).await;
    let id = fx.add_identity(jdoe()).await;

    let result = fx
        .manager()
        .create_tasks(id, None, creates(&["LDAP", "HR"]), None, &[], None)
        .await;
    assert!(matches!(
        result,
        Err(PropagationError::ResourceNotFound { ref name }) if name == "HR"
    ));
}

#[tokio::test]
async fn test_missing_connector_aborts_request() {
    let fx = Fixture::new();
    fx.add_resource(resource("LDAP", 1)).await;
    let id = fx.add_identity(jdoe()).await;

    let result = fx
        .manager()
        .create_tasks(id, None, creates(&["LDAP"]), None, &[], None)
        .await;
    assert!(matches!(
        result,
        Err(PropagationError::ConnectorNotFound { ref resource }) if resource == "LDAP"
    ));
}

#[tokio::test]
async fn test_unknown_identity() {
    let fx = Fixture::new();
    let result = fx
        .manager()
        .create_tasks(IdentityId::new(), None, creates(&["LDAP"]), None, &[], None)
        .await;
    assert!(matches!(result, Err(PropagationError::IdentityNotFound { .. })));
}

#[tokio::test]
async fn test_create_tasks_skip_sync_resource_and_empty_set() {
    let fx = Fixture::new();
    fx.register("a", sync_capabilities(), fx.connector("A")).await;
    fx.register("b", sync_capabilities(), fx.connector("B")).await;
    fx.add_resource(resource("A", 1)).await;
    fx.add_resource(resource("B", 2)).await;
    let id = fx.add_identity(jdoe()).await;
    let manager = fx.manager();

    let build = manager
        .create_tasks(id, None, creates(&["A", "B"]), None, &[], Some("A"))
        .await
        .unwrap();
    assert_eq!(build.resource_order(), vec!["B"]);

    let build = manager
        .create_tasks(id, None, OperationSet::new(), None, &[], None)
        .await
        .unwrap();
    assert!(build.is_empty());
}

#[tokio::test]
async fn test_update_tasks_default_to_every_associated_resource() {
    let fx = Fixture::new();
    fx.register("a", sync_capabilities(), fx.connector("A")).await;
    fx.register("b", sync_capabilities(), fx.connector("B")).await;
    fx.register("c", sync_capabilities(), fx.connector("C")).await;
    fx.add_resource(resource("A", 1)).await;
    fx.add_resource(resource("B", 2)).await;
    fx.add_resource(resource("C", 3)).await;
    let id = fx
        .add_identity(jdoe().with_resource("A").with_resource("B").with_resource("C"))
        .await;

    let build = fx
        .manager()
        .update_tasks(id, None, &BTreeSet::new(), &[], None, OperationSet::new(), Some("C"))
        .await
        .unwrap();

    assert_eq!(build.resource_order(), vec!["A", "B"]);
    assert!(build.tasks.iter().all(|t| t.operation == OperationType::Update));
}

#[tokio::test]
async fn test_update_tasks_follow_virtual_attribute_changes() {
    let fx = Fixture::new();
    fx.register("ldap", sync_capabilities(), fx.connector("LDAP")).await;
    fx.register("db", sync_capabilities(), fx.connector("DB")).await;
    fx.add_resource(resource("LDAP", 1).with_mapping(
        AttributeMapping::new(MappingSource::Virtual, "groups", "memberOf").as_multivalue(),
    ))
    .await;
    fx.add_resource(resource("DB", 2)).await;
    let id = fx
        .add_identity(jdoe().with_resource("LDAP").with_resource("DB"))
        .await;

    // The caller only asks for DB; the group change pulls LDAP in.
    let op_set = OperationSet::new().with(OperationType::Update, "DB");
    let mods = vec![VirtualAttributeMod::new("groups").add("admins")];

    let build = fx
        .manager()
        .update_tasks(id, None, &BTreeSet::new(), &mods, None, op_set, None)
        .await
        .unwrap();

    assert_eq!(build.resource_order(), vec!["LDAP", "DB"]);
    let groups = build.tasks[0].attributes.get("memberOf").unwrap();
    assert_eq!(groups, &AttributeValue::from(vec!["admins"]));
}

#[tokio::test]
async fn test_resources_loaded_from_json() {
    let fx = Fixture::new();
    let ldap = fx.register("ldap-main", sync_capabilities(), fx.connector("LDAP")).await;
    let directory = InMemoryResourceDirectory::from_json(
        &json!([{
            "name": "LDAP",
            "connector": "ldap-main",
            "priority": 1,
            "primary": true,
            "account_link": "uid=${username},ou=people",
            "mappings": [
                { "source": "USERNAME", "account_id": true },
                { "source": "PLAIN", "int_attr_name": "email", "ext_attr_name": "mail" }
            ]
        }])
        .to_string(),
    )
    .unwrap();
    let id = fx.add_identity(jdoe()).await;

    let manager = PropagationManager::new(
        fx.identities.clone(),
        Arc::new(directory),
        fx.registry.clone(),
        fx.task_store.clone(),
    );
    let build = manager
        .create_tasks(id, None, creates(&["LDAP"]), None, &[], None)
        .await
        .unwrap();
    manager.execute(&build.tasks).await.unwrap();

    assert_eq!(ldap.last_attributes().name(), Some("uid=jdoe,ou=people"));
}

// =============================================================================
// Transaction boundary
// =============================================================================

#[tokio::test]
async fn test_rollback_keeps_remote_side_effects() {
    let fx = Fixture::new();
    let a = fx.register("a", sync_capabilities(), fx.connector("A")).await;
    fx.add_resource(resource("A", 1)).await;
    let id = fx.add_identity(jdoe()).await;

    let tx = Arc::new(TransactionalTaskStore::new(fx.task_store.clone()));
    let manager = fx.manager_with_store(tx.clone());

    let build = manager
        .create_tasks(id, None, creates(&["A"]), None, &[], None)
        .await
        .unwrap();
    let report = manager.execute(&build.tasks).await.unwrap();
    assert!(report.outcome("A").unwrap().recorded);
    assert_eq!(tx.pending().await, 2);

    tx.rollback().await;

    // Nothing durable, but the remote object exists.
    assert!(fx.task_store.tasks().await.is_empty());
    assert!(fx.task_store.executions().await.is_empty());
    assert_eq!(a.object_count(), 1);

    // Replaying the request reaches the resource again (at-least-once).
    fx.add_identity(
        Identity::new("jdoe").with_id(id).with_plain(
            PlainSchema::new("email", AttributeDataType::String),
            vec!["john.doe@example.com".into()],
        ),
    )
    .await;
    let build = manager
        .create_tasks(id, None, creates(&["A"]), None, &[], None)
        .await
        .unwrap();
    manager.execute(&build.tasks).await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(a.create_calls(), 1);
    assert_eq!(a.update_calls(), 1);
    let sent = a.last_attributes();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent.get_string("mail"), Some("john.doe@example.com"));
    assert_eq!(fx.task_store.tasks().await.len(), 1);
}
