//! Capability-gated access to a connector instance
//!
//! The gateway is the only path from the propagation engine to a connector.
//! Every mutating call is checked against the instance's declared
//! capabilities first; a call the connector did not declare is a silent
//! no-op that leaves [`AttemptedOperations`] untouched.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::capability::{required_capability, Capability, CapabilitySet};
use crate::config::ConnectorInstanceConfig;
use crate::error::ConnectorResult;
use crate::operation::{
    AttributeSet, AttributeValue, ConnectorObject, OperationOptions, SyncDelta, SyncToken, Uid,
    ENABLE, NAME, PASSWORD,
};
use crate::traits::FullConnector;
use crate::types::{OperationType, PropagationMode};

/// Operations actually handed to the connector during one task.
///
/// An operation is recorded before the connector is called, so a failed call
/// still counts as attempted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttemptedOperations(BTreeSet<OperationType>);

impl AttemptedOperations {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an attempted operation.
    pub fn insert(&mut self, operation: OperationType) {
        self.0.insert(operation);
    }

    /// Check whether an operation was attempted.
    #[must_use]
    pub fn contains(&self, operation: OperationType) -> bool {
        self.0.contains(&operation)
    }

    /// True when nothing reached the connector.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over attempted operations.
    pub fn iter(&self) -> impl Iterator<Item = OperationType> + '_ {
        self.0.iter().copied()
    }
}

/// A live connector instance wrapped with its declared capabilities.
pub struct ConnectorGateway {
    config: ConnectorInstanceConfig,
    connector: Arc<dyn FullConnector>,
}

impl fmt::Debug for ConnectorGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorGateway")
            .field("name", &self.config.name)
            .field("connector", &self.connector.display_name())
            .field("capabilities", &self.config.capabilities)
            .finish()
    }
}

impl ConnectorGateway {
    /// Wrap a connector, validating its configuration first.
    pub fn new(
        config: ConnectorInstanceConfig,
        connector: Arc<dyn FullConnector>,
    ) -> ConnectorResult<Self> {
        config.validate()?;
        connector.validate()?;
        debug!(
            instance = %config.name,
            capabilities = %config.capabilities,
            "connector instance ready"
        );
        Ok(Self { config, connector })
    }

    /// Instance name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Instance configuration.
    #[must_use]
    pub fn config(&self) -> &ConnectorInstanceConfig {
        &self.config
    }

    /// Declared capabilities.
    #[must_use]
    pub fn capabilities(&self) -> &CapabilitySet {
        &self.config.capabilities
    }

    fn allows(&self, operation: OperationType, mode: PropagationMode) -> bool {
        let capability = required_capability(operation, mode);
        if self.config.capabilities.contains(capability) {
            true
        } else {
            info!(
                instance = %self.config.name,
                operation = %operation,
                mode = %mode,
                "{} was attempted, although the connector only has these capabilities: {}. No action.",
                capability,
                self.config.capabilities
            );
            false
        }
    }

    fn can(&self, capability: Capability, what: &str) -> bool {
        if self.config.capabilities.contains(capability) {
            true
        } else {
            info!(
                instance = %self.config.name,
                "{} was attempted, although the connector only has these capabilities: {}. No action.",
                what,
                self.config.capabilities
            );
            false
        }
    }

    /// Create an object.
    ///
    /// Returns `None` when the connector does not declare the capability for
    /// `mode`.
    pub async fn create(
        &self,
        mode: PropagationMode,
        object_class: &str,
        attributes: AttributeSet,
        options: &OperationOptions,
        attempted: &mut AttemptedOperations,
    ) -> ConnectorResult<Option<Uid>> {
        if !self.allows(OperationType::Create, mode) {
            return Ok(None);
        }
        attempted.insert(OperationType::Create);
        let uid = self
            .connector
            .create(object_class, attributes, options)
            .await?;
        Ok(Some(uid))
    }

    /// Update an object.
    ///
    /// Returns `None` when the connector does not declare the capability for
    /// `mode`.
    pub async fn update(
        &self,
        mode: PropagationMode,
        object_class: &str,
        uid: &Uid,
        attributes: AttributeSet,
        options: &OperationOptions,
        attempted: &mut AttemptedOperations,
    ) -> ConnectorResult<Option<Uid>> {
        if !self.allows(OperationType::Update, mode) {
            return Ok(None);
        }
        attempted.insert(OperationType::Update);
        let uid = self
            .connector
            .update(object_class, uid, attributes, options)
            .await?;
        Ok(Some(uid))
    }

    /// Delete an object; a no-op when the capability for `mode` is missing.
    pub async fn delete(
        &self,
        mode: PropagationMode,
        object_class: &str,
        uid: &Uid,
        options: &OperationOptions,
        attempted: &mut AttemptedOperations,
    ) -> ConnectorResult<()> {
        if !self.allows(OperationType::Delete, mode) {
            return Ok(());
        }
        attempted.insert(OperationType::Delete);
        self.connector.delete(object_class, uid, options).await
    }

    /// Read a remote object.
    ///
    /// Requires `SEARCH`. When the read is done on behalf of a pending create
    /// or update in a given mode, the capability for that operation and mode
    /// is required as well.
    pub async fn get_object(
        &self,
        mode: Option<PropagationMode>,
        operation: Option<OperationType>,
        object_class: &str,
        uid: &Uid,
        options: &OperationOptions,
    ) -> ConnectorResult<Option<ConnectorObject>> {
        if !self.can(Capability::Search, "SEARCH") {
            return Ok(None);
        }

        let gated = match (operation, mode) {
            (Some(op @ (OperationType::Create | OperationType::Update)), Some(mode)) => {
                self.config.capabilities.supports(op, mode)
            }
            _ => true,
        };
        if !gated {
            debug!(
                instance = %self.config.name,
                "object lookup skipped, pending operation is not supported in this mode"
            );
            return Ok(None);
        }

        self.connector.get_object(object_class, uid, options).await
    }

    /// Read one attribute of a remote object.
    pub async fn get_object_attribute(
        &self,
        mode: Option<PropagationMode>,
        operation: Option<OperationType>,
        object_class: &str,
        uid: &Uid,
        attribute_name: &str,
    ) -> ConnectorResult<Option<AttributeValue>> {
        let options = OperationOptions::new().with_attributes_to_get(vec![attribute_name.to_string()]);
        let object = self
            .get_object(mode, operation, object_class, uid, &options)
            .await?;
        Ok(object.and_then(|o| o.attribute(attribute_name)))
    }

    /// Read several attributes of a remote object.
    ///
    /// Attributes absent from the remote object are absent from the result.
    pub async fn get_object_attributes(
        &self,
        mode: Option<PropagationMode>,
        operation: Option<OperationType>,
        object_class: &str,
        uid: &Uid,
        attribute_names: &[String],
    ) -> ConnectorResult<AttributeSet> {
        let options = OperationOptions::new().with_attributes_to_get(attribute_names.to_vec());
        let Some(object) = self
            .get_object(mode, operation, object_class, uid, &options)
            .await?
        else {
            return Ok(AttributeSet::new());
        };

        Ok(attribute_names
            .iter()
            .filter_map(|name| object.attribute(name).map(|value| (name.clone(), value)))
            .collect())
    }

    /// Collect the changes recorded after `token`. Requires `SYNC`.
    pub async fn sync(
        &self,
        object_class: &str,
        token: Option<&SyncToken>,
        options: &OperationOptions,
    ) -> ConnectorResult<Vec<SyncDelta>> {
        if !self.can(Capability::Sync, "sync") {
            return Ok(Vec::new());
        }

        let mut deltas = Vec::new();
        let mut handler = |delta: SyncDelta| {
            deltas.push(delta);
            true
        };
        self.connector
            .sync(object_class, token, &mut handler, options)
            .await?;
        Ok(deltas)
    }

    /// The current change-log position. Requires `SYNC`.
    pub async fn latest_sync_token(&self, object_class: &str) -> ConnectorResult<Option<SyncToken>> {
        if !self.can(Capability::Sync, "latest sync token retrieval") {
            return Ok(None);
        }
        self.connector.latest_sync_token(object_class).await.map(Some)
    }

    /// Every object of a class as a create-or-update delta with an empty token.
    ///
    /// Requires `SEARCH`. Errors are logged and yield an empty list.
    pub async fn get_all_objects(
        &self,
        object_class: &str,
        options: &OperationOptions,
    ) -> Vec<SyncDelta> {
        if !self.can(Capability::Search, "SEARCH") {
            return Vec::new();
        }

        match self.connector.search(object_class, options).await {
            Ok(objects) => objects
                .into_iter()
                .map(|object| SyncDelta::create_or_update(SyncToken::default(), object))
                .collect(),
            Err(e) => {
                warn!(
                    instance = %self.config.name,
                    error = %e,
                    error_code = e.error_code(),
                    transient = e.is_transient(),
                    "while retrieving all objects"
                );
                Vec::new()
            }
        }
    }

    /// Attribute names exposed by the connector over every object class.
    ///
    /// The operational attributes `__NAME__`, `__PASSWORD__` and `__ENABLE__`
    /// are left out unless `show_all` is set. Errors yield an empty set.
    pub async fn schema(&self, show_all: bool) -> BTreeSet<String> {
        match self.connector.schema().await {
            Ok(schema) => schema
                .attribute_names()
                .filter(|name| show_all || !matches!(*name, NAME | PASSWORD | ENABLE))
                .map(str::to_string)
                .collect(),
            Err(e) => {
                warn!(
                    instance = %self.config.name,
                    error = %e,
                    error_code = e.error_code(),
                    transient = e.is_transient(),
                    "while reading the connector schema"
                );
                BTreeSet::new()
            }
        }
    }

    /// Validate the connector configuration.
    pub fn validate(&self) -> ConnectorResult<()> {
        self.connector.validate()
    }

    /// Check that the external resource is reachable.
    pub async fn test(&self) -> ConnectorResult<()> {
        self.connector.test().await
    }

    /// Release the connector.
    pub async fn dispose(&self) -> ConnectorResult<()> {
        self.connector.dispose().await
    }
}
