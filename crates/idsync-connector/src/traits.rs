//! Connector SPI traits
//!
//! Capability-based trait definitions. A connector implements the operation
//! traits it can run; which (operation, mode) combinations it actually
//! accepts at runtime is declared separately in its capability set.

use async_trait::async_trait;

use crate::error::ConnectorResult;
use crate::operation::{AttributeSet, ConnectorObject, OperationOptions, SyncDelta, SyncToken, Uid};
use crate::schema::Schema;

/// Base trait for all connectors.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Get the display name for this connector instance.
    fn display_name(&self) -> &str;

    /// Validate the connector configuration.
    ///
    /// Called once when the connector is wrapped in a gateway.
    fn validate(&self) -> ConnectorResult<()> {
        Ok(())
    }

    /// Test the connection to the external resource.
    async fn test(&self) -> ConnectorResult<()>;

    /// Dispose of connector resources.
    async fn dispose(&self) -> ConnectorResult<()> {
        Ok(())
    }
}

/// Capability for reporting the schema of the external resource.
#[async_trait]
pub trait SchemaDiscovery: Connector {
    /// Discover the schema from the external resource.
    async fn schema(&self) -> ConnectorResult<Schema>;
}

/// Capability for creating objects on the external resource.
#[async_trait]
pub trait CreateOp: Connector {
    /// Create a new object.
    ///
    /// # Returns
    /// The UID assigned by the external resource.
    async fn create(
        &self,
        object_class: &str,
        attributes: AttributeSet,
        options: &OperationOptions,
    ) -> ConnectorResult<Uid>;
}

/// Capability for updating objects on the external resource.
#[async_trait]
pub trait UpdateOp: Connector {
    /// Replace the given attributes of an existing object.
    ///
    /// # Returns
    /// The UID of the updated object, which differs from `uid` after a rename
    /// on resources that key objects by name.
    async fn update(
        &self,
        object_class: &str,
        uid: &Uid,
        attributes: AttributeSet,
        options: &OperationOptions,
    ) -> ConnectorResult<Uid>;
}

/// Capability for deleting objects from the external resource.
#[async_trait]
pub trait DeleteOp: Connector {
    /// Delete an object.
    async fn delete(
        &self,
        object_class: &str,
        uid: &Uid,
        options: &OperationOptions,
    ) -> ConnectorResult<()>;
}

/// Capability for reading objects from the external resource.
#[async_trait]
pub trait SearchOp: Connector {
    /// Get a single object by its UID, `None` when it does not exist.
    async fn get_object(
        &self,
        object_class: &str,
        uid: &Uid,
        options: &OperationOptions,
    ) -> ConnectorResult<Option<ConnectorObject>>;

    /// Read every object of a class.
    async fn search(
        &self,
        object_class: &str,
        options: &OperationOptions,
    ) -> ConnectorResult<Vec<ConnectorObject>>;
}

/// Capability for reading changes from the external resource.
#[async_trait]
pub trait SyncOp: Connector {
    /// Feed every change after `token` to `handler`, in order.
    ///
    /// Stops early when the handler returns `false`.
    async fn sync(
        &self,
        object_class: &str,
        token: Option<&SyncToken>,
        handler: &mut (dyn FnMut(SyncDelta) -> bool + Send),
        options: &OperationOptions,
    ) -> ConnectorResult<()>;

    /// The current position of the change log.
    async fn latest_sync_token(&self, object_class: &str) -> ConnectorResult<SyncToken>;
}

/// A connector implementing every operation trait.
///
/// The gateway holds connectors through this trait; runtime availability of
/// each operation is still governed by the declared capability set.
pub trait FullConnector:
    SchemaDiscovery + CreateOp + UpdateOp + DeleteOp + SearchOp + SyncOp
{
}

impl<T> FullConnector for T where
    T: SchemaDiscovery + CreateOp + UpdateOp + DeleteOp + SearchOp + SyncOp
{
}
