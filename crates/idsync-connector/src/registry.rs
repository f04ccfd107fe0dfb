//! Registry of live connector instances
//!
//! Maps connector instance names to their gateways. Safe for concurrent
//! readers; registration takes a write lock.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::ConnectorInstanceConfig;
use crate::error::ConnectorResult;
use crate::gateway::ConnectorGateway;
use crate::traits::FullConnector;

/// Registry of connector gateways keyed by instance name.
#[derive(Debug, Default)]
pub struct ConnectorRegistry {
    gateways: RwLock<HashMap<String, Arc<ConnectorGateway>>>,
}

impl ConnectorRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap `connector` in a gateway and register it under the config name.
    ///
    /// Fails when the connector does not validate. An instance already
    /// registered under the same name is replaced.
    pub async fn register(
        &self,
        config: ConnectorInstanceConfig,
        connector: Arc<dyn FullConnector>,
    ) -> ConnectorResult<Arc<ConnectorGateway>> {
        let gateway = Arc::new(ConnectorGateway::new(config, connector)?);
        self.insert(gateway.clone()).await;
        Ok(gateway)
    }

    /// Register an existing gateway.
    pub async fn insert(&self, gateway: Arc<ConnectorGateway>) {
        let name = gateway.name().to_string();
        debug!(instance = %name, "registering connector instance");
        self.gateways.write().await.insert(name, gateway);
    }

    /// Look up a gateway by instance name.
    pub async fn get(&self, name: &str) -> Option<Arc<ConnectorGateway>> {
        self.gateways.read().await.get(name).cloned()
    }

    /// Remove an instance and dispose its connector.
    pub async fn remove(&self, name: &str) -> Option<Arc<ConnectorGateway>> {
        let removed = self.gateways.write().await.remove(name);
        if let Some(gateway) = &removed {
            if let Err(e) = gateway.dispose().await {
                warn!(
                    instance = %name,
                    error = %e,
                    error_code = e.error_code(),
                    "failed to dispose connector"
                );
            }
        }
        removed
    }

    /// Names of every registered instance, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.gateways.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered instances.
    pub async fn len(&self) -> usize {
        self.gateways.read().await.len()
    }

    /// Whether no instance is registered.
    pub async fn is_empty(&self) -> bool {
        self.gateways.read().await.is_empty()
    }
}
