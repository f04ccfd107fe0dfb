//! Pending operations per resource
//!
//! Accumulates which resources need a create, an update or a delete, plus
//! the account id a resource previously knew an identity by.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use idsync_connector::OperationType;

/// Per-resource CREATE/UPDATE/DELETE accumulator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSet {
    #[serde(default)]
    to_create: BTreeSet<String>,
    #[serde(default)]
    to_update: BTreeSet<String>,
    #[serde(default)]
    to_delete: BTreeSet<String>,
    /// Resource name to previous account id.
    #[serde(default)]
    old_account_ids: HashMap<String, String>,
}

impl OperationSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn set_mut(&mut self, operation: OperationType) -> &mut BTreeSet<String> {
        match operation {
            OperationType::Create => &mut self.to_create,
            OperationType::Update => &mut self.to_update,
            OperationType::Delete => &mut self.to_delete,
        }
    }

    /// Resources pending for an operation type.
    #[must_use]
    pub fn get(&self, operation: OperationType) -> &BTreeSet<String> {
        match operation {
            OperationType::Create => &self.to_create,
            OperationType::Update => &self.to_update,
            OperationType::Delete => &self.to_delete,
        }
    }

    /// Add a resource; returns false if it was already pending.
    pub fn add(&mut self, operation: OperationType, resource: impl Into<String>) -> bool {
        self.set_mut(operation).insert(resource.into())
    }

    /// Add several resources.
    pub fn add_all<I, S>(&mut self, operation: OperationType, resources: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_mut(operation)
            .extend(resources.into_iter().map(Into::into));
    }

    /// Add a resource using builder pattern.
    #[must_use]
    pub fn with(mut self, operation: OperationType, resource: impl Into<String>) -> Self {
        self.add(operation, resource);
        self
    }

    /// Remove a resource; returns whether it was pending.
    pub fn remove(&mut self, operation: OperationType, resource: &str) -> bool {
        self.set_mut(operation).remove(resource)
    }

    /// Replace the resources pending for an operation type.
    pub fn set(&mut self, operation: OperationType, resources: BTreeSet<String>) {
        *self.set_mut(operation) = resources;
    }

    /// Remember the account id a resource knew the identity by.
    pub fn set_old_account_id(&mut self, resource: impl Into<String>, account_id: impl Into<String>) {
        self.old_account_ids.insert(resource.into(), account_id.into());
    }

    /// The previous account id on a resource, if any.
    #[must_use]
    pub fn old_account_id(&self, resource: &str) -> Option<&str> {
        self.old_account_ids.get(resource).map(String::as_str)
    }

    /// Resolve conflicts between the three sets.
    ///
    /// Delete wins over update and create; update wins over create.
    pub fn purge(&mut self) {
        let to_delete = &self.to_delete;
        let to_update = &self.to_update;
        self.to_create
            .retain(|name| !to_delete.contains(name) && !to_update.contains(name));
        self.to_update.retain(|name| !to_delete.contains(name));
    }

    /// Union the three sets and the old account ids with `other`.
    pub fn merge(&mut self, other: &OperationSet) {
        self.to_create.extend(other.to_create.iter().cloned());
        self.to_update.extend(other.to_update.iter().cloned());
        self.to_delete.extend(other.to_delete.iter().cloned());
        for (resource, account_id) in &other.old_account_ids {
            self.old_account_ids
                .entry(resource.clone())
                .or_insert_with(|| account_id.clone());
        }
    }

    /// Remove a resource from every operation type.
    pub fn remove_everywhere(&mut self, resource: &str) {
        for operation in OperationType::all() {
            self.remove(*operation, resource);
        }
    }

    /// True iff the three sets and the old account ids are all empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty()
            && self.to_update.is_empty()
            && self.to_delete.is_empty()
            && self.old_account_ids.is_empty()
    }
}
