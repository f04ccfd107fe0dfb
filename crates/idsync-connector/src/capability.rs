//! Connector capabilities
//!
//! A connector instance declares which (operation, mode) combinations it
//! supports. Nothing is ever dispatched to a connector for a combination it
//! did not declare.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::types::{OperationType, PropagationMode};

/// A single declared capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    OnePhaseCreate,
    TwoPhaseCreate,
    OnePhaseUpdate,
    TwoPhaseUpdate,
    OnePhaseDelete,
    TwoPhaseDelete,
    Sync,
    Search,
}

impl Capability {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::OnePhaseCreate => "ONE_PHASE_CREATE",
            Capability::TwoPhaseCreate => "TWO_PHASE_CREATE",
            Capability::OnePhaseUpdate => "ONE_PHASE_UPDATE",
            Capability::TwoPhaseUpdate => "TWO_PHASE_UPDATE",
            Capability::OnePhaseDelete => "ONE_PHASE_DELETE",
            Capability::TwoPhaseDelete => "TWO_PHASE_DELETE",
            Capability::Sync => "SYNC",
            Capability::Search => "SEARCH",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The capability a connector must declare to run `operation` in `mode`.
#[must_use]
pub fn required_capability(operation: OperationType, mode: PropagationMode) -> Capability {
    match (operation, mode) {
        (OperationType::Create, PropagationMode::Sync) => Capability::OnePhaseCreate,
        (OperationType::Create, PropagationMode::Async) => Capability::TwoPhaseCreate,
        (OperationType::Update, PropagationMode::Sync) => Capability::OnePhaseUpdate,
        (OperationType::Update, PropagationMode::Async) => Capability::TwoPhaseUpdate,
        (OperationType::Delete, PropagationMode::Sync) => Capability::OnePhaseDelete,
        (OperationType::Delete, PropagationMode::Async) => Capability::TwoPhaseDelete,
    }
}

/// Set of capabilities declared by a connector instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    /// Create an empty capability set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every capability.
    #[must_use]
    pub fn all() -> Self {
        [
            Capability::OnePhaseCreate,
            Capability::TwoPhaseCreate,
            Capability::OnePhaseUpdate,
            Capability::TwoPhaseUpdate,
            Capability::OnePhaseDelete,
            Capability::TwoPhaseDelete,
            Capability::Sync,
            Capability::Search,
        ]
        .into_iter()
        .collect()
    }

    /// Add a capability.
    pub fn insert(&mut self, capability: Capability) -> bool {
        self.0.insert(capability)
    }

    /// Add a capability using builder pattern.
    #[must_use]
    pub fn with(mut self, capability: Capability) -> Self {
        self.insert(capability);
        self
    }

    /// Remove a capability.
    pub fn remove(&mut self, capability: Capability) -> bool {
        self.0.remove(&capability)
    }

    /// Check whether a capability is declared.
    #[must_use]
    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    /// Check whether `operation` may run in `mode`.
    #[must_use]
    pub fn supports(&self, operation: OperationType, mode: PropagationMode) -> bool {
        self.contains(required_capability(operation, mode))
    }

    /// Iterate over declared capabilities.
    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    /// Check if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(Capability::as_str).collect();
        write!(f, "[{}]", names.join(", "))
    }
}
