//! Shared type definitions
//!
//! Enums describing what a propagation does and how it is traced.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Type of propagation operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationType {
    /// Create a new object on the external resource
    Create,
    /// Update an existing object on the external resource
    Update,
    /// Delete an object from the external resource
    Delete,
}

impl OperationType {
    /// All operation types, in the order tasks are built and executed.
    #[must_use]
    pub fn all() -> &'static [OperationType] {
        &[
            OperationType::Create,
            OperationType::Update,
            OperationType::Delete,
        ]
    }

    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Create => "create",
            OperationType::Update => "update",
            OperationType::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = ParseOperationTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "create" => Ok(OperationType::Create),
            "update" => Ok(OperationType::Update),
            "delete" => Ok(OperationType::Delete),
            _ => Err(ParseOperationTypeError(s.to_string())),
        }
    }
}

/// Error parsing operation type from string.
#[derive(Debug, Clone)]
pub struct ParseOperationTypeError(String);

impl fmt::Display for ParseOperationTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid operation type '{}', expected one of: create, update, delete",
            self.0
        )
    }
}

impl std::error::Error for ParseOperationTypeError {}

/// How a resource receives propagated changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum PropagationMode {
    /// The caller waits for a definitive success or failure (one-phase).
    #[default]
    Sync,
    /// The request is submitted and confirmed later (two-phase).
    Async,
}

impl PropagationMode {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PropagationMode::Sync => "sync",
            PropagationMode::Async => "async",
        }
    }

    /// Whether outcomes are definitive when the connector call returns.
    #[must_use]
    pub fn is_synchronous(&self) -> bool {
        matches!(self, PropagationMode::Sync)
    }
}

impl fmt::Display for PropagationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PropagationMode {
    type Err = ParsePropagationModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sync" | "one_phase" => Ok(PropagationMode::Sync),
            "async" | "two_phases" => Ok(PropagationMode::Async),
            _ => Err(ParsePropagationModeError(s.to_string())),
        }
    }
}

/// Error parsing propagation mode from string.
#[derive(Debug, Clone)]
pub struct ParsePropagationModeError(String);

impl fmt::Display for ParsePropagationModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid propagation mode '{}', expected one of: sync, async",
            self.0
        )
    }
}

impl std::error::Error for ParsePropagationModeError {}

/// Policy deciding whether an execution outcome is durably recorded.
///
/// Variants are ordered: `None < Failures < All`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum TraceLevel {
    /// Never record.
    None,
    /// Record failed outcomes only.
    Failures,
    /// Record every outcome.
    #[default]
    All,
}

impl TraceLevel {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceLevel::None => "none",
            TraceLevel::Failures => "failures",
            TraceLevel::All => "all",
        }
    }

    /// Whether an outcome must be recorded under this level.
    #[must_use]
    pub fn should_record(&self, failed: bool) -> bool {
        match self {
            TraceLevel::All => true,
            TraceLevel::Failures => failed,
            TraceLevel::None => false,
        }
    }
}

impl fmt::Display for TraceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TraceLevel {
    type Err = ParseTraceLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(TraceLevel::None),
            "failures" => Ok(TraceLevel::Failures),
            "all" => Ok(TraceLevel::All),
            _ => Err(ParseTraceLevelError(s.to_string())),
        }
    }
}

/// Error parsing trace level from string.
#[derive(Debug, Clone)]
pub struct ParseTraceLevelError(String);

impl fmt::Display for ParseTraceLevelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid trace level '{}', expected one of: none, failures, all",
            self.0
        )
    }
}

impl std::error::Error for ParseTraceLevelError {}
