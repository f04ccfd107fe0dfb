//! Execution records
//!
//! The outcome of running one task, and the policy deciding whether it is
//! kept.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use idsync_connector::{PropagationMode, TraceLevel};

use crate::ids::{ExecutionId, TaskId};

/// Status of a task execution.
///
/// `Created` is the initial state; the others are terminal. Synchronous
/// propagation ends in `Success` or `Failure`, asynchronous propagation in
/// `Submitted` or `Unsubmitted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecStatus {
    #[default]
    Created,
    Success,
    Failure,
    Submitted,
    Unsubmitted,
}

impl ExecStatus {
    /// Terminal status for an outcome in `mode`.
    #[must_use]
    pub fn outcome(mode: PropagationMode, succeeded: bool) -> Self {
        match (mode, succeeded) {
            (PropagationMode::Sync, true) => ExecStatus::Success,
            (PropagationMode::Sync, false) => ExecStatus::Failure,
            (PropagationMode::Async, true) => ExecStatus::Submitted,
            (PropagationMode::Async, false) => ExecStatus::Unsubmitted,
        }
    }

    /// `Success` or `Submitted`.
    #[must_use]
    pub fn is_successful(&self) -> bool {
        matches!(self, ExecStatus::Success | ExecStatus::Submitted)
    }

    /// `Failure` or `Unsubmitted`.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, ExecStatus::Failure | ExecStatus::Unsubmitted)
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecStatus::Created)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecStatus::Created => "CREATED",
            ExecStatus::Success => "SUCCESS",
            ExecStatus::Failure => "FAILURE",
            ExecStatus::Submitted => "SUBMITTED",
            ExecStatus::Unsubmitted => "UNSUBMITTED",
        }
    }
}

impl fmt::Display for ExecStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Record of one task execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskExecution {
    pub id: ExecutionId,
    pub task_id: TaskId,
    pub status: ExecStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl TaskExecution {
    /// Start an execution now.
    pub fn start(task_id: TaskId) -> Self {
        Self {
            id: ExecutionId::new(),
            task_id,
            status: ExecStatus::Created,
            message: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Move to a terminal status and stamp the end time.
    pub fn finish(&mut self, status: ExecStatus, message: Option<String>) {
        self.status = status;
        self.message = message;
        self.ended_at = Some(Utc::now());
    }

    /// Whether the trace level asks for this execution to be kept.
    #[must_use]
    pub fn should_record(&self, level: TraceLevel) -> bool {
        level.should_record(self.status.is_failed())
    }
}

/// Cut `message` to at most `max_len` bytes on a char boundary.
pub fn truncate_message(mut message: String, max_len: usize) -> String {
    if message.len() > max_len {
        let mut end = max_len;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        message.truncate(end);
    }
    message
}
