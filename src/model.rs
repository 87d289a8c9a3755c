//! Core data model.
//!
//! A task is an opaque payload with identity and a lifecycle status. The
//! serialized form of a task is what travels over the queue.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// A unit of work tracked by the store and dispatched through the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Assigned at creation, never supplied by callers.
    pub id: TaskId,

    /// Opaque caller-supplied data. Never interpreted by the pipeline.
    pub payload: String,

    pub status: TaskStatus,
}

impl Task {
    /// Create a pending task with a fresh id.
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            id: TaskId::new(),
            payload: payload.into(),
            status: TaskStatus::Pending,
        }
    }

    /// Serialize for transport over the queue.
    ///
    /// The encoding is a self-describing JSON object carrying id, payload
    /// and status.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::InvalidTaskData(e.to_string()))
    }

    /// Decode a task previously produced by [`Task::to_bytes`].
    ///
    /// # Errors
    /// Returns [`Error::InvalidTaskData`] if `data` is not a well-formed task.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| Error::InvalidTaskData(e.to_string()))
    }
}

/// Newtype for task IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A string that is not a UUID can never name a stored task, so parse
/// failures surface as [`Error::TaskNotFound`].
impl FromStr for TaskId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(TaskId)
            .map_err(|_| Error::TaskNotFound(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Stored and published, not yet finished by any worker.
    Pending,
    /// A worker has started the task body.
    Processing,
    Done,
    Failed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
        }
    }

    /// Is this a terminal status?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "processing" => Ok(TaskStatus::Processing),
            "done" => Ok(TaskStatus::Done),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(Error::InvalidTaskData(format!("unknown status: {other}"))),
        }
    }
}
