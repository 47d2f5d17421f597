//! Execution metadata - the durable header of one task run.

use serde::{Deserialize, Serialize};

use crate::id::ContextId;
use crate::Time;

/// Metadata recorded for a task execution.
///
/// Once written under the completion marker key it signals that the
/// execution finished successfully.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    /// Unique identifier
    pub id: ContextId,

    /// Type of the task that produced this execution
    pub task_type: String,

    /// When the task started running
    pub start: Option<Time>,

    /// When the task finished running
    pub end: Option<Time>,
}

impl ExecutionMetadata {
    /// Create metadata for a fresh execution of `task_type`.
    pub fn new(task_type: impl Into<String>) -> Self {
        let task_type = task_type.into();
        Self {
            id: ContextId::generate(&task_type),
            task_type,
            start: None,
            end: None,
        }
    }
}
