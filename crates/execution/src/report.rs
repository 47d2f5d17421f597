//! Reports run after a task completes.

use async_trait::async_trait;

use crate::context::TaskContext;

/// Post-task analysis executed while the task is being completed.
///
/// Reports of a task run one at a time in the order of their
/// [`report_type`](Report::report_type). Any error is fatal for the task.
#[async_trait]
pub trait Report: Send + Sync {
    /// Stable identifier of the report, used for ordering.
    fn report_type(&self) -> &str;

    /// Run the report against the context of the completed task.
    async fn execute(&self, ctx: &TaskContext) -> anyhow::Result<()>;
}
