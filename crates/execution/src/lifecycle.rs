//! Lifecycle management - the protocol every task execution goes through.
//!
//! ```text
//! initialize → begin → (execute) → complete | fail → destroy
//! ```
//!
//! `complete` runs the task's reports and then writes the completion marker.
//! A context without the marker is invisible to lookups.

use async_trait::async_trait;
use chrono::Utc;
use labflow_storage::records::METADATA_KEY;
use tracing::warn;

use crate::context::{LifecycleState, TaskContext};
use crate::error::ExecError;
use crate::task::Task;

/// Drives a task context through its lifecycle.
#[async_trait]
pub trait LifeCycleManager: Send + Sync {
    /// Persist the task's configuration snapshot.
    async fn initialize(&self, ctx: &mut TaskContext, task: &dyn Task) -> Result<(), ExecError>;

    /// Record the start of execution.
    async fn begin(&self, ctx: &mut TaskContext, task: &dyn Task) -> Result<(), ExecError>;

    /// Run reports and mark the context complete.
    async fn complete(&self, ctx: &mut TaskContext, task: &dyn Task) -> Result<(), ExecError>;

    /// Remove the context of a failed task. Never fails.
    async fn fail(&self, ctx: &mut TaskContext, task: &dyn Task, cause: &ExecError);

    /// Release the context.
    async fn destroy(&self, ctx: &mut TaskContext, task: &dyn Task);
}

/// Standard lifecycle: JSON snapshots, reports in type order, metadata marker.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultLifeCycleManager;

impl DefaultLifeCycleManager {
    /// Create the default lifecycle manager.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LifeCycleManager for DefaultLifeCycleManager {
    async fn initialize(&self, ctx: &mut TaskContext, task: &dyn Task) -> Result<(), ExecError> {
        ctx.persist_task(task).await.map_err(|e| {
            ExecError::lifecycle(format!("Unable to initialize task [{}]", task.task_type()), e)
        })?;
        ctx.set_state(LifecycleState::Initialized);
        ctx.message(format!("Initialized task [{}]", task.task_type()));
        Ok(())
    }

    async fn begin(&self, ctx: &mut TaskContext, task: &dyn Task) -> Result<(), ExecError> {
        ctx.metadata_mut().start = Some(Utc::now());
        ctx.set_state(LifecycleState::Running);
        ctx.message(format!("Starting task [{}]", task.task_type()));
        Ok(())
    }

    async fn complete(&self, ctx: &mut TaskContext, task: &dyn Task) -> Result<(), ExecError> {
        ctx.metadata_mut().end = Some(Utc::now());
        ctx.message(format!("Completing task [{}]", task.task_type()));

        let reports = task.base().reports();
        if !reports.is_empty() {
            ctx.message(format!("Running reports for task [{}]", task.task_type()));
        }
        let total = reports.len();
        for (i, report) in reports.iter().enumerate() {
            let n = i + 1;
            ctx.message(format!("Starting report [{}] ({}/{})", report.report_type(), n, total));
            if let Err(e) = report.execute(ctx).await {
                let message = format!("Report failed [{}] ({}/{})", report.report_type(), n, total);
                ctx.error(&message, &e);
                return Err(ExecError::lifecycle(message, e));
            }
            ctx.message(format!("Report complete [{}] ({}/{})", report.report_type(), n, total));
        }

        // The marker goes last; a partial write must not leave it readable
        if let Err(e) = ctx.store_json(METADATA_KEY, ctx.metadata()).await {
            if let Err(cleanup) = ctx.storage().delete_key(ctx.id(), METADATA_KEY).await {
                warn!(
                    context = %ctx.id(),
                    "Unable to remove partial [{}]: {}", METADATA_KEY, cleanup
                );
            }
            return Err(ExecError::lifecycle(
                format!("Unable to write [{}] to mark context as complete.", METADATA_KEY),
                e,
            ));
        }

        ctx.set_state(LifecycleState::Completed);
        ctx.message(format!("Completed task [{}]", task.task_type()));
        Ok(())
    }

    async fn fail(&self, ctx: &mut TaskContext, task: &dyn Task, cause: &ExecError) {
        ctx.error(format!("Task failed [{}]", task.task_type()), cause);
        if let Err(e) = ctx.storage().delete_context(ctx.id()).await {
            ctx.error(
                "Unable to clean up context after failure. Some data may remain in the context.",
                &e,
            );
        }
        ctx.set_state(LifecycleState::Failed);
    }

    async fn destroy(&self, ctx: &mut TaskContext, _task: &dyn Task) {
        ctx.set_state(LifecycleState::Destroyed);
        ctx.message("Shut down task");
    }
}
