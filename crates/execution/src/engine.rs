//! The execution engine - runs one task through its lifecycle.

use std::sync::Arc;

use async_trait::async_trait;
use labflow_core::{ContextId, ExecutionMetadata};
use labflow_storage::StorageService;
use tracing::debug;

use crate::context::{ImportScope, TaskContext};
use crate::error::ExecError;
use crate::lifecycle::{DefaultLifeCycleManager, LifeCycleManager};
use crate::task::{Task, TaskKind};

/// Shared services every engine and context needs.
#[derive(Clone)]
pub struct ExecutionService {
    storage: Arc<dyn StorageService>,
    lifecycle: Arc<dyn LifeCycleManager>,
}

impl ExecutionService {
    /// Create a service over `storage` with the default lifecycle.
    pub fn new(storage: Arc<dyn StorageService>) -> Self {
        Self {
            storage,
            lifecycle: Arc::new(DefaultLifeCycleManager::new()),
        }
    }

    /// Replace the lifecycle manager.
    pub fn with_lifecycle(mut self, lifecycle: Arc<dyn LifeCycleManager>) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Storage backend.
    pub fn storage(&self) -> &Arc<dyn StorageService> {
        &self.storage
    }

    /// Lifecycle manager.
    pub fn lifecycle(&self) -> &Arc<dyn LifeCycleManager> {
        &self.lifecycle
    }

    /// Engine able to run `task`.
    pub fn create_engine(&self, task: &dyn Task) -> Box<dyn TaskExecutionEngine> {
        debug!(
            "Creating engine for [{}] ({})",
            task.task_type(),
            match task.kind() {
                TaskKind::Leaf => "leaf",
                TaskKind::Batch => "batch",
            }
        );
        Box::new(DefaultExecutionEngine::new(self.clone()))
    }

    /// Allocate a fresh context for a run of `task_type`.
    pub(crate) fn create_context(
        &self,
        task_type: &str,
        scope: Option<ImportScope>,
    ) -> TaskContext {
        TaskContext::new(ExecutionMetadata::new(task_type), self.clone(), scope)
    }
}

impl std::fmt::Debug for ExecutionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionService").finish_non_exhaustive()
    }
}

/// Runs a task to completion in a fresh context.
#[async_trait]
pub trait TaskExecutionEngine: Send + Sync {
    /// Run `task` and return the id of its completed context.
    ///
    /// `scope` is the import scope of the enclosing batch, if any.
    async fn run(
        &self,
        task: &mut dyn Task,
        scope: Option<ImportScope>,
    ) -> Result<ContextId, ExecError>;
}

/// Engine driving a task through the lifecycle manager of its service.
#[derive(Debug, Clone)]
pub struct DefaultExecutionEngine {
    service: ExecutionService,
}

impl DefaultExecutionEngine {
    /// Create an engine.
    pub fn new(service: ExecutionService) -> Self {
        Self { service }
    }

    async fn drive(&self, task: &mut dyn Task, ctx: &mut TaskContext) -> Result<(), ExecError> {
        let lifecycle = self.service.lifecycle();
        lifecycle.initialize(ctx, &*task).await?;
        lifecycle.begin(ctx, &*task).await?;
        task.execute(ctx).await?;
        lifecycle.complete(ctx, &*task).await
    }
}

#[async_trait]
impl TaskExecutionEngine for DefaultExecutionEngine {
    async fn run(
        &self,
        task: &mut dyn Task,
        scope: Option<ImportScope>,
    ) -> Result<ContextId, ExecError> {
        let mut ctx = self.service.create_context(task.task_type(), scope);
        let lifecycle = Arc::clone(self.service.lifecycle());

        let outcome = self.drive(task, &mut ctx).await;
        if let Err(e) = &outcome {
            lifecycle.fail(&mut ctx, &*task, e).await;
        }
        lifecycle.destroy(&mut ctx, &*task).await;

        outcome.map(|()| ctx.id().clone())
    }
}
